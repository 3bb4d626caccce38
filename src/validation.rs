// src/validation.rs
// Field validation for product payloads.
// Runs before any store call and reports every failing field at once.

use serde::Serialize;

use crate::dtos::product::{CreateProductRequest, UpdateProductRequest};
use crate::models::{NewProduct, ProductPatch};

pub const NAME_MAX_CHARS: usize = 100;
pub const SKU_MAX_CHARS: usize = 64;
pub const SHORT_DESCRIPTION_MAX_CHARS: usize = 255;
pub const IMAGE_URL_MAX_CHARS: usize = 2048;
/// Stock is stored as a 32-bit integer in the relational schema.
pub const STOCK_MAX: i64 = i32::MAX as i64;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: &'static str,
    pub message: String,
}

impl FieldError {
    pub fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }

    fn required(field: &'static str) -> Self {
        Self::new(field, format!("{field} is required"))
    }
}

/// Collects failures while the individual field checks run.
#[derive(Default)]
struct Errors(Vec<FieldError>);

impl Errors {
    fn push(&mut self, err: FieldError) {
        self.0.push(err);
    }

    /// Trimmed, non-blank text.
    fn trimmed(&mut self, field: &'static str, value: String) -> Option<String> {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            self.push(FieldError::new(field, format!("{field} cannot be empty")));
            return None;
        }
        Some(trimmed.to_string())
    }

    /// Trimmed, non-blank, bounded text.
    fn label(&mut self, field: &'static str, value: String, max: usize) -> Option<String> {
        let trimmed = self.trimmed(field, value)?;
        if trimmed.chars().count() > max {
            self.push(FieldError::new(
                field,
                format!("{field} cannot be longer than {max} characters"),
            ));
            return None;
        }
        Some(trimmed)
    }

    fn text(&mut self, field: &'static str, value: String) -> Option<String> {
        if value.trim().is_empty() {
            self.push(FieldError::new(field, format!("{field} cannot be empty")));
            return None;
        }
        Some(value)
    }

    fn bounded(&mut self, field: &'static str, value: String, max: usize) -> Option<String> {
        if value.chars().count() > max {
            self.push(FieldError::new(
                field,
                format!("{field} cannot be longer than {max} characters"),
            ));
            return None;
        }
        Some(value)
    }

    fn price(&mut self, value: f64) -> Option<f64> {
        if !value.is_finite() {
            self.push(FieldError::new("price", "price must be a finite number"));
            return None;
        }
        if value < 0.0 {
            self.push(FieldError::new("price", "price cannot be negative"));
            return None;
        }
        Some(value)
    }

    fn stock(&mut self, value: i64) -> Option<i64> {
        if value < 0 {
            self.push(FieldError::new("stock", "stock cannot be negative"));
            return None;
        }
        if value > STOCK_MAX {
            self.push(FieldError::new(
                "stock",
                format!("stock cannot exceed {STOCK_MAX}"),
            ));
            return None;
        }
        Some(value)
    }

    fn finish<T>(self, value: T) -> Result<T, Vec<FieldError>> {
        if self.0.is_empty() {
            Ok(value)
        } else {
            Err(self.0)
        }
    }
}

/// Check a create payload. Name, description, price and category are
/// required; stock defaults to zero.
pub fn validate_new(req: CreateProductRequest) -> Result<NewProduct, Vec<FieldError>> {
    let mut errors = Errors::default();

    let name = match req.name {
        Some(v) => errors.label("name", v, NAME_MAX_CHARS),
        None => {
            errors.push(FieldError::required("name"));
            None
        }
    };
    let description = match req.description {
        Some(v) => errors.text("description", v),
        None => {
            errors.push(FieldError::required("description"));
            None
        }
    };
    let price = match req.price {
        Some(v) => errors.price(v),
        None => {
            errors.push(FieldError::required("price"));
            None
        }
    };
    let category = match req.category {
        Some(v) => errors.trimmed("category", v),
        None => {
            errors.push(FieldError::required("category"));
            None
        }
    };
    let stock = errors.stock(req.stock.unwrap_or(0));
    let sku = req.sku.and_then(|v| errors.label("sku", v, SKU_MAX_CHARS));
    let short_description = req
        .short_description
        .and_then(|v| errors.bounded("shortDescription", v, SHORT_DESCRIPTION_MAX_CHARS));
    let image_url = req
        .image_url
        .and_then(|v| errors.bounded("imageUrl", v, IMAGE_URL_MAX_CHARS));

    match (name, description, price, category, stock) {
        (Some(name), Some(description), Some(price), Some(category), Some(stock)) => {
            errors.finish(NewProduct {
                sku,
                name,
                description,
                short_description,
                price,
                stock,
                category,
                image_url,
            })
        }
        _ => Err(errors.0),
    }
}

/// Check a partial update. Only provided fields are checked, with the same
/// rules as on create.
pub fn validate_patch(req: UpdateProductRequest) -> Result<ProductPatch, Vec<FieldError>> {
    let mut errors = Errors::default();

    let patch = ProductPatch {
        sku: req.sku.and_then(|v| errors.label("sku", v, SKU_MAX_CHARS)),
        name: req.name.and_then(|v| errors.label("name", v, NAME_MAX_CHARS)),
        description: req.description.and_then(|v| errors.text("description", v)),
        short_description: req
            .short_description
            .and_then(|v| errors.bounded("shortDescription", v, SHORT_DESCRIPTION_MAX_CHARS)),
        price: req.price.and_then(|v| errors.price(v)),
        stock: req.stock.and_then(|v| errors.stock(v)),
        category: req
            .category
            .and_then(|v| errors.trimmed("category", v)),
        image_url: req
            .image_url
            .and_then(|v| errors.bounded("imageUrl", v, IMAGE_URL_MAX_CHARS)),
    };

    errors.finish(patch)
}
