use chrono::{DateTime, Utc};
use serde::Serialize;

/// A stored product, identical in shape across every backend.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sku: Option<String>,
    pub name: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub short_description: Option<String>,
    pub price: f64,
    pub stock: i64,
    pub category: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A validated create payload. Only `validation::validate_new` builds one.
#[derive(Debug, Clone, PartialEq)]
pub struct NewProduct {
    pub sku: Option<String>,
    pub name: String,
    pub description: String,
    pub short_description: Option<String>,
    pub price: f64,
    pub stock: i64,
    pub category: String,
    pub image_url: Option<String>,
}

/// A validated partial update. `None` leaves the stored value untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProductPatch {
    pub sku: Option<String>,
    pub name: Option<String>,
    pub description: Option<String>,
    pub short_description: Option<String>,
    pub price: Option<f64>,
    pub stock: Option<i64>,
    pub category: Option<String>,
    pub image_url: Option<String>,
}

impl ProductPatch {
    /// Overwrite the provided fields of `product` in place.
    pub fn apply_to(self, product: &mut Product) {
        if let Some(sku) = self.sku {
            product.sku = Some(sku);
        }
        if let Some(name) = self.name {
            product.name = name;
        }
        if let Some(description) = self.description {
            product.description = description;
        }
        if let Some(short) = self.short_description {
            product.short_description = Some(short);
        }
        if let Some(price) = self.price {
            product.price = price;
        }
        if let Some(stock) = self.stock {
            product.stock = stock;
        }
        if let Some(category) = self.category {
            product.category = category;
        }
        if let Some(image_url) = self.image_url {
            product.image_url = Some(image_url);
        }
    }
}
