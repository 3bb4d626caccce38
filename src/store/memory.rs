// src/store/memory.rs
// In-process store for local runs and tests.
// Ids are sequential positive integers rendered as strings, the same shape
// the Postgres backend hands out.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use super::{parse_serial, ProductStore, StoreError, DUPLICATE_SKU};
use crate::models::{NewProduct, Page, Product, ProductPatch, ProductQuery, SortField, SortOrder};

#[derive(Debug, Default)]
struct Inner {
    next_id: u64,
    products: BTreeMap<u64, Product>,
}

impl Inner {
    fn sku_taken(&self, sku: &str, except: Option<u64>) -> bool {
        self.products
            .iter()
            .any(|(id, p)| Some(*id) != except && p.sku.as_deref() == Some(sku))
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn parse_id(id: &str) -> Option<u64> {
    parse_serial(id)
}

fn compare(a: &Product, b: &Product, field: SortField) -> Ordering {
    match field {
        SortField::Name => a.name.cmp(&b.name),
        SortField::Price => a.price.total_cmp(&b.price),
        SortField::Stock => a.stock.cmp(&b.stock),
        SortField::Category => a.category.cmp(&b.category),
        SortField::CreatedAt => a.created_at.cmp(&b.created_at),
        SortField::UpdatedAt => a.updated_at.cmp(&b.updated_at),
    }
}

/// Current time, never earlier than `previous`.
fn touch(previous: DateTime<Utc>) -> DateTime<Utc> {
    Utc::now().max(previous)
}

#[async_trait]
impl ProductStore for MemoryStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn is_valid_id(&self, id: &str) -> bool {
        parse_id(id).is_some()
    }

    async fn find_page(&self, query: &ProductQuery) -> Result<Page<Product>, StoreError> {
        // Count and page come from the same read guard.
        let inner = self.inner.read().await;

        let mut matches: Vec<(u64, &Product)> = inner
            .products
            .iter()
            .filter(|(_, p)| query.category.as_deref().is_none_or(|c| p.category == c))
            .map(|(id, p)| (*id, p))
            .collect();

        matches.sort_by(|(a_id, a), (b_id, b)| {
            let ord = compare(a, b, query.sort_by);
            let ord = match query.sort_order {
                SortOrder::Asc => ord,
                SortOrder::Desc => ord.reverse(),
            };
            ord.then(a_id.cmp(b_id))
        });

        let total = matches.len() as u64;
        let skip = usize::try_from(query.offset()).unwrap_or(usize::MAX);
        let take = usize::try_from(query.limit).unwrap_or(usize::MAX);
        let items = matches
            .into_iter()
            .skip(skip)
            .take(take)
            .map(|(_, p)| p.clone())
            .collect();

        Ok(Page { items, total })
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Product>, StoreError> {
        let Some(key) = parse_id(id) else {
            return Ok(None);
        };
        Ok(self.inner.read().await.products.get(&key).cloned())
    }

    async fn create(&self, new: NewProduct) -> Result<Product, StoreError> {
        let mut inner = self.inner.write().await;

        if let Some(sku) = new.sku.as_deref() {
            if inner.sku_taken(sku, None) {
                return Err(StoreError::Conflict(DUPLICATE_SKU.into()));
            }
        }

        inner.next_id += 1;
        let key = inner.next_id;
        let now = Utc::now();
        let product = Product {
            id: key.to_string(),
            sku: new.sku,
            name: new.name,
            description: new.description,
            short_description: new.short_description,
            price: new.price,
            stock: new.stock,
            category: new.category,
            image_url: new.image_url,
            created_at: now,
            updated_at: now,
        };
        inner.products.insert(key, product.clone());
        Ok(product)
    }

    async fn update(&self, id: &str, patch: ProductPatch) -> Result<Option<Product>, StoreError> {
        let Some(key) = parse_id(id) else {
            return Ok(None);
        };
        let mut inner = self.inner.write().await;

        if !inner.products.contains_key(&key) {
            return Ok(None);
        }
        if let Some(sku) = patch.sku.as_deref() {
            if inner.sku_taken(sku, Some(key)) {
                return Err(StoreError::Conflict(DUPLICATE_SKU.into()));
            }
        }

        let Some(product) = inner.products.get_mut(&key) else {
            return Ok(None);
        };
        patch.apply_to(product);
        product.updated_at = touch(product.updated_at);
        Ok(Some(product.clone()))
    }

    async fn delete(&self, id: &str) -> Result<bool, StoreError> {
        let Some(key) = parse_id(id) else {
            return Ok(false);
        };
        Ok(self.inner.write().await.products.remove(&key).is_some())
    }

    async fn shutdown(&self) {
        self.inner.write().await.products.clear();
    }
}
