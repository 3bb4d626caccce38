// src/store/mod.rs
// Product persistence behind one interface.
// Each backend decides what an identifier looks like (`is_valid_id`) and
// classifies its own driver errors into `StoreError`. Handlers never see
// a driver type.

pub mod memory;
pub mod mongo;
pub mod postgres;

use async_trait::async_trait;

use crate::models::{NewProduct, Page, Product, ProductPatch, ProductQuery};
use crate::validation::FieldError;

pub use memory::MemoryStore;
pub use mongo::MongoStore;
pub use postgres::PostgresStore;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A unique constraint (e.g. SKU) rejected the write.
    #[error("conflict: {0}")]
    Conflict(String),

    /// The store's own constraints rejected a value that passed validation.
    #[error("constraint violated: {}", join_messages(.0))]
    Constraint(Vec<FieldError>),

    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("database error: {0}")]
    Mongo(#[from] mongodb::error::Error),

    #[error("migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
}

fn join_messages(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(|e| e.message.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Canonical positive decimal: ASCII digits only, no sign, no leading zero.
pub(crate) fn parse_serial(id: &str) -> Option<u64> {
    if id.is_empty() || id.starts_with('0') || !id.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    id.parse().ok()
}

pub const DUPLICATE_SKU: &str = "A product with this SKU already exists";

#[async_trait]
pub trait ProductStore: Send + Sync {
    /// Backend name for logs.
    fn name(&self) -> &'static str;

    /// Whether `id` has the shape this backend assigns. Checked before any
    /// query so malformed ids never reach the database.
    fn is_valid_id(&self, id: &str) -> bool;

    /// One page of products plus the total count for the same filter.
    async fn find_page(&self, query: &ProductQuery) -> Result<Page<Product>, StoreError>;

    async fn find_by_id(&self, id: &str) -> Result<Option<Product>, StoreError>;

    async fn create(&self, product: NewProduct) -> Result<Product, StoreError>;

    /// Apply `patch` and refresh `updated_at`. `None` when `id` is unknown.
    async fn update(&self, id: &str, patch: ProductPatch) -> Result<Option<Product>, StoreError>;

    /// `false` when nothing was deleted.
    async fn delete(&self, id: &str) -> Result<bool, StoreError>;

    /// Release connections. Called once after the server stops.
    async fn shutdown(&self);
}
