// src/database.rs
use std::sync::Arc;

use sqlx::postgres::{PgPool, PgPoolOptions};

use crate::config::DatabaseConfig;
use crate::store::{MemoryStore, MongoStore, PostgresStore, ProductStore, StoreError};

pub async fn create_pool(database_url: &str, max_connections: u32) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await
}

/// Open the configured backend once for the whole process.
pub async fn connect(config: &DatabaseConfig) -> Result<Arc<dyn ProductStore>, StoreError> {
    let store: Arc<dyn ProductStore> = match config {
        DatabaseConfig::Postgres {
            url,
            max_connections,
        } => {
            let pool = create_pool(url, *max_connections).await?;
            sqlx::migrate!("./migrations").run(&pool).await?;
            Arc::new(PostgresStore::new(pool))
        }
        DatabaseConfig::Mongo { url, database } => {
            Arc::new(MongoStore::connect(url, database).await?)
        }
        DatabaseConfig::Memory => Arc::new(MemoryStore::new()),
    };

    tracing::info!(backend = store.name(), "Database connected");
    Ok(store)
}
