// src/store/postgres.rs
// Relational backend. Products reference a `categories` row that is
// upserted by name on every write that names a category.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgConnection, PgPool, Postgres, QueryBuilder};

use super::{parse_serial, ProductStore, StoreError, DUPLICATE_SKU};
use crate::models::{NewProduct, Page, Product, ProductPatch, ProductQuery, SortField, SortOrder};
use crate::validation::FieldError;

const SELECT_PRODUCT: &str = "SELECT p.id, p.sku, p.name, p.description, p.short_description,
        p.price, p.stock, c.name AS category, p.image_url, p.created_at, p.updated_at
    FROM products p
    JOIN categories c ON c.id = p.category_id";

const COUNT_PRODUCTS: &str = "SELECT COUNT(*)
    FROM products p
    JOIN categories c ON c.id = p.category_id";

#[derive(Debug, FromRow)]
struct ProductRow {
    id: i64,
    sku: Option<String>,
    name: String,
    description: String,
    short_description: Option<String>,
    price: f64,
    stock: i32,
    category: String,
    image_url: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<ProductRow> for Product {
    fn from(row: ProductRow) -> Self {
        Self {
            id: row.id.to_string(),
            sku: row.sku,
            name: row.name,
            description: row.description,
            short_description: row.short_description,
            price: row.price,
            stock: i64::from(row.stock),
            category: row.category,
            image_url: row.image_url,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn parse_id(id: &str) -> Option<i64> {
    parse_serial(id).and_then(|v| i64::try_from(v).ok())
}

fn sort_column(field: SortField) -> &'static str {
    match field {
        SortField::Name => "p.name",
        SortField::Price => "p.price",
        SortField::Stock => "p.stock",
        SortField::Category => "c.name",
        SortField::CreatedAt => "p.created_at",
        SortField::UpdatedAt => "p.updated_at",
    }
}

fn direction(order: SortOrder) -> &'static str {
    match order {
        SortOrder::Asc => " ASC",
        SortOrder::Desc => " DESC",
    }
}

fn push_filter(qb: &mut QueryBuilder<'_, Postgres>, query: &ProductQuery) {
    if let Some(category) = &query.category {
        qb.push(" WHERE c.name = ").push_bind(category.clone());
    }
}

fn stock_column(stock: i64) -> Result<i32, StoreError> {
    i32::try_from(stock).map_err(|_| {
        StoreError::Constraint(vec![FieldError::new("stock", "stock is out of range")])
    })
}

fn constraint_field(constraint: Option<&str>) -> &'static str {
    match constraint {
        Some("products_name_check") => "name",
        Some("products_price_check") => "price",
        Some("products_stock_check") => "stock",
        Some("products_updated_after_created") => "updatedAt",
        _ => "product",
    }
}

/// Map Postgres SQLSTATEs onto the store taxonomy.
fn classify(err: sqlx::Error) -> StoreError {
    if let Some(db) = err.as_database_error() {
        match db.code().as_deref() {
            // unique_violation
            Some("23505") => return StoreError::Conflict(DUPLICATE_SKU.into()),
            // not_null_violation, check_violation, string_data_right_truncation
            Some("23502") | Some("23514") | Some("22001") => {
                return StoreError::Constraint(vec![FieldError::new(
                    constraint_field(db.constraint()),
                    db.message().to_string(),
                )]);
            }
            _ => {}
        }
    }
    StoreError::Sqlx(err)
}

/// Find-or-create a category by name and return its id.
async fn upsert_category(conn: &mut PgConnection, name: &str) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar(
        "INSERT INTO categories (name) VALUES ($1)
         ON CONFLICT (name) DO UPDATE SET name = EXCLUDED.name
         RETURNING id",
    )
    .bind(name)
    .fetch_one(&mut *conn)
    .await
}

async fn fetch_row(conn: &mut PgConnection, id: i64) -> Result<Option<ProductRow>, sqlx::Error> {
    sqlx::query_as::<_, ProductRow>(&format!("{SELECT_PRODUCT} WHERE p.id = $1"))
        .bind(id)
        .fetch_optional(&mut *conn)
        .await
}

#[async_trait]
impl ProductStore for PostgresStore {
    fn name(&self) -> &'static str {
        "postgres"
    }

    fn is_valid_id(&self, id: &str) -> bool {
        parse_id(id).is_some()
    }

    async fn find_page(&self, query: &ProductQuery) -> Result<Page<Product>, StoreError> {
        // Count and page must see the same snapshot.
        let mut tx = self.pool.begin().await?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ, READ ONLY")
            .execute(&mut *tx)
            .await?;

        let mut count = QueryBuilder::<Postgres>::new(COUNT_PRODUCTS);
        push_filter(&mut count, query);
        let total = count
            .build_query_scalar::<i64>()
            .fetch_one(&mut *tx)
            .await?;

        let mut select = QueryBuilder::<Postgres>::new(SELECT_PRODUCT);
        push_filter(&mut select, query);
        select
            .push(" ORDER BY ")
            .push(sort_column(query.sort_by))
            .push(direction(query.sort_order))
            .push(", p.id ASC LIMIT ")
            .push_bind(i64::try_from(query.limit).unwrap_or(i64::MAX))
            .push(" OFFSET ")
            .push_bind(i64::try_from(query.offset()).unwrap_or(i64::MAX));
        let rows = select
            .build_query_as::<ProductRow>()
            .fetch_all(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(Page {
            items: rows.into_iter().map(Product::from).collect(),
            total: u64::try_from(total).unwrap_or(0),
        })
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Product>, StoreError> {
        let Some(key) = parse_id(id) else {
            return Ok(None);
        };
        let mut conn = self.pool.acquire().await?;
        Ok(fetch_row(&mut conn, key).await?.map(Product::from))
    }

    async fn create(&self, new: NewProduct) -> Result<Product, StoreError> {
        let stock = stock_column(new.stock)?;
        let mut tx = self.pool.begin().await?;

        let category_id = upsert_category(&mut tx, &new.category).await.map_err(classify)?;
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO products
                (sku, name, description, short_description, price, stock, category_id, image_url)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
             RETURNING id",
        )
        .bind(new.sku)
        .bind(new.name)
        .bind(new.description)
        .bind(new.short_description)
        .bind(new.price)
        .bind(stock)
        .bind(category_id)
        .bind(new.image_url)
        .fetch_one(&mut *tx)
        .await
        .map_err(classify)?;

        let row = fetch_row(&mut tx, id)
            .await?
            .ok_or(sqlx::Error::RowNotFound)?;
        tx.commit().await?;

        tracing::debug!(id, category_id, "product inserted");
        Ok(row.into())
    }

    async fn update(&self, id: &str, patch: ProductPatch) -> Result<Option<Product>, StoreError> {
        let Some(key) = parse_id(id) else {
            return Ok(None);
        };
        let stock = patch.stock.map(stock_column).transpose()?;
        let mut tx = self.pool.begin().await?;

        let category_id = match patch.category.as_deref() {
            Some(name) => Some(upsert_category(&mut tx, name).await.map_err(classify)?),
            None => None,
        };

        let updated: Option<i64> = sqlx::query_scalar(
            "UPDATE products SET
                sku = COALESCE($1, sku),
                name = COALESCE($2, name),
                description = COALESCE($3, description),
                short_description = COALESCE($4, short_description),
                price = COALESCE($5, price),
                stock = COALESCE($6, stock),
                category_id = COALESCE($7, category_id),
                image_url = COALESCE($8, image_url),
                updated_at = GREATEST(now(), updated_at)
             WHERE id = $9
             RETURNING id",
        )
        .bind(patch.sku)
        .bind(patch.name)
        .bind(patch.description)
        .bind(patch.short_description)
        .bind(patch.price)
        .bind(stock)
        .bind(category_id)
        .bind(patch.image_url)
        .bind(key)
        .fetch_optional(&mut *tx)
        .await
        .map_err(classify)?;

        if updated.is_none() {
            // Drop any category the patch would have created.
            tx.rollback().await?;
            return Ok(None);
        }

        let row = fetch_row(&mut tx, key).await?;
        tx.commit().await?;
        Ok(row.map(Product::from))
    }

    async fn delete(&self, id: &str) -> Result<bool, StoreError> {
        let Some(key) = parse_id(id) else {
            return Ok(false);
        };
        let result = sqlx::query("DELETE FROM products WHERE id = $1")
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn shutdown(&self) {
        self.pool.close().await;
    }
}
