// src/handlers/product.rs
use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    Json,
};
use tracing::{debug, instrument};

use crate::dtos::product::{
    CreateProductRequest, DataResponse, ListMeta, ListProductsQuery, MessageResponse,
    ProductListResponse, UpdateProductRequest,
};
use crate::error::AppError;
use crate::models::query::total_pages;
use crate::models::{Product, ProductQuery};
use crate::state::AppState;
use crate::validation::{validate_new, validate_patch};

const INVALID_ID: &str = "Invalid product ID";
const NOT_FOUND: &str = "Product not found";

/// Reject ids the backend could never have issued, before touching it.
fn ensure_valid_id(state: &AppState, id: &str) -> Result<(), AppError> {
    if state.store.is_valid_id(id) {
        Ok(())
    } else {
        Err(AppError::invalid_id(INVALID_ID))
    }
}

// GET /products - List products with paging, category filter and sort
#[instrument(skip(state, params))]
pub async fn get_products(
    State(state): State<AppState>,
    params: Result<Query<Vec<(String, String)>>, QueryRejection>,
) -> Result<Json<ProductListResponse>, AppError> {
    let pairs = params.map(|Query(p)| p).unwrap_or_default();
    let query = ProductQuery::from(ListProductsQuery::from_pairs(pairs));
    debug!(?query, "listing products");

    let page = state.store.find_page(&query).await?;

    Ok(Json(ProductListResponse {
        success: true,
        meta: ListMeta {
            count: page.items.len(),
            total_products: page.total,
            total_pages: total_pages(page.total, query.limit),
            current_page: query.page,
        },
        data: page.items,
    }))
}

// GET /products/{id} - Get single product
#[instrument(skip(state))]
pub async fn get_product(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<DataResponse<Product>>, AppError> {
    ensure_valid_id(&state, &id)?;

    let product = state
        .store
        .find_by_id(&id)
        .await?
        .ok_or_else(|| AppError::not_found(NOT_FOUND))?;

    Ok(Json(DataResponse::new(product)))
}

// POST /products - Create new product
#[instrument(skip(state, payload))]
pub async fn create_product(
    State(state): State<AppState>,
    payload: Result<Json<CreateProductRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<DataResponse<Product>>), AppError> {
    let Json(payload) = payload?;
    let new = validate_new(payload).map_err(AppError::validation)?;

    let product = state.store.create(new).await?;
    debug!(id = %product.id, "product created");

    Ok((StatusCode::CREATED, Json(DataResponse::new(product))))
}

// PUT /products/{id} - Update the provided fields of a product
#[instrument(skip(state, payload))]
pub async fn update_product(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<UpdateProductRequest>, JsonRejection>,
) -> Result<Json<DataResponse<Product>>, AppError> {
    ensure_valid_id(&state, &id)?;
    let Json(payload) = payload?;
    let patch = validate_patch(payload).map_err(AppError::validation)?;

    let product = state
        .store
        .update(&id, patch)
        .await?
        .ok_or_else(|| AppError::not_found(NOT_FOUND))?;

    Ok(Json(DataResponse::new(product)))
}

// DELETE /products/{id} - Delete product
#[instrument(skip(state))]
pub async fn delete_product(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<MessageResponse>, AppError> {
    ensure_valid_id(&state, &id)?;

    if !state.store.delete(&id).await? {
        return Err(AppError::not_found(NOT_FOUND));
    }

    Ok(Json(MessageResponse::new("Product deleted successfully")))
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use axum::body::{to_bytes, Body};
    use axum::http::{header::CONTENT_TYPE, Method, Request};
    use axum::Router;
    use chrono::{DateTime, Utc};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use crate::models::{NewProduct, Page, ProductPatch};
    use crate::routes::create_router;
    use crate::store::{MemoryStore, ProductStore, StoreError};

    use super::*;

    /// Memory store that counts every data-access call.
    #[derive(Default)]
    struct CountingStore {
        inner: MemoryStore,
        calls: AtomicUsize,
    }

    impl CountingStore {
        fn hit(&self) {
            self.calls.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl ProductStore for CountingStore {
        fn name(&self) -> &'static str {
            "counting"
        }

        fn is_valid_id(&self, id: &str) -> bool {
            self.inner.is_valid_id(id)
        }

        async fn find_page(&self, query: &ProductQuery) -> Result<Page<Product>, StoreError> {
            self.hit();
            self.inner.find_page(query).await
        }

        async fn find_by_id(&self, id: &str) -> Result<Option<Product>, StoreError> {
            self.hit();
            self.inner.find_by_id(id).await
        }

        async fn create(&self, product: NewProduct) -> Result<Product, StoreError> {
            self.hit();
            self.inner.create(product).await
        }

        async fn update(
            &self,
            id: &str,
            patch: ProductPatch,
        ) -> Result<Option<Product>, StoreError> {
            self.hit();
            self.inner.update(id, patch).await
        }

        async fn delete(&self, id: &str) -> Result<bool, StoreError> {
            self.hit();
            self.inner.delete(id).await
        }

        async fn shutdown(&self) {}
    }

    fn app() -> Router {
        app_with(Arc::new(MemoryStore::new()))
    }

    fn app_with(store: Arc<dyn ProductStore>) -> Router {
        create_router().with_state(AppState::new(store))
    }

    async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => builder
                .header(CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string())),
            None => builder.body(Body::empty()),
        }
        .unwrap();

        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, json)
    }

    fn pen() -> Value {
        json!({
            "name": "Pen",
            "description": "Blue pen",
            "price": 1.5,
            "category": "Stationery",
            "stock": 100
        })
    }

    fn timestamp(value: &Value) -> DateTime<Utc> {
        value.as_str().unwrap().parse().unwrap()
    }

    async fn seed(app: &Router, count: usize) {
        for i in 0..count {
            let category = if i % 2 == 0 { "Even" } else { "Odd" };
            let (status, _) = send(
                app,
                Method::POST,
                "/products",
                Some(json!({
                    "name": format!("Item {i:02}"),
                    "description": "seeded",
                    "price": i as f64,
                    "category": category,
                    "stock": i
                })),
            )
            .await;
            assert_eq!(status, StatusCode::CREATED);
        }
    }

    #[tokio::test]
    async fn create_returns_stored_record() {
        let app = app();
        let (status, body) = send(&app, Method::POST, "/products", Some(pen())).await;

        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["success"], true);
        let data = &body["data"];
        assert_eq!(data["name"], "Pen");
        assert_eq!(data["description"], "Blue pen");
        assert_eq!(data["price"], 1.5);
        assert_eq!(data["category"], "Stationery");
        assert_eq!(data["stock"], 100);
        assert!(data["id"].as_str().is_some_and(|id| !id.is_empty()));
        assert_eq!(timestamp(&data["createdAt"]), timestamp(&data["updatedAt"]));
    }

    #[tokio::test]
    async fn created_product_can_be_fetched_by_id() {
        let app = app();
        let (_, created) = send(&app, Method::POST, "/products", Some(pen())).await;
        let id = created["data"]["id"].as_str().unwrap();

        let (status, fetched) = send(&app, Method::GET, &format!("/products/{id}"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(fetched["data"], created["data"]);
    }

    #[tokio::test]
    async fn create_reports_missing_fields() {
        let app = app();
        let (status, body) = send(
            &app,
            Method::POST,
            "/products",
            Some(json!({ "name": "Pen", "price": -1 })),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
        let fields: Vec<&str> = body["details"]
            .as_array()
            .unwrap()
            .iter()
            .map(|d| d["field"].as_str().unwrap())
            .collect();
        assert_eq!(fields, ["description", "price", "category"]);
    }

    #[tokio::test]
    async fn malformed_body_is_a_validation_failure() {
        let app = app();
        let request = Request::builder()
            .method(Method::POST)
            .uri("/products")
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from("{not json"))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["success"], false);
        assert_eq!(body["details"][0]["field"], "body");
    }

    #[tokio::test]
    async fn list_reports_paging_meta() {
        let app = app();
        seed(&app, 25).await;

        let (status, body) = send(&app, Method::GET, "/products?page=3&limit=10", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["data"].as_array().unwrap().len(), 5);
        assert_eq!(
            body["meta"],
            json!({ "count": 5, "totalProducts": 25, "totalPages": 3, "currentPage": 3 })
        );
    }

    #[tokio::test]
    async fn page_size_never_exceeds_limit() {
        let app = app();
        seed(&app, 7).await;

        for limit in 1..=8u64 {
            for page in 1..=8u64 {
                let uri = format!("/products?page={page}&limit={limit}");
                let (_, body) = send(&app, Method::GET, &uri, None).await;
                let count = body["meta"]["count"].as_u64().unwrap();
                assert!(count <= limit);
                assert_eq!(body["meta"]["totalPages"], 7u64.div_ceil(limit));
            }
        }
    }

    #[tokio::test]
    async fn malformed_paging_params_fall_back_to_defaults() {
        let app = app();
        seed(&app, 12).await;

        let (status, body) =
            send(&app, Method::GET, "/products?page=abc&limit=-5&sortBy=secret", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["meta"]["currentPage"], 1);
        assert_eq!(body["meta"]["count"], 10);
        assert_eq!(body["meta"]["totalPages"], 2);
        // createdAt ascending
        assert_eq!(body["data"][0]["name"], "Item 00");
    }

    #[tokio::test]
    async fn repeated_query_keys_keep_the_category_filter() {
        let app = app();
        seed(&app, 6).await;

        let (status, body) =
            send(&app, Method::GET, "/products?category=Odd&page=1&page=1", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["meta"]["totalProducts"], 3);
        assert!(body["data"]
            .as_array()
            .unwrap()
            .iter()
            .all(|p| p["category"] == "Odd"));
    }

    #[tokio::test]
    async fn list_filters_by_category_and_sorts() {
        let app = app();
        seed(&app, 6).await;

        let (_, body) = send(
            &app,
            Method::GET,
            "/products?category=Odd&sortBy=price&sortOrder=desc",
            None,
        )
        .await;
        let names: Vec<&str> = body["data"]
            .as_array()
            .unwrap()
            .iter()
            .map(|p| p["name"].as_str().unwrap())
            .collect();
        assert_eq!(names, ["Item 05", "Item 03", "Item 01"]);
        assert_eq!(body["meta"]["totalProducts"], 3);
        assert_eq!(body["meta"]["totalPages"], 1);
    }

    #[tokio::test]
    async fn empty_catalog_has_zero_pages() {
        let app = app();
        let (status, body) = send(&app, Method::GET, "/products", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body["meta"],
            json!({ "count": 0, "totalProducts": 0, "totalPages": 0, "currentPage": 1 })
        );
    }

    #[tokio::test]
    async fn malformed_ids_never_reach_the_store() {
        let store = Arc::new(CountingStore::default());
        let app = app_with(store.clone());

        for id in ["not-an-id", "+5", "007", "0"] {
            for (method, body) in [
                (Method::GET, None),
                (Method::PUT, Some(json!({ "price": 2.0 }))),
                (Method::DELETE, None),
            ] {
                let (status, response) =
                    send(&app, method, &format!("/products/{id}"), body).await;
                assert_eq!(status, StatusCode::BAD_REQUEST);
                assert_eq!(response["error"], INVALID_ID);
            }
        }

        assert_eq!(store.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn update_changes_only_given_fields_and_advances_timestamp() {
        let app = app();
        let (_, created) = send(&app, Method::POST, "/products", Some(pen())).await;
        let id = created["data"]["id"].as_str().unwrap();

        tokio::time::sleep(Duration::from_millis(5)).await;

        let (status, updated) = send(
            &app,
            Method::PUT,
            &format!("/products/{id}"),
            Some(json!({ "price": 2.25, "imageUrl": "pen.png" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let before = &created["data"];
        let after = &updated["data"];
        assert_eq!(after["price"], 2.25);
        assert_eq!(after["imageUrl"], "pen.png");
        for field in ["id", "name", "description", "category", "stock", "createdAt"] {
            assert_eq!(after[field], before[field], "{field} changed");
        }
        assert!(timestamp(&after["updatedAt"]) > timestamp(&before["updatedAt"]));
    }

    #[tokio::test]
    async fn empty_update_still_refreshes_timestamp() {
        let app = app();
        let (_, created) = send(&app, Method::POST, "/products", Some(pen())).await;
        let id = created["data"]["id"].as_str().unwrap();

        tokio::time::sleep(Duration::from_millis(5)).await;

        let (status, updated) =
            send(&app, Method::PUT, &format!("/products/{id}"), Some(json!({}))).await;
        assert_eq!(status, StatusCode::OK);
        assert!(
            timestamp(&updated["data"]["updatedAt"]) > timestamp(&created["data"]["updatedAt"])
        );
    }

    #[tokio::test]
    async fn update_rejects_invalid_values() {
        let app = app();
        let (_, created) = send(&app, Method::POST, "/products", Some(pen())).await;
        let id = created["data"]["id"].as_str().unwrap();

        let (status, body) = send(
            &app,
            Method::PUT,
            &format!("/products/{id}"),
            Some(json!({ "stock": -3 })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["details"][0]["field"], "stock");

        let (_, fetched) = send(&app, Method::GET, &format!("/products/{id}"), None).await;
        assert_eq!(fetched["data"]["stock"], 100);
    }

    #[tokio::test]
    async fn unknown_ids_are_not_found() {
        let app = app();

        let (status, _) = send(&app, Method::GET, "/products/999", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = send(
            &app,
            Method::PUT,
            "/products/999",
            Some(json!({ "name": "Ghost" })),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, body) = send(&app, Method::DELETE, "/products/999", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], NOT_FOUND);
    }

    #[tokio::test]
    async fn delete_removes_the_product() {
        let app = app();
        let (_, created) = send(&app, Method::POST, "/products", Some(pen())).await;
        let uri = format!("/products/{}", created["data"]["id"].as_str().unwrap());

        let (status, body) = send(&app, Method::DELETE, &uri, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert!(body["message"].is_string());

        let (status, _) = send(&app, Method::GET, &uri, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = send(&app, Method::DELETE, &uri, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn duplicate_sku_conflicts_and_keeps_first() {
        let app = app();
        let mut first = pen();
        first["sku"] = json!("PEN-001");
        let (status, created) = send(&app, Method::POST, "/products", Some(first)).await;
        assert_eq!(status, StatusCode::CREATED);

        let mut second = pen();
        second["sku"] = json!("PEN-001");
        second["name"] = json!("Other pen");
        let (status, body) = send(&app, Method::POST, "/products", Some(second)).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["success"], false);

        let id = created["data"]["id"].as_str().unwrap();
        let (_, fetched) = send(&app, Method::GET, &format!("/products/{id}"), None).await;
        assert_eq!(fetched["data"], created["data"]);

        let (_, list) = send(&app, Method::GET, "/products", None).await;
        assert_eq!(list["meta"]["totalProducts"], 1);
    }

    #[tokio::test]
    async fn health_is_ok() {
        let app = app();
        let response = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
