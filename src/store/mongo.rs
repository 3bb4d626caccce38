// src/store/mongo.rs
// Document backend. Category is an inline string; ids are ObjectIds.
// Field names match the collection layout (`imageUrl`, `createdAt`, ...).
// Without a replica-set session there is no snapshot read, so the list
// count and page are two sequential reads.

use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::bson::{self, doc, oid::ObjectId, Bson, Document};
use mongodb::error::{ErrorKind, WriteFailure};
use mongodb::options::{IndexOptions, ReturnDocument};
use mongodb::{Client, Collection, IndexModel};
use serde::{Deserialize, Serialize};

use super::{ProductStore, StoreError, DUPLICATE_SKU};
use crate::models::{NewProduct, Page, Product, ProductPatch, ProductQuery, SortOrder};

const COLLECTION: &str = "products";
const DUPLICATE_KEY: i32 = 11000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProductDocument {
    #[serde(rename = "_id")]
    id: ObjectId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    sku: Option<String>,
    name: String,
    description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    short_description: Option<String>,
    price: f64,
    #[serde(default)]
    stock: i64,
    category: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    image_url: Option<String>,
    created_at: bson::DateTime,
    updated_at: bson::DateTime,
}

impl ProductDocument {
    fn from_new(new: NewProduct, now: bson::DateTime) -> Self {
        Self {
            id: ObjectId::new(),
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
        }
    }
}

impl From<ProductDocument> for Product {
    fn from(d: ProductDocument) -> Self {
        Self {
            id: d.id.to_hex(),
            sku: d.sku,
            name: d.name,
            description: d.description,
            short_description: d.short_description,
            price: d.price,
            stock: d.stock,
            category: d.category,
            image_url: d.image_url,
            created_at: d.created_at.to_chrono(),
            updated_at: d.updated_at.to_chrono(),
        }
    }
}

pub struct MongoStore {
    client: Client,
    collection: Collection<ProductDocument>,
}

impl MongoStore {
    /// Connect and make sure the collection indexes exist.
    pub async fn connect(uri: &str, database: &str) -> Result<Self, StoreError> {
        let client = Client::with_uri_str(uri).await?;
        let collection = client.database(database).collection(COLLECTION);
        let store = Self { client, collection };
        store.ensure_indexes().await?;
        Ok(store)
    }

    async fn ensure_indexes(&self) -> Result<(), StoreError> {
        let sku = IndexModel::builder()
            .keys(doc! { "sku": 1 })
            .options(
                IndexOptions::builder()
                    .name("sku_unique".to_string())
                    .unique(true)
                    .partial_filter_expression(doc! { "sku": { "$type": "string" } })
                    .build(),
            )
            .build();
        let by_category = IndexModel::builder()
            .keys(doc! { "category": 1, "createdAt": 1 })
            .options(
                IndexOptions::builder()
                    .name("category_created_at".to_string())
                    .build(),
            )
            .build();

        self.collection.create_indexes([sku, by_category]).await?;
        Ok(())
    }
}

fn parse_id(id: &str) -> Option<ObjectId> {
    ObjectId::parse_str(id).ok()
}

fn filter_document(query: &ProductQuery) -> Document {
    match &query.category {
        Some(category) => doc! { "category": category.as_str() },
        None => Document::new(),
    }
}

fn sort_document(query: &ProductQuery) -> Document {
    let direction = match query.sort_order {
        SortOrder::Asc => 1,
        SortOrder::Desc => -1,
    };
    let mut sort = Document::new();
    sort.insert(query.sort_by.as_str(), direction);
    sort.insert("_id", 1);
    sort
}

/// Update pipeline for `patch`. Values go through `$literal` so strings that
/// start with `$` are not read as field paths.
fn update_pipeline(patch: ProductPatch) -> Vec<Document> {
    let mut set = Document::new();
    let mut put = |key: &str, value: Option<Bson>| {
        if let Some(value) = value {
            set.insert(key, doc! { "$literal": value });
        }
    };

    put("sku", patch.sku.map(Bson::from));
    put("name", patch.name.map(Bson::from));
    put("description", patch.description.map(Bson::from));
    put("shortDescription", patch.short_description.map(Bson::from));
    put("price", patch.price.map(Bson::from));
    put("stock", patch.stock.map(Bson::from));
    put("category", patch.category.map(Bson::from));
    put("imageUrl", patch.image_url.map(Bson::from));

    set.insert("updatedAt", doc! { "$max": ["$updatedAt", "$$NOW"] });
    vec![doc! { "$set": set }]
}

fn is_duplicate_key(err: &mongodb::error::Error) -> bool {
    match err.kind.as_ref() {
        ErrorKind::Write(WriteFailure::WriteError(e)) => e.code == DUPLICATE_KEY,
        ErrorKind::Command(e) => e.code == DUPLICATE_KEY,
        _ => false,
    }
}

fn classify(err: mongodb::error::Error) -> StoreError {
    if is_duplicate_key(&err) {
        StoreError::Conflict(DUPLICATE_SKU.into())
    } else {
        StoreError::Mongo(err)
    }
}

#[async_trait]
impl ProductStore for MongoStore {
    fn name(&self) -> &'static str {
        "mongo"
    }

    fn is_valid_id(&self, id: &str) -> bool {
        parse_id(id).is_some()
    }

    async fn find_page(&self, query: &ProductQuery) -> Result<Page<Product>, StoreError> {
        let filter = filter_document(query);

        let total = self.collection.count_documents(filter.clone()).await?;
        let docs: Vec<ProductDocument> = self
            .collection
            .find(filter)
            .sort(sort_document(query))
            .skip(query.offset())
            .limit(i64::try_from(query.limit).unwrap_or(i64::MAX))
            .await?
            .try_collect()
            .await?;

        Ok(Page {
            items: docs.into_iter().map(Product::from).collect(),
            total,
        })
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Product>, StoreError> {
        let Some(oid) = parse_id(id) else {
            return Ok(None);
        };
        let found = self.collection.find_one(doc! { "_id": oid }).await?;
        Ok(found.map(Product::from))
    }

    async fn create(&self, new: NewProduct) -> Result<Product, StoreError> {
        let document = ProductDocument::from_new(new, bson::DateTime::now());
        self.collection
            .insert_one(&document)
            .await
            .map_err(classify)?;
        tracing::debug!(id = %document.id, "product inserted");
        Ok(document.into())
    }

    async fn update(&self, id: &str, patch: ProductPatch) -> Result<Option<Product>, StoreError> {
        let Some(oid) = parse_id(id) else {
            return Ok(None);
        };
        let updated = self
            .collection
            .find_one_and_update(doc! { "_id": oid }, update_pipeline(patch))
            .return_document(ReturnDocument::After)
            .await
            .map_err(classify)?;
        Ok(updated.map(Product::from))
    }

    async fn delete(&self, id: &str) -> Result<bool, StoreError> {
        let Some(oid) = parse_id(id) else {
            return Ok(false);
        };
        let result = self.collection.delete_one(doc! { "_id": oid }).await?;
        Ok(result.deleted_count > 0)
    }

    async fn shutdown(&self) {
        self.client.clone().shutdown().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SortField;

    fn pen() -> NewProduct {
        NewProduct {
            sku: None,
            name: "Pen".into(),
            description: "Blue pen".into(),
            short_description: None,
            price: 1.5,
            stock: 100,
            category: "Stationery".into(),
            image_url: None,
        }
    }

    #[test]
    fn ids_are_object_ids() {
        assert!(parse_id("507f1f77bcf86cd799439011").is_some());
        assert!(parse_id("507f1f77bcf86cd79943901").is_none());
        assert!(parse_id("zzzzzzzzzzzzzzzzzzzzzzzz").is_none());
        assert!(parse_id("12").is_none());
    }

    #[test]
    fn sort_document_breaks_ties_on_id() {
        let query = ProductQuery {
            sort_by: SortField::Price,
            sort_order: SortOrder::Desc,
            ..Default::default()
        };
        assert_eq!(sort_document(&query), doc! { "price": -1, "_id": 1 });
        assert_eq!(
            sort_document(&ProductQuery::default()),
            doc! { "createdAt": 1, "_id": 1 }
        );
    }

    #[test]
    fn filter_document_matches_category_exactly() {
        let query = ProductQuery {
            category: Some("Office".into()),
            ..Default::default()
        };
        assert_eq!(filter_document(&query), doc! { "category": "Office" });
        assert!(filter_document(&ProductQuery::default()).is_empty());
    }

    #[test]
    fn update_pipeline_sets_only_provided_fields() {
        let pipeline = update_pipeline(ProductPatch {
            name: Some("$where".into()),
            stock: Some(3),
            ..Default::default()
        });
        assert_eq!(pipeline.len(), 1);
        let set = pipeline[0].get_document("$set").unwrap();
        assert_eq!(
            set.get_document("name").unwrap(),
            &doc! { "$literal": "$where" }
        );
        assert_eq!(
            set.get_document("stock").unwrap(),
            &doc! { "$literal": 3_i64 }
        );
        assert!(set.get("price").is_none());
        assert!(set.contains_key("updatedAt"));
    }

    #[test]
    fn new_document_round_trips_through_bson() {
        let document = ProductDocument::from_new(pen(), bson::DateTime::now());
        assert_eq!(document.created_at, document.updated_at);

        let raw = bson::to_document(&document).unwrap();
        assert!(raw.contains_key("_id"));
        assert!(raw.contains_key("createdAt"));
        assert!(!raw.contains_key("sku"));

        let back: ProductDocument = bson::from_document(raw).unwrap();
        assert_eq!(back, document);

        let product = Product::from(back);
        assert_eq!(product.id, document.id.to_hex());
        assert_eq!(product.created_at, product.updated_at);
    }
}
