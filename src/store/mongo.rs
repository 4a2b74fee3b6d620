//! # MongoDB Store
//!
//! A [`DocumentStore`] backed by the official MongoDB driver. Values cross
//! the boundary through a lossless `ExtendedValue` <-> BSON mapping; BSON
//! types outside the extended-value model are reported as
//! [`StoreError::Unrepresentable`].

use std::time::Duration;

use async_trait::async_trait;
use futures_util::TryStreamExt;
use mongodb::{
    bson::{self, doc, Bson},
    error::ErrorKind,
    options::{
        ClientOptions, FindOneOptions as DriverFindOneOptions, FindOptions as DriverFindOptions,
        UpdateOptions as DriverUpdateOptions,
    },
    Client, Collection,
};
use tracing::info;

use crate::codec::{Document, ExtendedValue};

use super::errors::{StoreError, StoreResult};
use super::{DocumentStore, FindOptions, Namespace, Update, UpdateOptions, UpdateOutcome};

/// Connect and server-selection timeout applied at start-up
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// MongoDB-backed document store
#[derive(Debug, Clone)]
pub struct MongoStore {
    client: Client,
}

impl MongoStore {
    /// Connect to a deployment and verify it answers a ping
    pub async fn connect(uri: &str) -> StoreResult<Self> {
        let mut options = ClientOptions::parse(uri).await.map_err(convert_error)?;
        options.connect_timeout = Some(CONNECT_TIMEOUT);
        options.server_selection_timeout = Some(CONNECT_TIMEOUT);
        options.app_name = Some(env!("CARGO_PKG_NAME").to_string());

        let client = Client::with_options(options).map_err(convert_error)?;
        let store = Self { client };
        store.ping().await?;

        info!("connected to MongoDB");
        Ok(store)
    }

    fn collection(&self, ns: &Namespace) -> Collection<bson::Document> {
        self.client
            .database(&ns.database)
            .collection::<bson::Document>(&ns.collection)
    }
}

/// Map driver errors onto store errors
fn convert_error(err: mongodb::error::Error) -> StoreError {
    match err.kind.as_ref() {
        ErrorKind::Io(_)
        | ErrorKind::ServerSelection { .. }
        | ErrorKind::ConnectionPoolCleared { .. }
        | ErrorKind::Authentication { .. }
        | ErrorKind::DnsResolve { .. } => StoreError::Connection(err.to_string()),
        ErrorKind::InvalidArgument { .. } => StoreError::InvalidQuery(err.to_string()),
        _ if err.to_string().contains("E11000") => StoreError::DuplicateKey(err.to_string()),
        _ => StoreError::Backend(err.to_string()),
    }
}

/// Convert an extended value to BSON
pub fn to_bson(value: &ExtendedValue) -> Bson {
    match value {
        ExtendedValue::Null => Bson::Null,
        ExtendedValue::Bool(b) => Bson::Boolean(*b),
        ExtendedValue::Int64(n) => Bson::Int64(*n),
        ExtendedValue::Float64(f) => Bson::Double(*f),
        ExtendedValue::String(s) => Bson::String(s.clone()),
        ExtendedValue::ObjectId(oid) => Bson::ObjectId(*oid),
        ExtendedValue::DateTime(millis) => Bson::DateTime(bson::DateTime::from_millis(*millis)),
        ExtendedValue::Array(items) => Bson::Array(items.iter().map(to_bson).collect()),
        ExtendedValue::Object(doc) => Bson::Document(to_bson_document(doc)),
    }
}

pub fn to_bson_document(doc: &Document) -> bson::Document {
    let mut out = bson::Document::new();
    for (key, value) in doc.iter() {
        out.insert(key, to_bson(value));
    }
    out
}

/// Convert BSON back into an extended value
pub fn from_bson(value: Bson) -> StoreResult<ExtendedValue> {
    Ok(match value {
        Bson::Null => ExtendedValue::Null,
        Bson::Boolean(b) => ExtendedValue::Bool(b),
        Bson::Int32(n) => ExtendedValue::Int64(i64::from(n)),
        Bson::Int64(n) => ExtendedValue::Int64(n),
        Bson::Double(f) => ExtendedValue::Float64(f),
        Bson::String(s) => ExtendedValue::String(s),
        Bson::ObjectId(oid) => ExtendedValue::ObjectId(oid),
        Bson::DateTime(dt) => ExtendedValue::DateTime(dt.timestamp_millis()),
        Bson::Array(items) => ExtendedValue::Array(
            items
                .into_iter()
                .map(from_bson)
                .collect::<StoreResult<Vec<_>>>()?,
        ),
        Bson::Document(doc) => ExtendedValue::Object(from_bson_document(doc)?),
        other => {
            return Err(StoreError::Unrepresentable(format!(
                "{:?}",
                other.element_type()
            )))
        }
    })
}

pub fn from_bson_document(doc: bson::Document) -> StoreResult<Document> {
    doc.into_iter()
        .map(|(key, value)| Ok((key, from_bson(value)?)))
        .collect()
}

fn outcome(result: mongodb::results::UpdateResult) -> StoreResult<UpdateOutcome> {
    Ok(UpdateOutcome {
        matched: result.matched_count,
        modified: result.modified_count,
        upserted_id: result.upserted_id.map(from_bson).transpose()?,
    })
}

fn find_options(options: &FindOptions) -> DriverFindOptions {
    let mut driver = DriverFindOptions::default();
    driver.projection = options.projection.as_ref().map(to_bson_document);
    driver.sort = options.sort.as_ref().map(to_bson_document);
    // limit 0 is unlimited
    driver.limit = options
        .limit
        .filter(|n| *n > 0)
        .map(|n| n.min(i64::MAX as u64) as i64);
    driver.skip = options.skip;
    driver
}

fn find_one_options(options: &FindOptions) -> DriverFindOneOptions {
    let mut driver = DriverFindOneOptions::default();
    driver.projection = options.projection.as_ref().map(to_bson_document);
    driver.sort = options.sort.as_ref().map(to_bson_document);
    driver
}

fn update_options(options: UpdateOptions) -> DriverUpdateOptions {
    let mut driver = DriverUpdateOptions::default();
    driver.upsert = Some(options.upsert);
    driver
}

#[async_trait]
impl DocumentStore for MongoStore {
    async fn ping(&self) -> StoreResult<()> {
        self.client
            .database("admin")
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(convert_error)?;
        Ok(())
    }

    async fn insert_one(&self, ns: &Namespace, document: Document) -> StoreResult<ExtendedValue> {
        let result = self
            .collection(ns)
            .insert_one(to_bson_document(&document))
            .await
            .map_err(convert_error)?;
        from_bson(result.inserted_id)
    }

    async fn insert_many(
        &self,
        ns: &Namespace,
        documents: Vec<Document>,
    ) -> StoreResult<Vec<ExtendedValue>> {
        let count = documents.len();
        let result = self
            .collection(ns)
            .insert_many(documents.iter().map(to_bson_document).collect::<Vec<_>>())
            .await
            .map_err(convert_error)?;

        let mut ids = result.inserted_ids;
        (0..count)
            .map(|index| {
                ids.remove(&index)
                    .ok_or_else(|| StoreError::Internal(format!("no inserted id at {}", index)))
                    .and_then(from_bson)
            })
            .collect()
    }

    async fn find_one(
        &self,
        ns: &Namespace,
        filter: Document,
        options: FindOptions,
    ) -> StoreResult<Option<Document>> {
        let found = self
            .collection(ns)
            .find_one(to_bson_document(&filter))
            .with_options(find_one_options(&options))
            .await
            .map_err(convert_error)?;
        found.map(from_bson_document).transpose()
    }

    async fn find(
        &self,
        ns: &Namespace,
        filter: Document,
        options: FindOptions,
    ) -> StoreResult<Vec<Document>> {
        let cursor = self
            .collection(ns)
            .find(to_bson_document(&filter))
            .with_options(find_options(&options))
            .await
            .map_err(convert_error)?;

        let docs: Vec<bson::Document> = cursor.try_collect().await.map_err(convert_error)?;
        docs.into_iter().map(from_bson_document).collect()
    }

    async fn update_one(
        &self,
        ns: &Namespace,
        filter: Document,
        update: Update,
        options: UpdateOptions,
    ) -> StoreResult<UpdateOutcome> {
        let filter = to_bson_document(&filter);
        let collection = self.collection(ns);
        let result = match update {
            Update::Document(doc) => collection.update_one(filter, to_bson_document(&doc)),
            Update::Pipeline(stages) => {
                collection.update_one(filter, stages.iter().map(to_bson_document).collect::<Vec<_>>())
            }
        }
        .with_options(update_options(options))
        .await
        .map_err(convert_error)?;
        outcome(result)
    }

    async fn update_many(
        &self,
        ns: &Namespace,
        filter: Document,
        update: Update,
        options: UpdateOptions,
    ) -> StoreResult<UpdateOutcome> {
        let filter = to_bson_document(&filter);
        let collection = self.collection(ns);
        let result = match update {
            Update::Document(doc) => collection.update_many(filter, to_bson_document(&doc)),
            Update::Pipeline(stages) => {
                collection.update_many(filter, stages.iter().map(to_bson_document).collect::<Vec<_>>())
            }
        }
        .with_options(update_options(options))
        .await
        .map_err(convert_error)?;
        outcome(result)
    }

    async fn delete_one(&self, ns: &Namespace, filter: Document) -> StoreResult<u64> {
        let result = self
            .collection(ns)
            .delete_one(to_bson_document(&filter))
            .await
            .map_err(convert_error)?;
        Ok(result.deleted_count)
    }

    async fn delete_many(&self, ns: &Namespace, filter: Document) -> StoreResult<u64> {
        let result = self
            .collection(ns)
            .delete_many(to_bson_document(&filter))
            .await
            .map_err(convert_error)?;
        Ok(result.deleted_count)
    }

    async fn aggregate(&self, ns: &Namespace, pipeline: Vec<Document>) -> StoreResult<Vec<Document>> {
        let cursor = self
            .collection(ns)
            .aggregate(pipeline.iter().map(to_bson_document).collect::<Vec<_>>())
            .await
            .map_err(convert_error)?;

        let docs: Vec<bson::Document> = cursor.try_collect().await.map_err(convert_error)?;
        docs.into_iter().map(from_bson_document).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::decode;
    use serde_json::json;

    #[test]
    fn test_bson_roundtrip_keeps_types_and_order() {
        let value = decode(
            &json!({
                "z": 1,
                "_id": {"$oid": "507f1f77bcf86cd799439011"},
                "at": {"$date": "2024-01-01T00:00:00Z"},
                "f": 1.5,
                "list": [null, true, "s"]
            }),
            "document",
        )
        .unwrap();
        let bson = to_bson(&value);
        let back = from_bson(bson).unwrap();
        assert_eq!(back, value);
        let keys: Vec<_> = back.as_document().unwrap().keys().collect();
        assert_eq!(keys, vec!["z", "_id", "at", "f", "list"]);
    }

    #[test]
    fn test_int32_widens() {
        assert_eq!(from_bson(Bson::Int32(7)).unwrap(), ExtendedValue::Int64(7));
    }

    #[test]
    fn test_unmodelled_types_are_unrepresentable() {
        let err = from_bson(Bson::Symbol("s".to_string())).unwrap_err();
        assert!(matches!(err, StoreError::Unrepresentable(_)));
        assert!(err.is_internal());
    }
}
