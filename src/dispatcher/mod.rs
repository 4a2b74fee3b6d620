//! # Operation Dispatcher
//!
//! Maps each operation kind to one store verb. Per request:
//! decode the domain-bearing fields, call the store under the request
//! timeout, encode the result and wrap it in the operation's envelope.

pub mod errors;
pub mod operation;

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::{json, Value as JsonValue};
use tracing::{debug, error};

use crate::codec::{encode, encode_document, Document, FloatMode};
use crate::observability::metrics;
use crate::store::{DocumentStore, Namespace, StoreResult, UpdateOutcome};

pub use errors::{ApiError, ApiResult, ErrorResponse};
pub use operation::{OperationDescriptor, OperationKind, Request};

/// Default per-request store timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Runs operations against a store
#[derive(Clone)]
pub struct Dispatcher {
    store: Arc<dyn DocumentStore>,
    float_mode: FloatMode,
    timeout: Duration,
}

impl Dispatcher {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            store,
            float_mode: FloatMode::default(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_float_mode(mut self, float_mode: FloatMode) -> Self {
        self.float_mode = float_mode;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn float_mode(&self) -> FloatMode {
        self.float_mode
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    /// Handle one parsed request body
    pub async fn dispatch(&self, kind: OperationKind, body: JsonValue) -> ApiResult<JsonValue> {
        let (ns, request) = OperationDescriptor::from_json(body)
            .and_then(|descriptor| descriptor.into_request(kind))
            .inspect_err(|e| debug!(operation = %kind, error = %e, "rejected request"))?;

        self.execute(kind, &ns, request).await
    }

    /// Run a validated request and build its response envelope
    pub async fn execute(
        &self,
        kind: OperationKind,
        ns: &Namespace,
        request: Request,
    ) -> ApiResult<JsonValue> {
        let store = &self.store;
        let mode = self.float_mode;

        match request {
            Request::InsertOne { document } => {
                let id = self.call(kind, ns, store.insert_one(ns, document)).await?;
                Ok(json!({ "insertedId": encode(&id, mode) }))
            }
            Request::InsertMany { documents } => {
                let ids = self.call(kind, ns, store.insert_many(ns, documents)).await?;
                let ids: Vec<JsonValue> = ids.iter().map(|id| encode(id, mode)).collect();
                Ok(json!({ "insertedIds": ids }))
            }
            Request::FindOne { filter, options } => {
                let found = self.call(kind, ns, store.find_one(ns, filter, options)).await?;
                let document = found.ok_or(ApiError::NotFound)?;
                Ok(json!({ "document": encode_document(&document, mode) }))
            }
            Request::Find { filter, options } => {
                let documents = self.call(kind, ns, store.find(ns, filter, options)).await?;
                Ok(json!({ "documents": self.encode_all(&documents) }))
            }
            Request::UpdateOne {
                filter,
                update,
                options,
            } => {
                let outcome = self
                    .call(kind, ns, store.update_one(ns, filter, update, options))
                    .await?;
                Ok(self.update_envelope(&outcome))
            }
            Request::UpdateMany {
                filter,
                update,
                options,
            } => {
                let outcome = self
                    .call(kind, ns, store.update_many(ns, filter, update, options))
                    .await?;
                Ok(self.update_envelope(&outcome))
            }
            Request::DeleteOne { filter } => {
                let deleted = self.call(kind, ns, store.delete_one(ns, filter)).await?;
                Ok(json!({ "deletedCount": deleted }))
            }
            Request::DeleteMany { filter } => {
                let deleted = self.call(kind, ns, store.delete_many(ns, filter)).await?;
                Ok(json!({ "deletedCount": deleted }))
            }
            Request::Aggregate { pipeline } => {
                let documents = self.call(kind, ns, store.aggregate(ns, pipeline)).await?;
                Ok(json!({ "documents": self.encode_all(&documents) }))
            }
        }
    }

    /// Await a store call under the timeout, recording latency and failures
    async fn call<T>(
        &self,
        kind: OperationKind,
        ns: &Namespace,
        fut: impl Future<Output = StoreResult<T>>,
    ) -> ApiResult<T> {
        let start = Instant::now();
        let result = match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result.map_err(ApiError::from),
            Err(_) => Err(ApiError::Timeout(self.timeout.as_millis() as u64)),
        };
        metrics::record_store_operation(kind.as_str(), ns, start.elapsed());

        if let Err(err) = &result {
            metrics::record_store_error(kind.as_str(), ns);
            error!(operation = %kind, namespace = %ns, error = %err, "store operation failed");
        }
        result
    }

    fn encode_all(&self, documents: &[Document]) -> Vec<JsonValue> {
        documents
            .iter()
            .map(|doc| JsonValue::Object(encode_document(doc, self.float_mode)))
            .collect()
    }

    fn update_envelope(&self, outcome: &UpdateOutcome) -> JsonValue {
        let mut body = json!({
            "matchedCount": outcome.matched,
            "modifiedCount": outcome.modified,
            "upsertedCount": u64::from(outcome.upserted_id.is_some()),
        });
        if let (Some(id), Some(map)) = (&outcome.upserted_id, body.as_object_mut()) {
            map.insert("upsertedId".to_string(), encode(id, self.float_mode));
        }
        body
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{FindOptions, InMemoryStore, StoreError, StoreResult, Update, UpdateOptions};
    use crate::codec::ExtendedValue;
    use async_trait::async_trait;

    fn dispatcher() -> Dispatcher {
        Dispatcher::new(Arc::new(InMemoryStore::new()))
    }

    async fn run(d: &Dispatcher, kind: OperationKind, body: JsonValue) -> ApiResult<JsonValue> {
        d.dispatch(kind, body).await
    }

    #[tokio::test]
    async fn test_insert_then_find_one() {
        let d = dispatcher();
        let inserted = run(
            &d,
            OperationKind::InsertOne,
            json!({"database": "db", "collection": "c",
                   "document": {"_id": {"$oid": "507f1f77bcf86cd799439011"}, "n": 1.5}}),
        )
        .await
        .unwrap();
        assert_eq!(
            inserted,
            json!({"insertedId": {"$oid": "507f1f77bcf86cd799439011"}})
        );

        let found = run(
            &d,
            OperationKind::FindOne,
            json!({"database": "db", "collection": "c",
                   "filter": {"_id": {"$oid": "507f1f77bcf86cd799439011"}}}),
        )
        .await
        .unwrap();
        assert_eq!(
            found,
            json!({"document": {"_id": {"$oid": "507f1f77bcf86cd799439011"},
                                "n": {"$numberDouble": "1.5"}}})
        );
    }

    #[tokio::test]
    async fn test_relaxed_float_mode() {
        let d = dispatcher().with_float_mode(FloatMode::Relaxed);
        run(
            &d,
            OperationKind::InsertOne,
            json!({"database": "db", "collection": "c", "document": {"_id": 1, "n": 1.5}}),
        )
        .await
        .unwrap();
        let found = run(
            &d,
            OperationKind::Find,
            json!({"database": "db", "collection": "c"}),
        )
        .await
        .unwrap();
        assert_eq!(found, json!({"documents": [{"_id": 1, "n": 1.5}]}));
    }

    #[tokio::test]
    async fn test_find_one_not_found() {
        let err = run(
            &dispatcher(),
            OperationKind::FindOne,
            json!({"database": "db", "collection": "empty"}),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ApiError::NotFound));
        assert_eq!(err.client_message(), "No document found");
    }

    #[tokio::test]
    async fn test_update_envelope() {
        let d = dispatcher();
        let body = run(
            &d,
            OperationKind::UpdateOne,
            json!({"database": "db", "collection": "c",
                   "filter": {"_id": 7}, "update": {"$set": {"a": 1}}, "upsert": true}),
        )
        .await
        .unwrap();
        assert_eq!(
            body,
            json!({"matchedCount": 0, "modifiedCount": 0, "upsertedCount": 1, "upsertedId": 7})
        );

        let body = run(
            &d,
            OperationKind::UpdateMany,
            json!({"database": "db", "collection": "c",
                   "filter": {}, "update": {"$set": {"a": 2}}}),
        )
        .await
        .unwrap();
        assert_eq!(
            body,
            json!({"matchedCount": 1, "modifiedCount": 1, "upsertedCount": 0})
        );
    }

    #[tokio::test]
    async fn test_store_errors_become_server_errors() {
        let err = run(
            &dispatcher(),
            OperationKind::Find,
            json!({"database": "db", "collection": "c", "filter": {"a": {"$bogus": 1}}}),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ApiError::Store(StoreError::InvalidQuery(_))));
        assert_eq!(err.status_code().as_u16(), 500);
    }

    struct SlowStore;

    #[async_trait]
    impl DocumentStore for SlowStore {
        async fn ping(&self) -> StoreResult<()> {
            Ok(())
        }
        async fn insert_one(&self, _: &Namespace, _: Document) -> StoreResult<ExtendedValue> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(ExtendedValue::Null)
        }
        async fn insert_many(&self, _: &Namespace, _: Vec<Document>) -> StoreResult<Vec<ExtendedValue>> {
            Ok(Vec::new())
        }
        async fn find_one(&self, _: &Namespace, _: Document, _: FindOptions) -> StoreResult<Option<Document>> {
            Ok(None)
        }
        async fn find(&self, _: &Namespace, _: Document, _: FindOptions) -> StoreResult<Vec<Document>> {
            Ok(Vec::new())
        }
        async fn update_one(
            &self,
            _: &Namespace,
            _: Document,
            _: Update,
            _: UpdateOptions,
        ) -> StoreResult<UpdateOutcome> {
            Ok(UpdateOutcome::default())
        }
        async fn update_many(
            &self,
            _: &Namespace,
            _: Document,
            _: Update,
            _: UpdateOptions,
        ) -> StoreResult<UpdateOutcome> {
            Ok(UpdateOutcome::default())
        }
        async fn delete_one(&self, _: &Namespace, _: Document) -> StoreResult<u64> {
            Ok(0)
        }
        async fn delete_many(&self, _: &Namespace, _: Document) -> StoreResult<u64> {
            Ok(0)
        }
        async fn aggregate(&self, _: &Namespace, _: Vec<Document>) -> StoreResult<Vec<Document>> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn test_timeout() {
        let d = Dispatcher::new(Arc::new(SlowStore)).with_timeout(Duration::from_millis(20));
        let err = run(
            &d,
            OperationKind::InsertOne,
            json!({"database": "db", "collection": "c", "document": {}}),
        )
        .await
        .unwrap_err();
        assert_eq!(err.client_message(), "operation timed out after 20ms");
        assert_eq!(err.status_code().as_u16(), 500);
    }
}
