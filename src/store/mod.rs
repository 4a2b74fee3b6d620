//! # Document Store
//!
//! The backing-store seam the dispatcher forwards every operation to.
//!
//! - [`DocumentStore`] has one async method per operation verb plus `ping`
//! - [`InMemoryStore`] keeps collections in process memory
//! - `MongoStore` talks to a MongoDB deployment (`mongodb-backend` feature)

use std::fmt;

use async_trait::async_trait;

use crate::codec::{Document, ExtendedValue};

pub mod compare;
pub mod errors;
pub mod filter;
pub mod memory;
#[cfg(feature = "mongodb-backend")]
pub mod mongo;
pub mod pipeline;
pub mod update;

pub use errors::{StoreError, StoreResult};
pub use memory::InMemoryStore;
#[cfg(feature = "mongodb-backend")]
pub use mongo::MongoStore;

/// A `(database, collection)` pair
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Namespace {
    pub database: String,
    pub collection: String,
}

impl Namespace {
    pub fn new(database: impl Into<String>, collection: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            collection: collection.into(),
        }
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.database, self.collection)
    }
}

/// Options for `find` and `find_one`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindOptions {
    pub projection: Option<Document>,
    pub sort: Option<Document>,
    /// `None` or `Some(0)` means unlimited
    pub limit: Option<u64>,
    pub skip: Option<u64>,
}

/// Options for `update_one` and `update_many`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateOptions {
    pub upsert: bool,
}

/// The modification half of an update request
#[derive(Debug, Clone, PartialEq)]
pub enum Update {
    /// Operator document such as `{"$set": {...}}`
    Document(Document),
    /// Aggregation-style update pipeline
    Pipeline(Vec<Document>),
}

/// Counts reported by an update
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdateOutcome {
    pub matched: u64,
    pub modified: u64,
    pub upserted_id: Option<ExtendedValue>,
}

/// A backing document database
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Check connectivity
    async fn ping(&self) -> StoreResult<()>;

    /// Insert one document and return its `_id`
    async fn insert_one(&self, ns: &Namespace, document: Document) -> StoreResult<ExtendedValue>;

    /// Insert documents in order and return their `_id`s
    async fn insert_many(
        &self,
        ns: &Namespace,
        documents: Vec<Document>,
    ) -> StoreResult<Vec<ExtendedValue>>;

    async fn find_one(
        &self,
        ns: &Namespace,
        filter: Document,
        options: FindOptions,
    ) -> StoreResult<Option<Document>>;

    async fn find(
        &self,
        ns: &Namespace,
        filter: Document,
        options: FindOptions,
    ) -> StoreResult<Vec<Document>>;

    async fn update_one(
        &self,
        ns: &Namespace,
        filter: Document,
        update: Update,
        options: UpdateOptions,
    ) -> StoreResult<UpdateOutcome>;

    async fn update_many(
        &self,
        ns: &Namespace,
        filter: Document,
        update: Update,
        options: UpdateOptions,
    ) -> StoreResult<UpdateOutcome>;

    /// Delete the first match; returns the number deleted
    async fn delete_one(&self, ns: &Namespace, filter: Document) -> StoreResult<u64>;

    async fn delete_many(&self, ns: &Namespace, filter: Document) -> StoreResult<u64>;

    async fn aggregate(&self, ns: &Namespace, pipeline: Vec<Document>) -> StoreResult<Vec<Document>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_namespace_display() {
        assert_eq!(Namespace::new("shop", "orders").to_string(), "shop.orders");
    }
}
