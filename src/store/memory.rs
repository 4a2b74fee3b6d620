//! # In-Memory Store
//!
//! A [`DocumentStore`] over process memory. Each namespace holds its
//! documents in insertion order; missing databases and collections read as
//! empty.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use tracing::debug;

use crate::codec::{Document, ExtendedValue, ObjectId};

use super::compare::values_equal;
use super::errors::{StoreError, StoreResult};
use super::filter::{equality_fields, matches};
use super::pipeline::{project, run_pipeline, sort_documents};
use super::update::{apply_update, check_field_names, validate_update};
use super::{DocumentStore, FindOptions, Namespace, Update, UpdateOptions, UpdateOutcome};

const ID: &str = "_id";

type Collections = HashMap<Namespace, Vec<Document>>;

/// In-memory document store
#[derive(Debug, Default)]
pub struct InMemoryStore {
    data: RwLock<Collections>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> StoreResult<RwLockReadGuard<'_, Collections>> {
        self.data
            .read()
            .map_err(|_| StoreError::Internal("Lock poisoned".to_string()))
    }

    fn write(&self) -> StoreResult<RwLockWriteGuard<'_, Collections>> {
        self.data
            .write()
            .map_err(|_| StoreError::Internal("Lock poisoned".to_string()))
    }

    /// Move `_id` to the front, generating one if absent, and return it
    fn prepare(document: &mut Document) -> ExtendedValue {
        let id = document
            .remove(ID)
            .unwrap_or_else(|| ExtendedValue::ObjectId(ObjectId::new()));
        document.insert_first(ID, id.clone());
        id
    }

    fn check_unique(existing: &[Document], id: &ExtendedValue, ns: &Namespace) -> StoreResult<()> {
        if existing
            .iter()
            .any(|doc| doc.get(ID).is_some_and(|other| values_equal(other, id)))
        {
            return Err(StoreError::DuplicateKey(format!(
                "collection {} already has _id {:?}",
                ns, id
            )));
        }
        Ok(())
    }

    fn select(docs: &[Document], filter: &Document) -> StoreResult<Vec<usize>> {
        let mut selected = Vec::new();
        for (index, doc) in docs.iter().enumerate() {
            if matches(doc, filter)? {
                selected.push(index);
            }
        }
        Ok(selected)
    }

    fn query(&self, ns: &Namespace, filter: &Document, options: &FindOptions) -> StoreResult<Vec<Document>> {
        let data = self.read()?;
        let docs = data.get(ns).map(Vec::as_slice).unwrap_or_default();

        let mut found: Vec<Document> = Self::select(docs, filter)?
            .into_iter()
            .map(|index| docs[index].clone())
            .collect();
        drop(data);

        if let Some(sort) = &options.sort {
            sort_documents(&mut found, sort)?;
        }
        let skip = options.skip.unwrap_or(0) as usize;
        let found = match options.limit {
            Some(limit) if limit > 0 => found.into_iter().skip(skip).take(limit as usize).collect(),
            _ => found.into_iter().skip(skip).collect(),
        };
        match &options.projection {
            Some(spec) => project(found, spec),
            None => Ok(found),
        }
    }

    fn update(
        &self,
        ns: &Namespace,
        filter: &Document,
        update: &Update,
        options: UpdateOptions,
        multi: bool,
    ) -> StoreResult<UpdateOutcome> {
        let update = match update {
            Update::Document(doc) => doc,
            Update::Pipeline(_) => {
                return Err(StoreError::InvalidQuery(
                    "update pipelines are not supported by the in-memory store".to_string(),
                ))
            }
        };
        validate_update(update)?;

        let mut data = self.write()?;
        let docs = data.entry(ns.clone()).or_default();

        let mut selected = Self::select(docs, filter)?;
        if !multi {
            selected.truncate(1);
        }

        let mut outcome = UpdateOutcome {
            matched: selected.len() as u64,
            ..UpdateOutcome::default()
        };

        // apply to copies first so a failing operator leaves the collection untouched
        let mut changes = Vec::with_capacity(selected.len());
        for index in selected {
            let mut candidate = docs[index].clone();
            if apply_update(&mut candidate, update)? {
                changes.push((index, candidate));
            }
        }
        outcome.modified = changes.len() as u64;
        for (index, candidate) in changes {
            docs[index] = candidate;
        }

        if outcome.matched == 0 && options.upsert {
            let mut seeded = equality_fields(filter);
            apply_update(&mut seeded, update)?;
            check_field_names(&seeded)?;
            let id = Self::prepare(&mut seeded);
            Self::check_unique(docs, &id, ns)?;
            debug!(namespace = %ns, "upserted document");
            docs.push(seeded);
            outcome.upserted_id = Some(id);
        }

        Ok(outcome)
    }

    fn delete(&self, ns: &Namespace, filter: &Document, multi: bool) -> StoreResult<u64> {
        let mut data = self.write()?;
        let Some(docs) = data.get_mut(ns) else {
            return Ok(0);
        };

        let mut selected = Self::select(docs, filter)?;
        if !multi {
            selected.truncate(1);
        }
        for index in selected.iter().rev() {
            docs.remove(*index);
        }
        Ok(selected.len() as u64)
    }
}

#[async_trait]
impl DocumentStore for InMemoryStore {
    async fn ping(&self) -> StoreResult<()> {
        self.read().map(|_| ())
    }

    async fn insert_one(&self, ns: &Namespace, mut document: Document) -> StoreResult<ExtendedValue> {
        check_field_names(&document)?;
        let id = Self::prepare(&mut document);

        let mut data = self.write()?;
        let docs = data.entry(ns.clone()).or_default();
        Self::check_unique(docs, &id, ns)?;
        docs.push(document);
        Ok(id)
    }

    async fn insert_many(
        &self,
        ns: &Namespace,
        mut documents: Vec<Document>,
    ) -> StoreResult<Vec<ExtendedValue>> {
        documents.iter().try_for_each(check_field_names)?;
        let ids: Vec<ExtendedValue> = documents.iter_mut().map(Self::prepare).collect();

        let mut data = self.write()?;
        let docs = data.entry(ns.clone()).or_default();
        for (position, id) in ids.iter().enumerate() {
            Self::check_unique(docs, id, ns)?;
            Self::check_unique(&documents[..position], id, ns)?;
        }
        docs.extend(documents);
        Ok(ids)
    }

    async fn find_one(
        &self,
        ns: &Namespace,
        filter: Document,
        options: FindOptions,
    ) -> StoreResult<Option<Document>> {
        let options = FindOptions {
            limit: Some(1),
            skip: None,
            ..options
        };
        Ok(self.query(ns, &filter, &options)?.into_iter().next())
    }

    async fn find(
        &self,
        ns: &Namespace,
        filter: Document,
        options: FindOptions,
    ) -> StoreResult<Vec<Document>> {
        self.query(ns, &filter, &options)
    }

    async fn update_one(
        &self,
        ns: &Namespace,
        filter: Document,
        update: Update,
        options: UpdateOptions,
    ) -> StoreResult<UpdateOutcome> {
        self.update(ns, &filter, &update, options, false)
    }

    async fn update_many(
        &self,
        ns: &Namespace,
        filter: Document,
        update: Update,
        options: UpdateOptions,
    ) -> StoreResult<UpdateOutcome> {
        self.update(ns, &filter, &update, options, true)
    }

    async fn delete_one(&self, ns: &Namespace, filter: Document) -> StoreResult<u64> {
        self.delete(ns, &filter, false)
    }

    async fn delete_many(&self, ns: &Namespace, filter: Document) -> StoreResult<u64> {
        self.delete(ns, &filter, true)
    }

    async fn aggregate(&self, ns: &Namespace, pipeline: Vec<Document>) -> StoreResult<Vec<Document>> {
        let snapshot = self.read()?.get(ns).cloned().unwrap_or_default();
        run_pipeline(snapshot, &pipeline)
    }
}
