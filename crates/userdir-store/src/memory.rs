//! In-memory document store for tests and embedding.
//!
//! [`InMemoryDocumentStore`] keeps every collection in a `BTreeMap` behind a
//! single `RwLock`. Each trait call takes the lock once and drops it before
//! returning, which makes every call atomic with respect to every other.
//!
//! The store can be switched offline and can fail individual operations on
//! demand, so callers can exercise connectivity and partial-failure paths.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde_json::Value;
use userdir_types::EntityId;

use crate::document::{Document, DocumentStore, UpdateOutcome};
use crate::error::{StoreError, StoreResult};

/// Kind of backend operation, used to target injected faults.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Operation {
    Read,
    Insert,
    Update,
    Remove,
}

#[derive(Clone, Debug)]
struct Fault {
    operation: Operation,
    collection: String,
}

#[derive(Debug, Default)]
struct Collection {
    documents: BTreeMap<EntityId, Document>,
    unique_fields: BTreeSet<String>,
}

impl Collection {
    /// Fail if `document` (stored under `id`) collides on any unique field.
    fn check_unique(&self, name: &str, id: &EntityId, document: &Document) -> StoreResult<()> {
        for field in &self.unique_fields {
            let Some(value) = document.get(field) else {
                continue;
            };
            let collides = self
                .documents
                .iter()
                .any(|(other_id, other)| other_id != id && other.get(field) == Some(value));
            if collides {
                return Err(StoreError::DuplicateKey {
                    collection: name.to_string(),
                    field: field.clone(),
                    value: display_value(value),
                });
            }
        }
        Ok(())
    }
}

fn display_value(value: &Value) -> String {
    value
        .as_str()
        .map(str::to_string)
        .unwrap_or_else(|| value.to_string())
}

/// An in-memory implementation of [`DocumentStore`].
///
/// Data is lost when the store is dropped.
pub struct InMemoryDocumentStore {
    collections: RwLock<HashMap<String, Collection>>,
    available: AtomicBool,
    faults: Mutex<Vec<Fault>>,
}

impl InMemoryDocumentStore {
    /// Create a new empty, reachable store.
    pub fn new() -> Self {
        Self {
            collections: RwLock::new(HashMap::new()),
            available: AtomicBool::new(true),
            faults: Mutex::new(Vec::new()),
        }
    }

    /// Mark the store reachable or unreachable. While unreachable every
    /// call fails with [`StoreError::Connectivity`].
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    pub fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    /// Fail the next `operation` on `collection` with a connectivity error.
    ///
    /// Faults are one-shot and fire in the order they were injected.
    pub fn inject_fault(&self, operation: Operation, collection: &str) {
        if let Ok(mut faults) = self.faults.lock() {
            faults.push(Fault {
                operation,
                collection: collection.to_string(),
            });
        }
    }

    /// Number of documents in `collection`.
    pub fn count(&self, collection: &str) -> usize {
        self.collections
            .read()
            .map(|c| c.get(collection).map_or(0, |c| c.documents.len()))
            .unwrap_or(0)
    }

    fn check_available(&self) -> StoreResult<()> {
        if self.is_available() {
            Ok(())
        } else {
            Err(StoreError::Connectivity("in-memory store is offline".into()))
        }
    }

    fn check(&self, operation: Operation, collection: &str) -> StoreResult<()> {
        self.check_available()?;
        let mut faults = self
            .faults
            .lock()
            .map_err(|e| StoreError::Backend(format!("fault list poisoned: {e}")))?;
        if let Some(pos) = faults
            .iter()
            .position(|f| f.operation == operation && f.collection == collection)
        {
            faults.remove(pos);
            return Err(StoreError::Connectivity(format!(
                "injected {operation:?} fault on {collection}"
            )));
        }
        Ok(())
    }

    fn read_lock(&self) -> StoreResult<RwLockReadGuard<'_, HashMap<String, Collection>>> {
        self.collections
            .read()
            .map_err(|e| StoreError::Backend(format!("lock poisoned: {e}")))
    }

    fn write_lock(&self) -> StoreResult<RwLockWriteGuard<'_, HashMap<String, Collection>>> {
        self.collections
            .write()
            .map_err(|e| StoreError::Backend(format!("lock poisoned: {e}")))
    }

    fn update_array(
        &self,
        collection: &str,
        id: &EntityId,
        field: &str,
        create_missing: bool,
        mutate: impl FnOnce(&mut Vec<Value>) -> bool,
    ) -> StoreResult<UpdateOutcome> {
        self.check(Operation::Update, collection)?;
        let mut collections = self.write_lock()?;
        let Some(document) = collections
            .get_mut(collection)
            .and_then(|c| c.documents.get_mut(id))
        else {
            return Ok(UpdateOutcome::NotMatched);
        };

        if !document.contains_key(field) {
            if !create_missing {
                return Ok(UpdateOutcome::Unchanged);
            }
            document.insert(field.to_string(), Value::Array(Vec::new()));
        }
        let Some(Value::Array(items)) = document.get_mut(field) else {
            return Err(StoreError::Serialization(format!(
                "field {field} of {collection}/{id} is not an array"
            )));
        };
        Ok(if mutate(items) {
            UpdateOutcome::Modified
        } else {
            UpdateOutcome::Unchanged
        })
    }
}

impl Default for InMemoryDocumentStore {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentStore for InMemoryDocumentStore {
    fn ping(&self) -> StoreResult<()> {
        self.check_available()
    }

    fn ensure_unique_index(&self, collection: &str, field: &str) -> StoreResult<()> {
        self.check(Operation::Update, collection)?;
        let mut collections = self.write_lock()?;
        let coll = collections.entry(collection.to_string()).or_default();
        if coll.unique_fields.contains(field) {
            return Ok(());
        }

        let mut seen = HashSet::new();
        for document in coll.documents.values() {
            if let Some(value) = document.get(field) {
                if !seen.insert(value.to_string()) {
                    return Err(StoreError::DuplicateKey {
                        collection: collection.to_string(),
                        field: field.to_string(),
                        value: display_value(value),
                    });
                }
            }
        }
        coll.unique_fields.insert(field.to_string());
        Ok(())
    }

    fn insert(&self, collection: &str, id: EntityId, document: Document) -> StoreResult<()> {
        self.check(Operation::Insert, collection)?;
        let mut collections = self.write_lock()?;
        let coll = collections.entry(collection.to_string()).or_default();
        if coll.documents.contains_key(&id) {
            return Err(StoreError::DuplicateKey {
                collection: collection.to_string(),
                field: "id".into(),
                value: id.to_hex(),
            });
        }
        coll.check_unique(collection, &id, &document)?;
        coll.documents.insert(id, document);
        Ok(())
    }

    fn find_by_id(&self, collection: &str, id: &EntityId) -> StoreResult<Option<Document>> {
        self.check(Operation::Read, collection)?;
        let collections = self.read_lock()?;
        Ok(collections
            .get(collection)
            .and_then(|c| c.documents.get(id))
            .cloned())
    }

    fn find_one(
        &self,
        collection: &str,
        field: &str,
        value: &Value,
    ) -> StoreResult<Option<Document>> {
        self.check(Operation::Read, collection)?;
        let collections = self.read_lock()?;
        Ok(collections.get(collection).and_then(|c| {
            c.documents
                .values()
                .find(|d| d.get(field) == Some(value))
                .cloned()
        }))
    }

    fn find_many(&self, collection: &str, ids: &[EntityId]) -> StoreResult<Vec<Document>> {
        self.check(Operation::Read, collection)?;
        let collections = self.read_lock()?;
        let Some(coll) = collections.get(collection) else {
            return Ok(Vec::new());
        };
        let wanted: BTreeSet<&EntityId> = ids.iter().collect();
        Ok(wanted
            .into_iter()
            .filter_map(|id| coll.documents.get(id).cloned())
            .collect())
    }

    fn find_all(&self, collection: &str) -> StoreResult<Vec<Document>> {
        self.check(Operation::Read, collection)?;
        let collections = self.read_lock()?;
        Ok(collections
            .get(collection)
            .map(|c| c.documents.values().cloned().collect())
            .unwrap_or_default())
    }

    fn set_fields(
        &self,
        collection: &str,
        id: &EntityId,
        fields: Document,
    ) -> StoreResult<UpdateOutcome> {
        self.check(Operation::Update, collection)?;
        let mut collections = self.write_lock()?;
        let Some(coll) = collections.get_mut(collection) else {
            return Ok(UpdateOutcome::NotMatched);
        };
        let Some(current) = coll.documents.get(id) else {
            return Ok(UpdateOutcome::NotMatched);
        };

        let mut updated = current.clone();
        updated.extend(fields);
        if &updated == current {
            return Ok(UpdateOutcome::Unchanged);
        }
        coll.check_unique(collection, id, &updated)?;
        coll.documents.insert(*id, updated);
        Ok(UpdateOutcome::Modified)
    }

    fn add_to_set(
        &self,
        collection: &str,
        id: &EntityId,
        field: &str,
        value: Value,
    ) -> StoreResult<UpdateOutcome> {
        self.update_array(collection, id, field, true, |items| {
            if items.contains(&value) {
                false
            } else {
                items.push(value);
                true
            }
        })
    }

    fn pull(
        &self,
        collection: &str,
        id: &EntityId,
        field: &str,
        value: &Value,
    ) -> StoreResult<UpdateOutcome> {
        self.update_array(collection, id, field, false, |items| {
            let before = items.len();
            items.retain(|item| item != value);
            items.len() != before
        })
    }

    fn remove(&self, collection: &str, id: &EntityId) -> StoreResult<bool> {
        self.check(Operation::Remove, collection)?;
        let mut collections = self.write_lock()?;
        Ok(collections
            .get_mut(collection)
            .is_some_and(|c| c.documents.remove(id).is_some()))
    }

    fn remove_many(&self, collection: &str, ids: &[EntityId]) -> StoreResult<u64> {
        self.check(Operation::Remove, collection)?;
        let mut collections = self.write_lock()?;
        let Some(coll) = collections.get_mut(collection) else {
            return Ok(0);
        };
        let mut removed = 0;
        for id in ids {
            if coll.documents.remove(id).is_some() {
                removed += 1;
            }
        }
        Ok(removed)
    }
}

impl std::fmt::Debug for InMemoryDocumentStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let collections = self
            .collections
            .read()
            .map(|c| c.len())
            .unwrap_or_default();
        f.debug_struct("InMemoryDocumentStore")
            .field("collections", &collections)
            .field("available", &self.is_available())
            .finish()
    }
}
