//! The [`DocumentStore`] trait defining the storage backend interface.
//!
//! A backend holds named collections of JSON documents keyed by
//! [`EntityId`]. Every method is a single-document (or single batch)
//! operation that is atomic on its own; nothing spans two calls.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use userdir_types::EntityId;

use crate::error::StoreResult;

/// A stored document: a JSON object.
pub type Document = Map<String, Value>;

/// Outcome of a single-document update.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// No document has the given id.
    NotMatched,
    /// The document exists but the update changed nothing.
    Unchanged,
    /// The document was changed.
    Modified,
}

impl UpdateOutcome {
    pub fn matched(self) -> bool {
        !matches!(self, Self::NotMatched)
    }

    pub fn modified(self) -> bool {
        matches!(self, Self::Modified)
    }
}

/// Names of the two collections backing the directory.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Collections {
    pub users: String,
    pub addresses: String,
}

impl Default for Collections {
    fn default() -> Self {
        Self {
            users: "users".into(),
            addresses: "addresses".into(),
        }
    }
}

/// Storage backend for directory documents.
///
/// Implementations must be thread-safe (`Send + Sync`). Each call acquires
/// whatever backend resource it needs (lock, pooled session) for the
/// duration of that call only and releases it on every exit path.
///
/// Unique indexes registered with [`ensure_unique_index`] are enforced by
/// [`insert`] and [`set_fields`]; a violation fails with
/// [`StoreError::DuplicateKey`](crate::StoreError::DuplicateKey) and leaves
/// the collection untouched.
///
/// [`ensure_unique_index`]: DocumentStore::ensure_unique_index
/// [`insert`]: DocumentStore::insert
/// [`set_fields`]: DocumentStore::set_fields
pub trait DocumentStore: Send + Sync {
    /// Check that the backend is reachable.
    fn ping(&self) -> StoreResult<()>;

    /// Ensure a unique index on `field` exists in `collection`.
    ///
    /// Idempotent. Fails if existing documents already violate it.
    fn ensure_unique_index(&self, collection: &str, field: &str) -> StoreResult<()>;

    /// Insert a new document under `id`.
    ///
    /// Fails with `DuplicateKey` if `id` is taken or a unique field collides.
    fn insert(&self, collection: &str, id: EntityId, document: Document) -> StoreResult<()>;

    /// Read a document by id. Returns `Ok(None)` if absent.
    fn find_by_id(&self, collection: &str, id: &EntityId) -> StoreResult<Option<Document>>;

    /// Read the first document whose `field` equals `value`.
    fn find_one(&self, collection: &str, field: &str, value: &Value)
        -> StoreResult<Option<Document>>;

    /// Read every document whose id is in `ids`.
    ///
    /// Missing ids are skipped, so the result may be shorter than `ids`.
    /// No ordering is guaranteed.
    fn find_many(&self, collection: &str, ids: &[EntityId]) -> StoreResult<Vec<Document>>;

    /// Snapshot of every document in `collection`.
    fn find_all(&self, collection: &str) -> StoreResult<Vec<Document>>;

    /// Overwrite the given top-level fields of one document.
    fn set_fields(&self, collection: &str, id: &EntityId, fields: Document)
        -> StoreResult<UpdateOutcome>;

    /// Append `value` to the array at `field` unless already present.
    ///
    /// A missing field is treated as an empty array.
    fn add_to_set(
        &self,
        collection: &str,
        id: &EntityId,
        field: &str,
        value: Value,
    ) -> StoreResult<UpdateOutcome>;

    /// Remove every occurrence of `value` from the array at `field`.
    fn pull(
        &self,
        collection: &str,
        id: &EntityId,
        field: &str,
        value: &Value,
    ) -> StoreResult<UpdateOutcome>;

    /// Delete a document. Returns `true` if it existed.
    fn remove(&self, collection: &str, id: &EntityId) -> StoreResult<bool>;

    /// Delete every document whose id is in `ids`. Returns how many existed.
    ///
    /// Default implementation calls `remove()` for each id.
    fn remove_many(&self, collection: &str, ids: &[EntityId]) -> StoreResult<u64> {
        let mut removed = 0;
        for id in ids {
            if self.remove(collection, id)? {
                removed += 1;
            }
        }
        Ok(removed)
    }
}
