//! The user → address link list.
//!
//! Ownership of an address is expressed only by its id appearing in the
//! owning user's `addressIds` array. [`LinkManager`] is the single place that
//! mutates that array, and each mutation is one atomic single-document
//! update on the user. Link writes are never coordinated with the paired
//! address write; callers order the two so that a failure between them
//! leaves an orphaned address rather than a dangling link.

use std::sync::Arc;

use tracing::debug;
use userdir_types::EntityId;

use crate::document::DocumentStore;
use crate::error::{StoreError, StoreResult};
use crate::records::{id_value, ADDRESS_IDS};

#[derive(Clone)]
pub struct LinkManager {
    store: Arc<dyn DocumentStore>,
    users: String,
}

impl LinkManager {
    pub fn new(store: Arc<dyn DocumentStore>, users_collection: impl Into<String>) -> Self {
        Self {
            store,
            users: users_collection.into(),
        }
    }

    /// Add `address` to `user`'s link list if absent.
    ///
    /// Returns `true` if the link was added, `false` if it was already
    /// present. Fails with `NotFound` if the user does not exist.
    pub fn add_link(&self, user: &EntityId, address: &EntityId) -> StoreResult<bool> {
        let outcome = self
            .store
            .add_to_set(&self.users, user, ADDRESS_IDS, id_value(address))?;
        if !outcome.matched() {
            return Err(StoreError::not_found(&self.users, user));
        }
        debug!(user_id = %user, address_id = %address, added = outcome.modified(), "link added");
        Ok(outcome.modified())
    }

    /// Remove `address` from `user`'s link list if present.
    ///
    /// Returns `true` if the link existed. Fails with `NotFound` if the user
    /// does not exist.
    pub fn remove_link(&self, user: &EntityId, address: &EntityId) -> StoreResult<bool> {
        let outcome = self
            .store
            .pull(&self.users, user, ADDRESS_IDS, &id_value(address))?;
        if !outcome.matched() {
            return Err(StoreError::not_found(&self.users, user));
        }
        debug!(user_id = %user, address_id = %address, removed = outcome.modified(), "link removed");
        Ok(outcome.modified())
    }
}

impl std::fmt::Debug for LinkManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LinkManager")
            .field("users", &self.users)
            .finish_non_exhaustive()
    }
}
