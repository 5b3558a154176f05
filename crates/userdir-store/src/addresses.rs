use std::sync::Arc;

use tracing::debug;
use userdir_types::{Address, AddressDetails, EntityId};

use crate::document::DocumentStore;
use crate::error::{decode_id, StoreError, StoreResult};
use crate::records::{from_document, to_document, AddressRecord};

/// Collection-scoped CRUD over addresses.
///
/// The address store knows nothing about ownership; linking an address to a
/// user is the [`LinkManager`](crate::LinkManager)'s job.
#[derive(Clone)]
pub struct AddressStore {
    store: Arc<dyn DocumentStore>,
    collection: String,
}

impl AddressStore {
    pub fn new(store: Arc<dyn DocumentStore>, collection: impl Into<String>) -> Self {
        Self {
            store,
            collection: collection.into(),
        }
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Persist a new address under a fresh identifier.
    pub fn create(&self, details: AddressDetails) -> StoreResult<Address> {
        let record = AddressRecord {
            id: EntityId::generate(),
            details,
        };
        self.store
            .insert(&self.collection, record.id, to_document(&record)?)?;
        debug!(address_id = %record.id, "address created");
        Ok(record.into_address())
    }

    /// Fetch an address by its external identifier.
    pub fn get_by_id(&self, id: &str) -> StoreResult<Address> {
        self.get(&decode_id(id)?)
    }

    pub fn get(&self, id: &EntityId) -> StoreResult<Address> {
        let document = self
            .store
            .find_by_id(&self.collection, id)?
            .ok_or_else(|| StoreError::not_found(&self.collection, id))?;
        Ok(from_document::<AddressRecord>(document)?.into_address())
    }

    /// Batch lookup. Ids with no matching address are skipped.
    pub fn find_many(&self, ids: &[EntityId]) -> StoreResult<Vec<Address>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        self.store
            .find_many(&self.collection, ids)?
            .into_iter()
            .map(|d| from_document::<AddressRecord>(d).map(AddressRecord::into_address))
            .collect()
    }

    /// Snapshot of every stored address.
    pub fn list(&self) -> StoreResult<Vec<Address>> {
        self.store
            .find_all(&self.collection)?
            .into_iter()
            .map(|d| from_document::<AddressRecord>(d).map(AddressRecord::into_address))
            .collect()
    }

    /// Delete an address by its external identifier.
    ///
    /// Does not touch any user's link list. Callers holding an owning user
    /// id go through the directory service, which unlinks first.
    pub fn delete(&self, id: &str) -> StoreResult<()> {
        self.delete_id(&decode_id(id)?)
    }

    pub fn delete_id(&self, id: &EntityId) -> StoreResult<()> {
        if self.store.remove(&self.collection, id)? {
            debug!(address_id = %id, "address deleted");
            Ok(())
        } else {
            Err(StoreError::not_found(&self.collection, id))
        }
    }

    /// Delete every address in `ids`. Returns how many existed.
    pub fn delete_many(&self, ids: &[EntityId]) -> StoreResult<u64> {
        if ids.is_empty() {
            return Ok(0);
        }
        self.store.remove_many(&self.collection, ids)
    }
}

impl std::fmt::Debug for AddressStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AddressStore")
            .field("collection", &self.collection)
            .finish_non_exhaustive()
    }
}
