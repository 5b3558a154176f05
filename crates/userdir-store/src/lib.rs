//! Document-store persistence for userdir.
//!
//! Users and addresses live in two collections of JSON documents. A user
//! owns an address only by listing its id in `addressIds`; nothing on the
//! address points back.
//!
//! # Components
//!
//! - [`DocumentStore`] -- backend trait; [`InMemoryDocumentStore`] for tests
//!   and embedding
//! - [`UserStore`] / [`AddressStore`] -- collection-scoped CRUD
//! - [`LinkManager`] -- the only writer of a user's link list
//! - [`Population`] -- resolves a link list into address records
//! - [`OrphanSweeper`] -- removes addresses no user links to
//! - [`connect`] -- startup ping loop under a [`RetryPolicy`]
//! - [`ensure_indexes`] -- the username unique index
//!
//! # Rules
//!
//! 1. String identifiers are decoded before any backend call.
//! 2. Each backend call is atomic on its own; no call spans two documents.
//! 3. Address writes precede link writes, so a partial failure leaves an
//!    orphaned address and never a dangling link.
//! 4. Errors are propagated unchanged; only population treats a missing
//!    document as non-fatal.

pub mod addresses;
pub mod connect;
pub mod document;
pub mod error;
pub mod links;
pub mod memory;
pub mod population;
mod records;
pub mod reconcile;
pub mod users;

use std::sync::Arc;

pub use addresses::AddressStore;
pub use connect::{connect, ensure_indexes, RetryPolicy};
pub use document::{Collections, Document, DocumentStore, UpdateOutcome};
pub use error::{decode_id, StoreError, StoreResult};
pub use links::LinkManager;
pub use memory::{InMemoryDocumentStore, Operation};
pub use population::Population;
pub use reconcile::{OrphanSweeper, SweepHandle, SweepReport};
pub use users::UserStore;

/// Every store component wired over one backend.
#[derive(Clone, Debug)]
pub struct DirectoryStores {
    pub users: UserStore,
    pub addresses: AddressStore,
    pub links: LinkManager,
    pub population: Population,
}

impl DirectoryStores {
    /// Wire the components and [`ensure_indexes`] on `store`.
    pub fn new(store: Arc<dyn DocumentStore>, collections: &Collections) -> StoreResult<Self> {
        ensure_indexes(&*store, collections)?;
        let addresses = AddressStore::new(Arc::clone(&store), collections.addresses.clone());
        Ok(Self {
            users: UserStore::new(
                Arc::clone(&store),
                collections.users.clone(),
                addresses.clone(),
            ),
            links: LinkManager::new(store, collections.users.clone()),
            population: Population::new(addresses.clone()),
            addresses,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use userdir_types::{NewUser, Profile};

    fn new_user(username: &str) -> NewUser {
        NewUser {
            username: username.into(),
            password_hash: String::new(),
            salt: String::new(),
            profile: Profile::default(),
        }
    }

    #[test]
    fn new_enforces_unique_usernames() {
        let backend = Arc::new(InMemoryDocumentStore::new());
        let stores = DirectoryStores::new(backend.clone(), &Collections::default()).unwrap();

        stores.users.create(new_user("dana")).unwrap();
        assert!(matches!(
            stores.users.create(new_user("dana")),
            Err(StoreError::DuplicateKey { .. })
        ));
        assert_eq!(backend.count("users"), 1);
    }

    #[test]
    fn new_fails_over_duplicate_data() {
        let backend = Arc::new(InMemoryDocumentStore::new());
        let collections = Collections::default();
        {
            let bare = UserStore::new(
                backend.clone(),
                collections.users.clone(),
                AddressStore::new(backend.clone(), collections.addresses.clone()),
            );
            bare.create(new_user("erin")).unwrap();
            bare.create(new_user("erin")).unwrap();
        }
        assert!(matches!(
            DirectoryStores::new(backend, &collections),
            Err(StoreError::DuplicateKey { .. })
        ));
    }
}
