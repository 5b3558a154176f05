use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info};
use userdir_types::{EntityId, NewUser, Profile, User};

use crate::addresses::AddressStore;
use crate::document::DocumentStore;
use crate::error::{decode_id, StoreError, StoreResult};
use crate::records::{from_document, to_document, UserRecord, USERNAME};

/// Collection-scoped CRUD over users.
///
/// Username uniqueness is enforced by the backend's unique index (see
/// [`connect`](crate::connect)), not by a read-then-write check here.
#[derive(Clone)]
pub struct UserStore {
    store: Arc<dyn DocumentStore>,
    collection: String,
    addresses: AddressStore,
}

impl UserStore {
    /// `addresses` is used only to cascade deletes.
    pub fn new(
        store: Arc<dyn DocumentStore>,
        collection: impl Into<String>,
        addresses: AddressStore,
    ) -> Self {
        Self {
            store,
            collection: collection.into(),
            addresses,
        }
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Persist a new user under a fresh identifier.
    ///
    /// Fails with `DuplicateKey` if the username is taken; nothing is
    /// written in that case.
    pub fn create(&self, user: NewUser) -> StoreResult<User> {
        let record = UserRecord::new(EntityId::generate(), user);
        self.store
            .insert(&self.collection, record.id, to_document(&record)?)?;
        debug!(user_id = %record.id, username = %record.username, "user created");
        Ok(record.into_user())
    }

    /// Fetch a user by its external identifier.
    pub fn get_by_id(&self, id: &str) -> StoreResult<User> {
        self.get(&decode_id(id)?)
    }

    pub fn get(&self, id: &EntityId) -> StoreResult<User> {
        let document = self
            .store
            .find_by_id(&self.collection, id)?
            .ok_or_else(|| StoreError::not_found(&self.collection, id))?;
        Ok(from_document::<UserRecord>(document)?.into_user())
    }

    pub fn get_by_username(&self, username: &str) -> StoreResult<User> {
        let document = self
            .store
            .find_one(&self.collection, USERNAME, &Value::String(username.to_string()))?
            .ok_or_else(|| StoreError::not_found(&self.collection, username))?;
        Ok(from_document::<UserRecord>(document)?.into_user())
    }

    /// Snapshot of every stored user. Address projections are not populated.
    pub fn list(&self) -> StoreResult<Vec<User>> {
        self.store
            .find_all(&self.collection)?
            .into_iter()
            .map(|d| from_document::<UserRecord>(d).map(UserRecord::into_user))
            .collect()
    }

    /// Overwrite the profile fields and optionally the password hash.
    ///
    /// Username, id, salt and link list are never touched.
    pub fn update_profile(
        &self,
        id: &EntityId,
        profile: &Profile,
        password_hash: Option<&str>,
    ) -> StoreResult<User> {
        let mut fields = to_document(profile)?;
        if let Some(hash) = password_hash {
            fields.insert("passwordHash".into(), Value::String(hash.to_string()));
        }
        let outcome = self.store.set_fields(&self.collection, id, fields)?;
        if !outcome.matched() {
            return Err(StoreError::not_found(&self.collection, id));
        }
        debug!(user_id = %id, modified = outcome.modified(), "user profile updated");
        self.get(id)
    }

    /// Delete a user by external identifier, cascading to its addresses.
    ///
    /// Returns the number of addresses removed.
    pub fn delete(&self, id: &str) -> StoreResult<u64> {
        self.delete_id(&decode_id(id)?)
    }

    /// Delete a user and every address in its link list.
    ///
    /// The link list is read once; addresses linked after that snapshot are
    /// not removed and become orphans. Addresses are removed before the user
    /// document.
    pub fn delete_id(&self, id: &EntityId) -> StoreResult<u64> {
        let user = self.get(id)?;
        let removed = self.addresses.delete_many(&user.address_ids)?;
        if !self.store.remove(&self.collection, id)? {
            return Err(StoreError::not_found(&self.collection, id));
        }
        info!(
            user_id = %id,
            linked = user.address_ids.len(),
            addresses_removed = removed,
            "user deleted"
        );
        Ok(removed)
    }
}

impl std::fmt::Debug for UserStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserStore")
            .field("collection", &self.collection)
            .field("addresses", &self.addresses)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::links::LinkManager;
    use crate::memory::{InMemoryDocumentStore, Operation};
    use userdir_types::AddressDetails;

    struct Fixture {
        backend: Arc<InMemoryDocumentStore>,
        users: UserStore,
        addresses: AddressStore,
        links: LinkManager,
    }

    fn setup() -> Fixture {
        let backend = Arc::new(InMemoryDocumentStore::new());
        backend.ensure_unique_index("users", USERNAME).unwrap();
        let addresses = AddressStore::new(backend.clone(), "addresses");
        let users = UserStore::new(backend.clone(), "users", addresses.clone());
        let links = LinkManager::new(backend.clone(), "users");
        Fixture {
            backend,
            users,
            addresses,
            links,
        }
    }

    fn new_user(username: &str) -> NewUser {
        NewUser {
            username: username.into(),
            password_hash: "hash".into(),
            salt: "salt".into(),
            profile: Profile {
                first_name: "First".into(),
                last_name: "Last".into(),
                email: format!("{username}@x.com"),
                phone: "123".into(),
            },
        }
    }

    // -----------------------------------------------------------------------
    // Create / read
    // -----------------------------------------------------------------------

    #[test]
    fn create_then_get_by_id() {
        let f = setup();
        let created = f.users.create(new_user("alice")).unwrap();
        assert_eq!(created.salt, "salt");
        assert_eq!(created.password_hash, "hash");
        assert!(created.address_ids.is_empty());

        let fetched = f.users.get_by_id(&created.id.to_hex()).unwrap();
        assert_eq!(fetched, created);
    }

    #[test]
    fn duplicate_username_fails_without_mutation() {
        let f = setup();
        let first = f.users.create(new_user("alice")).unwrap();

        let mut again = new_user("alice");
        again.profile.first_name = "Impostor".into();
        let err = f.users.create(again).unwrap_err();
        assert!(matches!(err, StoreError::DuplicateKey { ref field, .. } if field == USERNAME));

        assert_eq!(f.users.list().unwrap().len(), 1);
        assert_eq!(f.users.get(&first.id).unwrap(), first);
    }

    #[test]
    fn get_by_username() {
        let f = setup();
        let created = f.users.create(new_user("bob")).unwrap();
        assert_eq!(f.users.get_by_username("bob").unwrap().id, created.id);
        assert!(matches!(
            f.users.get_by_username("nobody"),
            Err(StoreError::NotFound { .. })
        ));
    }

    #[test]
    fn invalid_id_never_reaches_backend() {
        let f = setup();
        f.backend.set_available(false);
        for bad in ["", "123", "zzzzzzzzzzzzzzzzzzzzzzzz", "5a1b2c3d4e5f60718293a4b5ff"] {
            assert!(matches!(
                f.users.get_by_id(bad),
                Err(StoreError::InvalidIdentifier { .. })
            ));
            assert!(matches!(
                f.users.delete(bad),
                Err(StoreError::InvalidIdentifier { .. })
            ));
        }
    }

    #[test]
    fn list_returns_all_users() {
        let f = setup();
        f.users.create(new_user("a")).unwrap();
        f.users.create(new_user("b")).unwrap();
        let mut names: Vec<_> = f.users.list().unwrap().into_iter().map(|u| u.username).collect();
        names.sort();
        assert_eq!(names, vec!["a", "b"]);
    }

    // -----------------------------------------------------------------------
    // Update
    // -----------------------------------------------------------------------

    #[test]
    fn update_profile_keeps_identity_and_links() {
        let f = setup();
        let user = f.users.create(new_user("carol")).unwrap();
        let address = f.addresses.create(AddressDetails::default()).unwrap();
        f.links.add_link(&user.id, &address.id).unwrap();

        let profile = Profile {
            email: "new@x.com".into(),
            ..user.profile.clone()
        };
        let updated = f.users.update_profile(&user.id, &profile, Some("newhash")).unwrap();
        assert_eq!(updated.profile.email, "new@x.com");
        assert_eq!(updated.password_hash, "newhash");
        assert_eq!(updated.salt, user.salt);
        assert_eq!(updated.username, user.username);
        assert_eq!(updated.address_ids, vec![address.id]);
    }

    #[test]
    fn update_missing_user_is_not_found() {
        let f = setup();
        let err = f
            .users
            .update_profile(&EntityId::generate(), &Profile::default(), None)
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
    }

    // -----------------------------------------------------------------------
    // Cascade delete
    // -----------------------------------------------------------------------

    #[test]
    fn delete_cascades_to_linked_addresses() {
        let f = setup();
        let user = f.users.create(new_user("dave")).unwrap();
        let a = f.addresses.create(AddressDetails::default()).unwrap();
        let b = f.addresses.create(AddressDetails::default()).unwrap();
        let unrelated = f.addresses.create(AddressDetails::default()).unwrap();
        f.links.add_link(&user.id, &a.id).unwrap();
        f.links.add_link(&user.id, &b.id).unwrap();

        let removed = f.users.delete(&user.id.to_hex()).unwrap();
        assert_eq!(removed, 2);
        assert!(matches!(f.users.get(&user.id), Err(StoreError::NotFound { .. })));
        assert!(f.addresses.get(&a.id).is_err());
        assert!(f.addresses.get(&b.id).is_err());
        assert!(f.addresses.get(&unrelated.id).is_ok());
    }

    #[test]
    fn delete_missing_user_is_not_found() {
        let f = setup();
        let err = f.users.delete(&EntityId::generate().to_hex()).unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
    }

    #[test]
    fn failed_address_cascade_keeps_user() {
        let f = setup();
        let user = f.users.create(new_user("erin")).unwrap();
        let a = f.addresses.create(AddressDetails::default()).unwrap();
        f.links.add_link(&user.id, &a.id).unwrap();

        f.backend.inject_fault(Operation::Remove, "addresses");
        let err = f.users.delete_id(&user.id).unwrap_err();
        assert!(err.is_transient());

        // Nothing was removed, so the link list still resolves.
        let kept = f.users.get(&user.id).unwrap();
        assert_eq!(kept.address_ids, vec![a.id]);
        assert!(f.addresses.get(&a.id).is_ok());
    }
}
