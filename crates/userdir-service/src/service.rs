use std::sync::Arc;

use tracing::{debug, info, warn};
use userdir_crypto::{PasswordHasher, Salt};
use userdir_store::{
    connect, decode_id, DirectoryStores, DocumentStore, OrphanSweeper, StoreError, SweepHandle,
};
use userdir_types::{
    Address, AddressDetails, Credentials, NewUser, Profile, ProfileUpdate, User,
};

use crate::config::DirectoryConfig;
use crate::error::{ServiceError, ServiceResult};

/// The directory's use cases over one document store.
///
/// Users returned from [`get_user`](Self::get_user) and
/// [`list_users`](Self::list_users) carry only their link list;
/// [`login`](Self::login) and [`populate_user`](Self::populate_user) also
/// resolve the linked addresses.
pub struct DirectoryService {
    store: Arc<dyn DocumentStore>,
    config: DirectoryConfig,
    stores: DirectoryStores,
    hasher: PasswordHasher,
}

impl DirectoryService {
    /// Validate `config`, wait for the store under the configured retry
    /// policy, and build the service.
    pub async fn bootstrap(
        config: DirectoryConfig,
        store: Arc<dyn DocumentStore>,
    ) -> ServiceResult<Self> {
        config.validate()?;
        let attempts = connect(&*store, &config.collections, &config.retry).await?;
        info!(attempts, "directory service ready");
        Self::new(config, store)
    }

    /// Build the service over a store that is already reachable.
    ///
    /// Ensures the username index but does not retry or validate `config`
    /// beyond the password cost.
    pub fn new(config: DirectoryConfig, store: Arc<dyn DocumentStore>) -> ServiceResult<Self> {
        let hasher = config.password.hasher()?;
        let stores = DirectoryStores::new(Arc::clone(&store), &config.collections)?;
        Ok(Self {
            store,
            config,
            stores,
            hasher,
        })
    }

    pub fn config(&self) -> &DirectoryConfig {
        &self.config
    }

    pub fn stores(&self) -> &DirectoryStores {
        &self.stores
    }

    /// Check that the store is reachable.
    pub fn health(&self) -> ServiceResult<()> {
        Ok(self.store.ping()?)
    }

    /// An orphan sweeper over this service's collections.
    pub fn sweeper(&self) -> OrphanSweeper {
        OrphanSweeper::new(
            Arc::clone(&self.store),
            self.config.collections.clone(),
            self.config.reconcile.grace(),
        )
    }

    /// Start the periodic orphan sweep if it is enabled.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn_reconciler(&self) -> Option<SweepHandle> {
        if !self.config.reconcile.enabled {
            debug!("orphan sweep disabled");
            return None;
        }
        Some(self.sweeper().spawn(self.config.reconcile.interval()))
    }

    // ---- Authentication ----

    /// Self-service registration.
    pub fn register(&self, credentials: Credentials, profile: Profile) -> ServiceResult<User> {
        let user = self.insert_user(credentials, profile)?;
        info!(user_id = %user.id, username = %user.username, "user registered");
        Ok(user)
    }

    /// Verify a password and return the user with its addresses resolved.
    ///
    /// Unknown usernames fail with `NotFound`, wrong passwords with
    /// `Unauthorized`.
    pub fn login(&self, username: &str, password: &str) -> ServiceResult<User> {
        let user = self.stores.users.get_by_username(username)?;
        if !self.hasher.verify(password, &user.salt, &user.password_hash)? {
            info!(username, "login rejected");
            return Err(ServiceError::Unauthorized);
        }
        debug!(user_id = %user.id, "login accepted");
        Ok(self.stores.population.populate(user)?)
    }

    // ---- Users ----

    /// Administrative create. The salt is still generated here.
    pub fn create_user(&self, credentials: Credentials, profile: Profile) -> ServiceResult<User> {
        let user = self.insert_user(credentials, profile)?;
        info!(user_id = %user.id, username = %user.username, "user created");
        Ok(user)
    }

    pub fn list_users(&self) -> ServiceResult<Vec<User>> {
        Ok(self.stores.users.list()?)
    }

    pub fn get_user(&self, user_id: &str) -> ServiceResult<User> {
        Ok(self.stores.users.get_by_id(user_id)?)
    }

    /// Fetch a user with its address projection materialized.
    pub fn populate_user(&self, user_id: &str) -> ServiceResult<User> {
        let user = self.stores.users.get_by_id(user_id)?;
        Ok(self.stores.population.populate(user)?)
    }

    /// Apply a partial profile update.
    ///
    /// The username and salt never change; a new password is hashed with
    /// the user's existing salt.
    pub fn update_user(&self, user_id: &str, update: ProfileUpdate) -> ServiceResult<User> {
        let id = decode_id(user_id)?;
        let current = self.stores.users.get(&id)?;
        if update.is_empty() {
            return Ok(current);
        }

        let mut profile = current.profile.clone();
        update.apply_to(&mut profile);
        let password_hash = update
            .password
            .as_deref()
            .map(|password| self.hasher.hash(password, &current.salt))
            .transpose()?;
        let user = self
            .stores
            .users
            .update_profile(&id, &profile, password_hash.as_deref())?;
        debug!(user_id = %id, password_changed = password_hash.is_some(), "user updated");
        Ok(user)
    }

    /// Delete a user and every address it links to.
    ///
    /// Returns the number of addresses removed.
    pub fn delete_user(&self, user_id: &str) -> ServiceResult<u64> {
        Ok(self.stores.users.delete(user_id)?)
    }

    // ---- Addresses ----

    /// Create an address owned by `user_id`.
    ///
    /// The address is written first and then linked. If linking fails the
    /// call fails with `LinkConsistency`; the new address is deleted on a
    /// best-effort basis and otherwise left for the orphan sweep.
    pub fn create_address(&self, details: AddressDetails, user_id: &str) -> ServiceResult<Address> {
        let owner = decode_id(user_id)?;
        // Fail before writing anything if the owner is already gone.
        self.stores.users.get(&owner)?;

        let address = self.stores.addresses.create(details)?;
        if let Err(e) = self.stores.links.add_link(&owner, &address.id) {
            warn!(user_id = %owner, address_id = %address.id, error = %e, "linking new address failed");
            match self.stores.addresses.delete_id(&address.id) {
                Ok(()) => info!(address_id = %address.id, "unlinked address removed"),
                Err(cleanup) => warn!(
                    address_id = %address.id,
                    error = %cleanup,
                    "unlinked address left for orphan sweep"
                ),
            }
            return Err(StoreError::LinkConsistency {
                user_id: owner,
                address_id: address.id,
                reason: e.to_string(),
            }
            .into());
        }

        debug!(user_id = %owner, address_id = %address.id, "address created and linked");
        Ok(address)
    }

    pub fn get_address(&self, address_id: &str) -> ServiceResult<Address> {
        Ok(self.stores.addresses.get_by_id(address_id)?)
    }

    pub fn list_addresses(&self) -> ServiceResult<Vec<Address>> {
        Ok(self.stores.addresses.list()?)
    }

    /// Resolve the addresses linked from `user_id`.
    pub fn addresses_for_user(&self, user_id: &str) -> ServiceResult<Vec<Address>> {
        let user = self.stores.users.get_by_id(user_id)?;
        Ok(self.stores.population.resolve(&user)?)
    }

    /// Unlink `address_id` from `user_id`, then delete the address.
    ///
    /// Fails with `NotFound` and removes nothing if the address is not in
    /// the user's link list.
    pub fn delete_address(&self, user_id: &str, address_id: &str) -> ServiceResult<()> {
        let owner = decode_id(user_id)?;
        let address = decode_id(address_id)?;

        if !self.stores.links.remove_link(&owner, &address)? {
            return Err(StoreError::NotFound {
                collection: self.config.collections.addresses.clone(),
                key: format!("{address} linked from user {owner}"),
            }
            .into());
        }
        self.stores.addresses.delete_id(&address).inspect_err(|e| {
            warn!(address_id = %address, error = %e, "address unlinked but not deleted");
        })?;
        debug!(user_id = %owner, address_id = %address, "address deleted");
        Ok(())
    }

    fn insert_user(&self, credentials: Credentials, profile: Profile) -> ServiceResult<User> {
        let salt = Salt::generate();
        let password_hash = self.hasher.hash(&credentials.password, salt.as_str())?;
        Ok(self.stores.users.create(NewUser {
            username: credentials.username,
            password_hash,
            salt: salt.into_string(),
            profile,
        })?)
    }
}

impl std::fmt::Debug for DirectoryService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirectoryService")
            .field("config", &self.config)
            .field("stores", &self.stores)
            .finish_non_exhaustive()
    }
}
