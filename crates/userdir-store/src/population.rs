use tracing::debug;
use userdir_types::{Address, User};

use crate::addresses::AddressStore;
use crate::error::StoreResult;

/// Resolves a user's address-id list into full address records.
///
/// Population is a projection computed on demand; its result is never
/// written back to storage.
#[derive(Clone, Debug)]
pub struct Population {
    addresses: AddressStore,
}

impl Population {
    pub fn new(addresses: AddressStore) -> Self {
        Self { addresses }
    }

    /// Resolve the addresses linked from `user`.
    ///
    /// One batch lookup for all ids. Ids without a matching address are
    /// dropped, so the result may be shorter than the link list. Order is
    /// unspecified.
    pub fn resolve(&self, user: &User) -> StoreResult<Vec<Address>> {
        let resolved = self.addresses.find_many(&user.address_ids)?;
        if resolved.len() < user.address_ids.len() {
            debug!(
                user_id = %user.id,
                linked = user.address_ids.len(),
                resolved = resolved.len(),
                "some linked addresses did not resolve"
            );
        }
        Ok(resolved)
    }

    /// Return `user` with its address projection materialized.
    pub fn populate(&self, mut user: User) -> StoreResult<User> {
        user.addresses = Some(self.resolve(&user)?);
        Ok(user)
    }
}
