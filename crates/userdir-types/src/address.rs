use serde::{Deserialize, Serialize};

use crate::id::EntityId;

/// The mutable content of a postal address.
///
/// Every field is free text; no postal validation is performed.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AddressDetails {
    pub country: String,
    pub city: String,
    pub street: String,
    pub number: String,
    pub post_code: String,
    pub extra_info: String,
}

/// A stored postal address.
///
/// Addresses carry no reference to their owner. Ownership is expressed only
/// by the address id appearing in a [`User`](crate::User)'s address list.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    pub id: EntityId,
    #[serde(flatten)]
    pub details: AddressDetails,
}

impl Address {
    pub fn new(id: EntityId, details: AddressDetails) -> Self {
        Self { id, details }
    }
}
