use std::fmt;

use serde::{Deserialize, Serialize};

use crate::address::Address;
use crate::id::EntityId;

/// Descriptive fields of a user that callers may change after creation.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Profile {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: String,
}

/// Username and plaintext password as supplied by a caller.
///
/// `Debug` redacts the password.
#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// A user ready to be persisted: the password is already salted and hashed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewUser {
    pub username: String,
    pub password_hash: String,
    pub salt: String,
    pub profile: Profile,
}

/// Partial update of a user's mutable fields.
///
/// `None` leaves a field untouched. A new `password` is re-hashed with the
/// user's existing salt by the caller before it reaches storage.
#[derive(Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProfileUpdate {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub password: Option<String>,
}

impl ProfileUpdate {
    /// Returns `true` if the update would change nothing.
    pub fn is_empty(&self) -> bool {
        self.first_name.is_none()
            && self.last_name.is_none()
            && self.email.is_none()
            && self.phone.is_none()
            && self.password.is_none()
    }

    /// Apply the profile fields of this update to `profile`.
    pub fn apply_to(&self, profile: &mut Profile) {
        if let Some(v) = &self.first_name {
            profile.first_name.clone_from(v);
        }
        if let Some(v) = &self.last_name {
            profile.last_name.clone_from(v);
        }
        if let Some(v) = &self.email {
            profile.email.clone_from(v);
        }
        if let Some(v) = &self.phone {
            profile.phone.clone_from(v);
        }
    }
}

impl fmt::Debug for ProfileUpdate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProfileUpdate")
            .field("first_name", &self.first_name)
            .field("last_name", &self.last_name)
            .field("email", &self.email)
            .field("phone", &self.phone)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// A stored user.
///
/// `password_hash` and `salt` are carried for credential verification but are
/// never serialized. `addresses` is the on-demand projection of
/// `address_ids`; it is `None` until the user has been populated and is
/// never persisted.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: EntityId,
    pub username: String,
    #[serde(skip_serializing, default)]
    pub password_hash: String,
    #[serde(skip_serializing, default)]
    pub salt: String,
    #[serde(flatten)]
    pub profile: Profile,
    #[serde(default)]
    pub address_ids: Vec<EntityId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub addresses: Option<Vec<Address>>,
}

impl User {
    /// Returns `true` once the address projection has been materialized.
    pub fn is_populated(&self) -> bool {
        self.addresses.is_some()
    }

    /// Returns `true` if `address` is in this user's link list.
    pub fn owns(&self, address: &EntityId) -> bool {
        self.address_ids.contains(address)
    }
}

impl fmt::Debug for User {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("User")
            .field("id", &self.id)
            .field("username", &self.username)
            .field("profile", &self.profile)
            .field("address_ids", &self.address_ids)
            .field("addresses", &self.addresses)
            .finish_non_exhaustive()
    }
}
