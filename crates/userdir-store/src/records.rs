//! Persisted document shapes.
//!
//! These mirror the value objects in `userdir-types` but include every
//! stored field (hash and salt) and never the populated address projection.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use userdir_types::{Address, AddressDetails, EntityId, NewUser, Profile, User};

use crate::document::Document;
use crate::error::{StoreError, StoreResult};

pub(crate) const USERNAME: &str = "username";
pub(crate) const ADDRESS_IDS: &str = "addressIds";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct UserRecord {
    pub id: EntityId,
    pub username: String,
    pub password_hash: String,
    pub salt: String,
    #[serde(flatten)]
    pub profile: Profile,
    #[serde(default)]
    pub address_ids: Vec<EntityId>,
}

impl UserRecord {
    pub fn new(id: EntityId, user: NewUser) -> Self {
        Self {
            id,
            username: user.username,
            password_hash: user.password_hash,
            salt: user.salt,
            profile: user.profile,
            address_ids: Vec::new(),
        }
    }

    pub fn into_user(self) -> User {
        User {
            id: self.id,
            username: self.username,
            password_hash: self.password_hash,
            salt: self.salt,
            profile: self.profile,
            address_ids: self.address_ids,
            addresses: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct AddressRecord {
    pub id: EntityId,
    #[serde(flatten)]
    pub details: AddressDetails,
}

impl AddressRecord {
    pub fn into_address(self) -> Address {
        Address::new(self.id, self.details)
    }
}

/// Encode a record as a top-level JSON object.
pub(crate) fn to_document<T: Serialize>(record: &T) -> StoreResult<Document> {
    match serde_json::to_value(record)? {
        Value::Object(map) => Ok(map),
        other => Err(StoreError::Serialization(format!(
            "expected a JSON object, got {other}"
        ))),
    }
}

pub(crate) fn from_document<T: DeserializeOwned>(document: Document) -> StoreResult<T> {
    Ok(serde_json::from_value(Value::Object(document))?)
}

/// Encode an id the way it appears inside documents.
pub(crate) fn id_value(id: &EntityId) -> Value {
    Value::String(id.to_hex())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_record_uses_persisted_field_names() {
        let record = UserRecord::new(
            EntityId::generate(),
            NewUser {
                username: "alice".into(),
                password_hash: "h".into(),
                salt: "s".into(),
                profile: Profile {
                    first_name: "Alice".into(),
                    ..Default::default()
                },
            },
        );
        let document = to_document(&record).unwrap();
        for field in [
            "id",
            USERNAME,
            "passwordHash",
            "salt",
            "firstName",
            "lastName",
            "email",
            "phone",
            ADDRESS_IDS,
        ] {
            assert!(document.contains_key(field), "missing {field}");
        }
        let back: UserRecord = from_document(document).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn address_record_uses_persisted_field_names() {
        let record = AddressRecord {
            id: EntityId::generate(),
            details: AddressDetails {
                post_code: "10115".into(),
                ..Default::default()
            },
        };
        let document = to_document(&record).unwrap();
        assert_eq!(document["postCode"], "10115");
        assert!(document.contains_key("extraInfo"));
    }

    #[test]
    fn malformed_document_fails_to_decode() {
        let mut document = Document::new();
        document.insert("id".into(), Value::String("bad".into()));
        let result: StoreResult<AddressRecord> = from_document(document);
        assert!(matches!(result, Err(StoreError::Serialization(_))));
    }
}
