use userdir_types::{EntityId, TypeError};

/// Errors from document store and entity store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// An externally supplied identifier is not a valid [`EntityId`].
    /// Raised before any backend access.
    #[error("invalid identifier {input:?}: {source}")]
    InvalidIdentifier {
        input: String,
        #[source]
        source: TypeError,
    },

    /// No document matched the given identifier or key.
    #[error("{collection} not found: {key}")]
    NotFound { collection: String, key: String },

    /// An insert or update would violate a unique index.
    #[error("duplicate key in {collection}: {field} = {value:?}")]
    DuplicateKey {
        collection: String,
        field: String,
        value: String,
    },

    /// The backend could not be reached.
    #[error("store unreachable: {0}")]
    Connectivity(String),

    /// A link-list update failed after (or instead of) its paired entity
    /// write. The address may now be an orphan.
    #[error("link between user {user_id} and address {address_id} is inconsistent: {reason}")]
    LinkConsistency {
        user_id: EntityId,
        address_id: EntityId,
        reason: String,
    },

    /// A document could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The backend failed internally (e.g. a poisoned lock).
    #[error("backend failure: {0}")]
    Backend(String),
}

impl StoreError {
    pub(crate) fn not_found(collection: &str, key: impl ToString) -> Self {
        Self::NotFound {
            collection: collection.to_string(),
            key: key.to_string(),
        }
    }

    /// Returns `true` for failures that may succeed on retry.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Connectivity(_))
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Decode an externally supplied identifier.
///
/// Every entity store entry point that accepts a string identifier routes
/// through here, so malformed input never reaches the backend.
pub fn decode_id(input: &str) -> StoreResult<EntityId> {
    EntityId::from_hex(input).map_err(|source| StoreError::InvalidIdentifier {
        input: input.to_string(),
        source,
    })
}
