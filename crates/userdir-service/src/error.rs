use thiserror::Error;
use userdir_crypto::PasswordError;
use userdir_store::StoreError;

/// Transport-neutral error category, for mapping onto status codes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidIdentifier,
    NotFound,
    DuplicateKey,
    Unauthorized,
    Connectivity,
    LinkConsistency,
    Internal,
}

#[derive(Debug, Error)]
pub enum ServiceError {
    /// Password did not match the stored hash.
    #[error("invalid credentials")]
    Unauthorized,

    #[error(transparent)]
    Store(#[from] StoreError),

    /// A stored credential could not be checked.
    #[error("credential error: {0}")]
    Credential(#[from] PasswordError),

    #[error("configuration error: {0}")]
    Config(String),
}

impl ServiceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Unauthorized => ErrorKind::Unauthorized,
            Self::Store(e) => match e {
                StoreError::InvalidIdentifier { .. } => ErrorKind::InvalidIdentifier,
                StoreError::NotFound { .. } => ErrorKind::NotFound,
                StoreError::DuplicateKey { .. } => ErrorKind::DuplicateKey,
                StoreError::Connectivity(_) => ErrorKind::Connectivity,
                StoreError::LinkConsistency { .. } => ErrorKind::LinkConsistency,
                StoreError::Serialization(_) | StoreError::Backend(_) => ErrorKind::Internal,
            },
            Self::Credential(_) | Self::Config(_) => ErrorKind::Internal,
        }
    }
}

pub type ServiceResult<T> = Result<T, ServiceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_errors_keep_their_kind() {
        let cases = [
            (StoreError::Connectivity("down".into()), ErrorKind::Connectivity),
            (StoreError::Backend("poisoned".into()), ErrorKind::Internal),
            (
                StoreError::NotFound {
                    collection: "users".into(),
                    key: "x".into(),
                },
                ErrorKind::NotFound,
            ),
        ];
        for (err, kind) in cases {
            assert_eq!(ServiceError::from(err).kind(), kind);
        }
    }

    #[test]
    fn store_errors_display_transparently() {
        let err = ServiceError::from(StoreError::Connectivity("down".into()));
        assert_eq!(err.to_string(), "store unreachable: down");
    }

    #[test]
    fn unauthorized_kind() {
        assert_eq!(ServiceError::Unauthorized.kind(), ErrorKind::Unauthorized);
        assert_eq!(ServiceError::Config("x".into()).kind(), ErrorKind::Internal);
    }
}
