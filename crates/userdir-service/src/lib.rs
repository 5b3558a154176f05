//! Directory service for userdir.
//!
//! [`DirectoryService`] composes the stores, the link manager, population
//! and password hashing into the directory's use cases. It is the main entry
//! point for an embedding transport layer: every method takes plain values
//! and returns value objects or a [`ServiceError`] whose [`ErrorKind`] maps
//! onto protocol status codes.

pub mod config;
pub mod error;
pub mod service;

pub use config::{DirectoryConfig, PasswordConfig, ReconcileConfig};
pub use error::{ErrorKind, ServiceError, ServiceResult};
pub use service::DirectoryService;

// Re-export key types
pub use userdir_store::{Collections, DocumentStore, InMemoryDocumentStore, RetryPolicy, SweepHandle};
pub use userdir_types::{Address, AddressDetails, Credentials, EntityId, Profile, ProfileUpdate, User};
