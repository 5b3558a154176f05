//! Foundation types for userdir.
//!
//! This crate provides the identifier codec and the value objects shared by
//! every other userdir crate. It has no knowledge of storage or hashing.
//!
//! # Key Types
//!
//! - [`EntityId`] -- 12-byte identifier rendered as 24 hex characters
//! - [`User`] -- a stored user profile, optionally populated with addresses
//! - [`Address`] -- a stored postal address
//! - [`Credentials`] / [`Profile`] -- inputs to registration
//! - [`ProfileUpdate`] -- partial update of a user's mutable fields

pub mod address;
pub mod error;
pub mod id;
pub mod user;

pub use address::{Address, AddressDetails};
pub use error::TypeError;
pub use id::EntityId;
pub use user::{Credentials, NewUser, Profile, ProfileUpdate, User};
