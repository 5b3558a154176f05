//! Password primitives for userdir.
//!
//! Provides per-user salt generation and Argon2id salted password hashing
//! with constant-time verification.
//!
//! All crypto operations wrap established libraries -- no custom cryptography.

pub mod password;
pub mod salt;

pub use password::{PasswordError, PasswordHasher, DIGEST_LENGTH};
pub use salt::Salt;
