use argon2::{Algorithm, Argon2, Params, Version};
use subtle::ConstantTimeEq;

/// Length of a derived password digest in bytes.
pub const DIGEST_LENGTH: usize = 32;

/// Argon2id password hasher.
///
/// The stored form is the hex-encoded Argon2id output over the password
/// with the user's salt string as the Argon2 salt. Cost parameters are not
/// stored alongside the digest, so changing them invalidates existing
/// credentials.
#[derive(Clone, Debug, PartialEq)]
pub struct PasswordHasher {
    params: Params,
}

impl PasswordHasher {
    /// Hasher with explicit Argon2 costs: memory in KiB, passes, and lanes.
    pub fn with_cost(
        memory_kib: u32,
        iterations: u32,
        parallelism: u32,
    ) -> Result<Self, PasswordError> {
        let params = Params::new(memory_kib, iterations, parallelism, Some(DIGEST_LENGTH))
            .map_err(|e| PasswordError::InvalidParams(e.to_string()))?;
        Ok(Self { params })
    }

    fn argon2(&self) -> Argon2<'static> {
        Argon2::new(Algorithm::Argon2id, Version::V0x13, self.params.clone())
    }

    /// Raw Argon2id digest of `password` under `salt`.
    ///
    /// Fails if `salt` is shorter than Argon2's minimum of 8 bytes.
    pub fn digest(&self, password: &str, salt: &str) -> Result<[u8; DIGEST_LENGTH], PasswordError> {
        let mut out = [0u8; DIGEST_LENGTH];
        self.argon2()
            .hash_password_into(password.as_bytes(), salt.as_bytes(), &mut out)
            .map_err(|e| PasswordError::Hashing(e.to_string()))?;
        Ok(out)
    }

    /// Hex-encoded digest, as stored.
    pub fn hash(&self, password: &str, salt: &str) -> Result<String, PasswordError> {
        self.digest(password, salt).map(hex::encode)
    }

    /// Check `password` against a stored hex digest.
    ///
    /// The comparison is constant-time. Returns `Err` if the stored digest
    /// is not hex of the right length or the salt cannot be used.
    pub fn verify(&self, password: &str, salt: &str, stored: &str) -> Result<bool, PasswordError> {
        let expected = hex::decode(stored).map_err(|e| PasswordError::MalformedHash(e.to_string()))?;
        if expected.len() != DIGEST_LENGTH {
            return Err(PasswordError::MalformedHash(format!(
                "expected {DIGEST_LENGTH} bytes, got {}",
                expected.len()
            )));
        }
        let actual = self.digest(password, salt)?;
        Ok(actual.as_slice().ct_eq(expected.as_slice()).into())
    }

    pub fn memory_kib(&self) -> u32 {
        self.params.m_cost()
    }

    pub fn iterations(&self) -> u32 {
        self.params.t_cost()
    }

    pub fn parallelism(&self) -> u32 {
        self.params.p_cost()
    }
}

impl Default for PasswordHasher {
    /// Argon2's recommended defaults: 19 MiB, 2 passes, 1 lane.
    fn default() -> Self {
        Self {
            params: Params::DEFAULT,
        }
    }
}

/// Errors from password hashing and verification.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum PasswordError {
    #[error("stored password hash is malformed: {0}")]
    MalformedHash(String),

    #[error("invalid password hashing parameters: {0}")]
    InvalidParams(String),

    #[error("password hashing failed: {0}")]
    Hashing(String),
}
