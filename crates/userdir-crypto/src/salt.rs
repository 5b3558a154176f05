use std::fmt;

/// Salt length in bytes before hex encoding.
pub const SALT_LEN: usize = 32;

/// A per-user salt, hex-encoded.
///
/// Generated once when a user is created and never rotated.
#[derive(Clone, PartialEq, Eq)]
pub struct Salt(String);

impl Salt {
    /// Draw a fresh salt from the thread-local CSPRNG.
    pub fn generate() -> Self {
        let mut bytes = [0u8; SALT_LEN];
        rand::Rng::fill(&mut rand::thread_rng(), &mut bytes);
        Self(hex::encode(bytes))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Debug for Salt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Salt({}..)", &self.0[..8])
    }
}

impl AsRef<str> for Salt {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
