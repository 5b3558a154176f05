use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::OnceLock;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::TypeError;

/// Raw identifier length in bytes.
pub const ID_LEN: usize = 12;

/// Length of the external hex rendering.
pub const HEX_LEN: usize = ID_LEN * 2;

/// Opaque identifier for a stored user or address.
///
/// Layout (big-endian):
///
/// | bytes | content                                   |
/// |-------|-------------------------------------------|
/// | 0..4  | creation time, seconds since the epoch    |
/// | 4..9  | random value fixed for the process        |
/// | 9..12 | counter, randomly seeded, wraps at 2^24   |
///
/// Identifiers generated by one process are unique and sort roughly by
/// creation time. Externally an `EntityId` is always the 24-character hex
/// string; the raw bytes never leave the process.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityId([u8; ID_LEN]);

fn process_unique() -> &'static [u8; 5] {
    static PROCESS_UNIQUE: OnceLock<[u8; 5]> = OnceLock::new();
    PROCESS_UNIQUE.get_or_init(rand::random)
}

fn counter() -> &'static AtomicU32 {
    static COUNTER: OnceLock<AtomicU32> = OnceLock::new();
    COUNTER.get_or_init(|| AtomicU32::new(rand::random::<u32>() & 0x00ff_ffff))
}

impl EntityId {
    /// Generate a fresh identifier stamped with the current time.
    pub fn generate() -> Self {
        Self::generate_at(SystemTime::now())
    }

    /// Generate a fresh identifier stamped with `time`.
    ///
    /// Times before the epoch are clamped to zero; times past 2106 wrap.
    pub fn generate_at(time: SystemTime) -> Self {
        let secs = time
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as u32)
            .unwrap_or(0);
        let count = counter().fetch_add(1, Ordering::Relaxed) & 0x00ff_ffff;

        let mut bytes = [0u8; ID_LEN];
        bytes[..4].copy_from_slice(&secs.to_be_bytes());
        bytes[4..9].copy_from_slice(process_unique());
        bytes[9..].copy_from_slice(&count.to_be_bytes()[1..]);
        Self(bytes)
    }

    /// Create from raw bytes.
    pub const fn from_bytes(bytes: [u8; ID_LEN]) -> Self {
        Self(bytes)
    }

    /// The raw 12 bytes.
    pub fn as_bytes(&self) -> &[u8; ID_LEN] {
        &self.0
    }

    /// Creation time embedded in the identifier (second precision).
    pub fn created_at(&self) -> SystemTime {
        let secs = u32::from_be_bytes([self.0[0], self.0[1], self.0[2], self.0[3]]);
        UNIX_EPOCH + Duration::from_secs(u64::from(secs))
    }

    /// Hex-encoded string representation (24 lowercase characters).
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse from the external hex representation.
    ///
    /// Accepts exactly 24 hex digits of either case and nothing else.
    pub fn from_hex(s: &str) -> Result<Self, TypeError> {
        if s.len() != HEX_LEN {
            return Err(TypeError::InvalidLength {
                expected: HEX_LEN,
                actual: s.len(),
            });
        }
        let mut bytes = [0u8; ID_LEN];
        hex::decode_to_slice(s, &mut bytes).map_err(|e| TypeError::InvalidHex(e.to_string()))?;
        Ok(Self(bytes))
    }

    /// Returns `true` if `s` would parse as an identifier.
    pub fn is_valid(s: &str) -> bool {
        s.len() == HEX_LEN && s.bytes().all(|b| b.is_ascii_hexdigit())
    }
}

impl fmt::Debug for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EntityId({})", self.to_hex())
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl FromStr for EntityId {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl Serialize for EntityId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for EntityId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

impl From<[u8; ID_LEN]> for EntityId {
    fn from(bytes: [u8; ID_LEN]) -> Self {
        Self(bytes)
    }
}
