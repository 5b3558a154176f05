use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use userdir_crypto::PasswordHasher;
use userdir_store::{Collections, RetryPolicy};

use crate::error::{ServiceError, ServiceResult};

/// Startup configuration for a [`DirectoryService`](crate::DirectoryService).
///
/// Every section is optional in TOML; missing fields take their defaults.
///
/// ```toml
/// [collections]
/// users = "users"
/// addresses = "addresses"
///
/// [retry]
/// initial_backoff_ms = 100
/// max_backoff_ms = 10000
/// multiplier = 2.0
/// jitter = 0.25
/// # max_attempts = 10
///
/// [reconcile]
/// enabled = true
/// interval_secs = 300
/// grace_secs = 600
///
/// [password]
/// memory_kib = 19456
/// iterations = 2
/// parallelism = 1
/// ```
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DirectoryConfig {
    pub collections: Collections,
    pub retry: RetryPolicy,
    pub reconcile: ReconcileConfig,
    pub password: PasswordConfig,
}

/// Orphaned-address sweep settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcileConfig {
    pub enabled: bool,
    pub interval_secs: u64,
    /// Unlinked addresses younger than this are left alone.
    pub grace_secs: u64,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 300,
            grace_secs: 600,
        }
    }
}

impl ReconcileConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn grace(&self) -> Duration {
        Duration::from_secs(self.grace_secs)
    }
}

/// Argon2id cost parameters for stored credentials.
///
/// Digests do not record their cost, so these must not change once users
/// have registered.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PasswordConfig {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl Default for PasswordConfig {
    fn default() -> Self {
        Self {
            memory_kib: 19 * 1024,
            iterations: 2,
            parallelism: 1,
        }
    }
}

impl PasswordConfig {
    pub fn hasher(&self) -> ServiceResult<PasswordHasher> {
        PasswordHasher::with_cost(self.memory_kib, self.iterations, self.parallelism)
            .map_err(|e| ServiceError::Config(e.to_string()))
    }
}

impl DirectoryConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(input: &str) -> ServiceResult<Self> {
        let config: Self =
            toml::from_str(input).map_err(|e| ServiceError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file.
    pub fn load(path: impl AsRef<Path>) -> ServiceResult<Self> {
        let path = path.as_ref();
        let input = std::fs::read_to_string(path)
            .map_err(|e| ServiceError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&input)
    }

    pub fn to_toml_string(&self) -> ServiceResult<String> {
        toml::to_string(self).map_err(|e| ServiceError::Config(e.to_string()))
    }

    pub fn validate(&self) -> ServiceResult<()> {
        let c = &self.collections;
        if c.users.is_empty() || c.addresses.is_empty() {
            return Err(ServiceError::Config("collection names must not be empty".into()));
        }
        if c.users == c.addresses {
            return Err(ServiceError::Config(format!(
                "users and addresses share collection {:?}",
                c.users
            )));
        }

        let r = &self.retry;
        if r.multiplier.is_nan() || r.multiplier < 1.0 {
            return Err(ServiceError::Config(format!(
                "retry multiplier must be >= 1.0, got {}",
                r.multiplier
            )));
        }
        if !(0.0..=1.0).contains(&r.jitter) {
            return Err(ServiceError::Config(format!(
                "retry jitter must be within [0, 1], got {}",
                r.jitter
            )));
        }
        if r.max_backoff_ms < r.initial_backoff_ms {
            return Err(ServiceError::Config(
                "retry max_backoff_ms is below initial_backoff_ms".into(),
            ));
        }
        if r.max_attempts == Some(0) {
            return Err(ServiceError::Config("retry max_attempts must be at least 1".into()));
        }

        if self.reconcile.enabled && self.reconcile.interval_secs == 0 {
            return Err(ServiceError::Config("reconcile interval_secs must be positive".into()));
        }
        // A zero grace lets a sweep race the link write of a fresh address.
        if self.reconcile.enabled && self.reconcile.grace_secs == 0 {
            return Err(ServiceError::Config("reconcile grace_secs must be positive".into()));
        }

        self.password.hasher()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn default_config() {
        let c = DirectoryConfig::default();
        assert_eq!(c.collections.users, "users");
        assert_eq!(c.collections.addresses, "addresses");
        assert!(c.retry.max_attempts.is_none());
        assert!(c.reconcile.enabled);
        assert_eq!(c.reconcile.interval(), Duration::from_secs(300));
        let hasher = c.password.hasher().unwrap();
        let recommended = PasswordHasher::default();
        assert_eq!(hasher.memory_kib(), recommended.memory_kib());
        assert_eq!(hasher.iterations(), recommended.iterations());
        assert_eq!(hasher.parallelism(), recommended.parallelism());
        c.validate().unwrap();
    }

    #[test]
    fn empty_toml_uses_defaults() {
        assert_eq!(
            DirectoryConfig::from_toml_str("").unwrap(),
            DirectoryConfig::default()
        );
    }

    #[test]
    fn partial_toml_overrides_fields() {
        let c = DirectoryConfig::from_toml_str(
            r#"
            [collections]
            users = "people"

            [retry]
            max_attempts = 5
            jitter = 0.0

            [reconcile]
            enabled = false
            "#,
        )
        .unwrap();
        assert_eq!(c.collections.users, "people");
        assert_eq!(c.collections.addresses, "addresses");
        assert_eq!(c.retry.max_attempts, Some(5));
        assert_eq!(c.retry.initial_backoff_ms, 100);
        assert!(!c.reconcile.enabled);
        assert_eq!(c.reconcile.grace_secs, 600);
    }

    #[test]
    fn rejects_invalid_values() {
        for input in [
            "[collections]\nusers = \"same\"\naddresses = \"same\"",
            "[collections]\nusers = \"\"",
            "[retry]\nmultiplier = 0.5",
            "[retry]\njitter = 2.0",
            "[retry]\ninitial_backoff_ms = 500\nmax_backoff_ms = 10",
            "[retry]\nmax_attempts = 0",
            "[reconcile]\ninterval_secs = 0",
            "[reconcile]\ngrace_secs = 0",
            "[password]\niterations = 0",
            "[password]\nmemory_kib = 1",
        ] {
            let err = DirectoryConfig::from_toml_str(input).unwrap_err();
            assert!(matches!(err, ServiceError::Config(_)), "accepted {input:?}");
        }
    }

    #[test]
    fn zero_grace_allowed_only_when_sweep_disabled() {
        let c = DirectoryConfig::from_toml_str("[reconcile]\nenabled = false\ngrace_secs = 0")
            .unwrap();
        assert_eq!(c.reconcile.grace(), Duration::ZERO);
    }

    #[test]
    fn password_cost_from_toml() {
        let c = DirectoryConfig::from_toml_str("[password]\nmemory_kib = 64\niterations = 1")
            .unwrap();
        let hasher = c.password.hasher().unwrap();
        assert_eq!(hasher.memory_kib(), 64);
        assert_eq!(hasher.iterations(), 1);
        assert_eq!(hasher.parallelism(), 1);
    }

    #[test]
    fn rejects_malformed_toml() {
        assert!(matches!(
            DirectoryConfig::from_toml_str("[retry\n"),
            Err(ServiceError::Config(_))
        ));
    }

    #[test]
    fn toml_roundtrip() {
        let mut c = DirectoryConfig::default();
        c.retry.max_attempts = Some(3);
        let text = c.to_toml_string().unwrap();
        assert_eq!(DirectoryConfig::from_toml_str(&text).unwrap(), c);
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[reconcile]\ngrace_secs = 30").unwrap();
        let c = DirectoryConfig::load(file.path()).unwrap();
        assert_eq!(c.reconcile.grace(), Duration::from_secs(30));
    }

    #[test]
    fn load_missing_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let err = DirectoryConfig::load(dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(err, ServiceError::Config(ref msg) if msg.contains("absent.toml")));
    }
}
