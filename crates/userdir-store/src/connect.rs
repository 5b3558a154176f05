//! Startup connectivity with exponential backoff.
//!
//! [`connect`] is the only place the store is retried. Request-path
//! operations fail fast and surface `Connectivity` to the caller.

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::document::{Collections, DocumentStore};
use crate::error::StoreResult;
use crate::records::USERNAME;

/// Backoff policy for the startup connectivity loop.
///
/// Backoff for attempt `n` (1-based) is
/// `initial_backoff_ms * multiplier^(n-1)`, capped at `max_backoff_ms`, then
/// spread by ±`jitter`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub multiplier: f64,
    /// Jitter factor in `[0.0, 1.0]`.
    pub jitter: f64,
    /// Give up after this many failed pings. `None` retries forever.
    pub max_attempts: Option<u32>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_backoff_ms: 100,
            max_backoff_ms: 10_000,
            multiplier: 2.0,
            jitter: 0.25,
            max_attempts: None,
        }
    }
}

impl RetryPolicy {
    pub fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.initial_backoff_ms)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_millis(self.max_backoff_ms)
    }

    /// Un-jittered backoff after failed attempt `attempt` (1-based).
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let millis = self.initial_backoff_ms as f64 * self.multiplier.max(1.0).powi(exponent);
        let capped = millis.min(self.max_backoff_ms as f64);
        Duration::from_millis(capped as u64)
    }

    /// Whether another attempt is allowed after `attempts` failures.
    pub fn allows_retry(&self, attempts: u32) -> bool {
        self.max_attempts.map_or(true, |max| attempts < max)
    }
}

fn apply_jitter(dur: Duration, factor: f64) -> Duration {
    if factor <= 0.0 || dur.is_zero() {
        return dur;
    }
    let factor = factor.clamp(0.0, 1.0);
    let base = dur.as_nanos() as f64;
    let jittered = rand::thread_rng().gen_range(base * (1.0 - factor)..=base * (1.0 + factor));
    Duration::from_nanos(jittered as u64)
}

/// Create the indexes the stores rely on. Idempotent.
///
/// Fails with `DuplicateKey` if existing users already share a username.
pub fn ensure_indexes(store: &dyn DocumentStore, collections: &Collections) -> StoreResult<()> {
    store.ensure_unique_index(&collections.users, USERNAME)
}

/// Wait until `store` answers a ping, then [`ensure_indexes`].
///
/// Every failed ping is logged at `warn` and followed by a backoff sleep.
/// Returns the number of attempts taken. Fails with the last ping error
/// once `policy.max_attempts` is exhausted, or with the index error if
/// existing data violates the username constraint.
pub async fn connect(
    store: &dyn DocumentStore,
    collections: &Collections,
    policy: &RetryPolicy,
) -> StoreResult<u32> {
    let mut attempt = 0;
    loop {
        attempt += 1;
        match store.ping() {
            Ok(()) => break,
            Err(e) if policy.allows_retry(attempt) => {
                let backoff = apply_jitter(policy.backoff_for(attempt), policy.jitter);
                warn!(
                    attempt,
                    backoff_ms = backoff.as_millis() as u64,
                    error = %e,
                    "store unreachable, retrying"
                );
                tokio::time::sleep(backoff).await;
            }
            Err(e) => {
                warn!(attempt, error = %e, "store unreachable, giving up");
                return Err(e);
            }
        }
    }

    ensure_indexes(store, collections)?;
    info!(
        attempt,
        users = %collections.users,
        addresses = %collections.addresses,
        "store connected"
    );
    Ok(attempt)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::document::Document;
    use crate::error::StoreError;
    use crate::memory::InMemoryDocumentStore;
    use serde_json::json;
    use userdir_types::EntityId;

    fn fast(max_attempts: Option<u32>) -> RetryPolicy {
        RetryPolicy {
            initial_backoff_ms: 1,
            max_backoff_ms: 5,
            multiplier: 2.0,
            jitter: 0.0,
            max_attempts,
        }
    }

    #[test]
    fn backoff_grows_and_caps() {
        let policy = RetryPolicy {
            jitter: 0.0,
            ..Default::default()
        };
        assert_eq!(policy.backoff_for(1), Duration::from_millis(100));
        assert_eq!(policy.backoff_for(2), Duration::from_millis(200));
        assert_eq!(policy.backoff_for(4), Duration::from_millis(800));
        assert_eq!(policy.backoff_for(30), policy.max_backoff());
        assert_eq!(policy.backoff_for(u32::MAX), policy.max_backoff());
    }

    #[test]
    fn default_policy_is_unbounded() {
        let policy = RetryPolicy::default();
        assert!(policy.max_attempts.is_none());
        assert!(policy.allows_retry(u32::MAX - 1));
    }

    #[test]
    fn jitter_stays_in_bounds() {
        let base = Duration::from_millis(1000);
        for _ in 0..100 {
            let d = apply_jitter(base, 0.25);
            assert!(d >= Duration::from_millis(750) && d <= Duration::from_millis(1250));
        }
        assert_eq!(apply_jitter(base, 0.0), base);
        assert_eq!(apply_jitter(Duration::ZERO, 0.5), Duration::ZERO);
    }

    #[tokio::test]
    async fn connects_immediately_when_available() {
        let store = InMemoryDocumentStore::new();
        let attempts = connect(&store, &Collections::default(), &fast(Some(1)))
            .await
            .unwrap();
        assert_eq!(attempts, 1);

        // The username index is in place.
        store
            .insert("users", EntityId::generate(), json_doc("alice"))
            .unwrap();
        assert!(matches!(
            store.insert("users", EntityId::generate(), json_doc("alice")),
            Err(StoreError::DuplicateKey { .. })
        ));
    }

    #[tokio::test]
    async fn retries_until_store_comes_back() {
        let store = Arc::new(InMemoryDocumentStore::new());
        store.set_available(false);

        let flipper = {
            let store = Arc::clone(&store);
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(30)).await;
                store.set_available(true);
            })
        };

        let attempts = connect(&*store, &Collections::default(), &fast(None))
            .await
            .unwrap();
        flipper.await.unwrap();
        assert!(attempts > 1);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let store = InMemoryDocumentStore::new();
        store.set_available(false);
        let err = connect(&store, &Collections::default(), &fast(Some(3)))
            .await
            .unwrap_err();
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn index_violation_is_reported() {
        let store = InMemoryDocumentStore::new();
        store
            .insert("users", EntityId::generate(), json_doc("dup"))
            .unwrap();
        store
            .insert("users", EntityId::generate(), json_doc("dup"))
            .unwrap();
        let err = connect(&store, &Collections::default(), &fast(Some(1)))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::DuplicateKey { .. }));
    }

    #[test]
    fn ensure_indexes_is_idempotent() {
        let store = InMemoryDocumentStore::new();
        ensure_indexes(&store, &Collections::default()).unwrap();
        ensure_indexes(&store, &Collections::default()).unwrap();
        store
            .insert("users", EntityId::generate(), json_doc("carol"))
            .unwrap();
        assert!(matches!(
            store.insert("users", EntityId::generate(), json_doc("carol")),
            Err(StoreError::DuplicateKey { .. })
        ));
    }

    fn json_doc(username: &str) -> Document {
        match json!({ "username": username }) {
            serde_json::Value::Object(map) => map,
            _ => unreachable!(),
        }
    }
}
