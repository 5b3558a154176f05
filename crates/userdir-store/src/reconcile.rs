//! Orphaned-address reconciliation.
//!
//! Creating an address and linking it are two writes. A failure between
//! them, or a user delete racing an address create, leaves an address no
//! user links to. [`OrphanSweeper`] finds such addresses and removes them.
//!
//! Addresses younger than the grace period are skipped so that a create
//! whose link write is still in flight is never swept. Creation time comes
//! from the address id and has second resolution, so one extra second is
//! added to every grace comparison.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};
use userdir_types::EntityId;

use crate::document::{Collections, DocumentStore};
use crate::error::StoreResult;
use crate::records::{from_document, AddressRecord, UserRecord};

/// Precision of [`EntityId::created_at`].
const ID_TIME_RESOLUTION: Duration = Duration::from_secs(1);

/// Result of one sweep cycle.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Addresses examined.
    pub scanned: usize,
    /// Unlinked addresses past the grace period that were deleted.
    pub orphans_removed: u64,
}

/// Removes addresses that appear in no user's link list.
#[derive(Clone)]
pub struct OrphanSweeper {
    store: Arc<dyn DocumentStore>,
    collections: Collections,
    grace: Duration,
}

impl OrphanSweeper {
    pub fn new(store: Arc<dyn DocumentStore>, collections: Collections, grace: Duration) -> Self {
        Self {
            store,
            collections,
            grace,
        }
    }

    pub fn grace(&self) -> Duration {
        self.grace
    }

    /// Run one sweep.
    ///
    /// The user snapshot is taken before the address snapshot, so an
    /// address linked after the first read is at worst seen as an orphan
    /// candidate and then protected by the grace period.
    pub fn sweep_once(&self) -> StoreResult<SweepReport> {
        let linked = self.linked_addresses()?;
        let now = SystemTime::now();

        let mut orphans = Vec::new();
        let mut scanned = 0;
        for document in self.store.find_all(&self.collections.addresses)? {
            let record: AddressRecord = from_document(document)?;
            scanned += 1;
            if linked.contains(&record.id) || !self.past_grace(&record.id, now) {
                continue;
            }
            warn!(address_id = %record.id, "removing orphaned address");
            orphans.push(record.id);
        }

        let orphans_removed = if orphans.is_empty() {
            0
        } else {
            self.store
                .remove_many(&self.collections.addresses, &orphans)?
        };
        debug!(scanned, orphans_removed, "orphan sweep finished");
        Ok(SweepReport {
            scanned,
            orphans_removed,
        })
    }

    /// Run sweeps every `every` until `shutdown` turns `true` or its sender
    /// is dropped. The first sweep runs immediately.
    pub async fn run(self, every: Duration, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(
            interval_ms = every.as_millis() as u64,
            grace_secs = self.grace.as_secs(),
            "orphan sweep started"
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.sweep_once() {
                        Ok(report) if report.orphans_removed > 0 => {
                            info!(removed = report.orphans_removed, "orphan sweep removed addresses");
                        }
                        Ok(_) => {}
                        Err(e) => warn!(error = %e, "orphan sweep failed"),
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        info!("orphan sweep stopped");
    }

    /// Spawn [`run`](Self::run) on the current tokio runtime.
    pub fn spawn(self, every: Duration) -> SweepHandle {
        let (tx, rx) = watch::channel(false);
        let task = tokio::spawn(self.run(every, rx));
        SweepHandle { shutdown: tx, task }
    }

    fn linked_addresses(&self) -> StoreResult<HashSet<EntityId>> {
        let mut linked = HashSet::new();
        for document in self.store.find_all(&self.collections.users)? {
            let record: UserRecord = from_document(document)?;
            linked.extend(record.address_ids);
        }
        Ok(linked)
    }

    fn past_grace(&self, id: &EntityId, now: SystemTime) -> bool {
        now.duration_since(id.created_at())
            .is_ok_and(|age| age >= self.grace + ID_TIME_RESOLUTION)
    }
}

impl std::fmt::Debug for OrphanSweeper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrphanSweeper")
            .field("collections", &self.collections)
            .field("grace", &self.grace)
            .finish_non_exhaustive()
    }
}

/// Handle to a spawned sweep task.
#[derive(Debug)]
pub struct SweepHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SweepHandle {
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Signal the task to stop and wait for it.
    pub async fn shutdown(self) {
        // A send error means the task already exited.
        let _ = self.shutdown.send(true);
        if let Err(e) = self.task.await {
            warn!(error = %e, "orphan sweep task ended abnormally");
        }
    }
}
