//! Correlation table: the async-to-sync join point.
//!
//! Flow:
//! 1. The inbound adapter calls `register()` with the caller's key
//! 2. It sends the plugin command tagged with that key
//! 3. The result dispatcher calls `resolve()` when the result arrives
//! 4. The adapter awaits the handle or times out
//!
//! Removal and delivery happen in one `DashMap::remove`, so a key can be
//! resolved at most once.

use crate::domain::correlation::CorrelationKey;
use crate::domain::error::{BridgeError, CorrelationError};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::oneshot;
use tracing::{debug, warn};

/// What a waiting caller eventually receives.
pub type Delivery = Result<String, BridgeError>;

/// Why an entry left the table without being resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemovalReason {
    /// The command never reached the transport.
    Rollback,
    /// The caller's deadline passed.
    Timeout,
    /// The caller went away.
    Disconnected,
}

/// Identifies one registration of a key.
///
/// A key can be registered again once its previous entry is gone; the token
/// keeps a late eviction from the earlier caller off the newer entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RegistrationId(u64);

/// Injectable store of pending callers.
pub trait CorrelationStore: Send + Sync {
    /// Register a key. Fails if it is already pending or the table is full.
    fn register(
        &self,
        key: CorrelationKey,
        timeout: Option<Duration>,
    ) -> Result<PendingHandle, CorrelationError>;

    /// Deliver an outcome to the caller waiting on `key` and evict it.
    fn resolve(&self, key: &CorrelationKey, outcome: Delivery) -> Result<(), CorrelationError>;

    /// Evict the entry registered as `id` under `key` without delivering
    /// anything. Returns false if absent or owned by another registration.
    fn remove(&self, key: &CorrelationKey, id: RegistrationId, reason: RemovalReason) -> bool;

    /// Whether `key` is currently pending.
    fn contains(&self, key: &CorrelationKey) -> bool;

    /// Number of pending callers.
    fn pending_count(&self) -> usize;
}

struct PendingResponse {
    id: RegistrationId,
    sender: oneshot::Sender<Delivery>,
    created_at: Instant,
    timeout: Duration,
}

/// Receiving half handed to the registering caller.
#[derive(Debug)]
pub struct PendingHandle {
    key: CorrelationKey,
    id: RegistrationId,
    receiver: oneshot::Receiver<Delivery>,
    timeout: Duration,
}

impl PendingHandle {
    pub fn key(&self) -> &CorrelationKey {
        &self.key
    }

    /// Token of this registration, needed to evict it.
    pub fn id(&self) -> RegistrationId {
        self.id
    }

    /// Deadline the table applies to this entry.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Wait for the outcome. A dropped sender (entry swept or table dropped)
    /// surfaces as `Cancelled`.
    pub async fn wait(self) -> Delivery {
        match self.receiver.await {
            Ok(delivery) => delivery,
            Err(_) => Err(BridgeError::Cancelled),
        }
    }
}

/// Counters for the correlation table.
#[derive(Debug, Default)]
pub struct TableStats {
    pub registered: AtomicU64,
    pub resolved: AtomicU64,
    pub failed: AtomicU64,
    pub timed_out: AtomicU64,
    pub cancelled: AtomicU64,
    pub rolled_back: AtomicU64,
    pub rejected: AtomicU64,
    pub unknown: AtomicU64,
}

/// Point-in-time copy of [`TableStats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub pending: usize,
    pub registered: u64,
    pub resolved: u64,
    pub failed: u64,
    pub timed_out: u64,
    pub cancelled: u64,
    pub rolled_back: u64,
    pub rejected: u64,
    pub unknown: u64,
}

/// DashMap-backed [`CorrelationStore`].
pub struct CorrelationTable {
    pending: DashMap<CorrelationKey, PendingResponse>,
    /// Occupied slots, reserved before insertion so the limit holds under races.
    slots: AtomicUsize,
    /// 0 means unbounded.
    max_pending: usize,
    default_timeout: Duration,
    next_id: AtomicU64,
    stats: TableStats,
}

impl CorrelationTable {
    pub fn new(default_timeout: Duration, max_pending: usize) -> Self {
        Self {
            pending: DashMap::new(),
            slots: AtomicUsize::new(0),
            max_pending,
            default_timeout,
            next_id: AtomicU64::new(0),
            stats: TableStats::default(),
        }
    }

    /// Unbounded table.
    pub fn unbounded(default_timeout: Duration) -> Self {
        Self::new(default_timeout, 0)
    }

    pub fn max_pending(&self) -> usize {
        self.max_pending
    }

    pub fn stats(&self) -> &TableStats {
        &self.stats
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            pending: self.pending.len(),
            registered: self.stats.registered.load(Ordering::Relaxed),
            resolved: self.stats.resolved.load(Ordering::Relaxed),
            failed: self.stats.failed.load(Ordering::Relaxed),
            timed_out: self.stats.timed_out.load(Ordering::Relaxed),
            cancelled: self.stats.cancelled.load(Ordering::Relaxed),
            rolled_back: self.stats.rolled_back.load(Ordering::Relaxed),
            rejected: self.stats.rejected.load(Ordering::Relaxed),
            unknown: self.stats.unknown.load(Ordering::Relaxed),
        }
    }

    fn reserve_slot(&self) -> Result<(), CorrelationError> {
        if self.max_pending == 0 {
            self.slots.fetch_add(1, Ordering::AcqRel);
            return Ok(());
        }
        self.slots
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |used| {
                (used < self.max_pending).then_some(used + 1)
            })
            .map(|_| ())
            .map_err(|_| CorrelationError::CapacityExceeded(self.max_pending))
    }

    fn release_slot(&self) {
        // Never underflows: every release pairs with a successful reserve
        let _ = self
            .slots
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |used| {
                used.checked_sub(1)
            });
    }

    /// Fail and evict every entry older than its deadline.
    ///
    /// Returns the number of entries removed.
    pub fn remove_expired(&self) -> usize {
        let now = Instant::now();
        let expired: Vec<CorrelationKey> = self
            .pending
            .iter()
            .filter(|entry| now.duration_since(entry.created_at) > entry.timeout)
            .map(|entry| entry.key().clone())
            .collect();

        let mut removed = 0;
        for key in expired {
            // Re-check under the shard lock; a result may have won the race
            let Some((key, pending)) = self.pending.remove_if(&key, |_, p| {
                now.duration_since(p.created_at) > p.timeout
            }) else {
                continue;
            };
            self.release_slot();
            self.stats.timed_out.fetch_add(1, Ordering::Relaxed);
            warn!(
                correlation_key = %key,
                elapsed_ms = pending.created_at.elapsed().as_millis(),
                timeout_ms = pending.timeout.as_millis(),
                "Removing expired pending request"
            );
            let _ = pending.sender.send(Err(BridgeError::Timeout(pending.timeout)));
            removed += 1;
        }
        removed
    }

    /// Fail every pending caller with `Cancelled` (shutdown).
    pub fn fail_all(&self) -> usize {
        let keys: Vec<CorrelationKey> = self.pending.iter().map(|e| e.key().clone()).collect();
        let mut failed = 0;
        for key in keys {
            if let Some((_, pending)) = self.pending.remove(&key) {
                self.release_slot();
                self.stats.cancelled.fetch_add(1, Ordering::Relaxed);
                let _ = pending.sender.send(Err(BridgeError::Cancelled));
                failed += 1;
            }
        }
        if failed > 0 {
            debug!(failed, "Cancelled all pending requests");
        }
        failed
    }
}

impl CorrelationStore for CorrelationTable {
    fn register(
        &self,
        key: CorrelationKey,
        timeout: Option<Duration>,
    ) -> Result<PendingHandle, CorrelationError> {
        if let Err(e) = self.reserve_slot() {
            self.stats.rejected.fetch_add(1, Ordering::Relaxed);
            warn!(correlation_key = %key, limit = self.max_pending, "Pending table full");
            return Err(e);
        }

        let timeout = timeout.unwrap_or(self.default_timeout);
        match self.pending.entry(key.clone()) {
            Entry::Occupied(_) => {
                self.release_slot();
                self.stats.rejected.fetch_add(1, Ordering::Relaxed);
                debug!(correlation_key = %key, "Rejected duplicate correlation key");
                Err(CorrelationError::DuplicateKey(key))
            }
            Entry::Vacant(slot) => {
                let (sender, receiver) = oneshot::channel();
                let id = RegistrationId(self.next_id.fetch_add(1, Ordering::Relaxed));
                slot.insert(PendingResponse {
                    id,
                    sender,
                    created_at: Instant::now(),
                    timeout,
                });
                self.stats.registered.fetch_add(1, Ordering::Relaxed);
                debug!(
                    correlation_key = %key,
                    timeout_ms = timeout.as_millis(),
                    "Registered pending request"
                );
                Ok(PendingHandle {
                    key,
                    id,
                    receiver,
                    timeout,
                })
            }
        }
    }

    fn resolve(&self, key: &CorrelationKey, outcome: Delivery) -> Result<(), CorrelationError> {
        let Some((_, pending)) = self.pending.remove(key) else {
            self.stats.unknown.fetch_add(1, Ordering::Relaxed);
            warn!(
                correlation_key = %key,
                "Result for unknown or expired correlation key"
            );
            return Err(CorrelationError::UnknownKey(key.clone()));
        };
        self.release_slot();

        let is_failure = outcome.is_err();
        let response_time = pending.created_at.elapsed();
        match pending.sender.send(outcome) {
            Ok(()) => {
                let counter = if is_failure {
                    &self.stats.failed
                } else {
                    &self.stats.resolved
                };
                counter.fetch_add(1, Ordering::Relaxed);
                debug!(
                    correlation_key = %key,
                    failed = is_failure,
                    response_time_ms = response_time.as_millis(),
                    "Resolved pending request"
                );
            }
            Err(_) => {
                // Receiver dropped between registration and delivery
                self.stats.cancelled.fetch_add(1, Ordering::Relaxed);
                debug!(correlation_key = %key, "Pending request receiver dropped");
            }
        }
        Ok(())
    }

    fn remove(&self, key: &CorrelationKey, id: RegistrationId, reason: RemovalReason) -> bool {
        if self.pending.remove_if(key, |_, p| p.id == id).is_none() {
            return false;
        }
        self.release_slot();
        let counter = match reason {
            RemovalReason::Rollback => &self.stats.rolled_back,
            RemovalReason::Timeout => &self.stats.timed_out,
            RemovalReason::Disconnected => &self.stats.cancelled,
        };
        counter.fetch_add(1, Ordering::Relaxed);
        debug!(correlation_key = %key, ?reason, "Removed pending request");
        true
    }

    fn contains(&self, key: &CorrelationKey) -> bool {
        self.pending.contains_key(key)
    }

    fn pending_count(&self) -> usize {
        self.pending.len()
    }
}

/// Background task failing expired entries.
pub async fn sweep_task(table: Arc<CorrelationTable>, interval: Duration) {
    let mut sweep_interval = tokio::time::interval(interval);
    sweep_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        sweep_interval.tick().await;
        let removed = table.remove_expired();
        if removed > 0 {
            debug!(removed, "Swept expired pending requests");
        }
    }
}
