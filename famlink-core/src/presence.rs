//! Device presence derived from heartbeats.
//!
//! Paired devices report heartbeats at their own cadence; the tracker
//! never pushes to devices, it only ages stored timestamps. Online-ness
//! is a pure function of heartbeat recency against the configured
//! threshold, re-evaluated on every scheduled poll, so staleness is
//! bounded by the poll interval rather than by event delivery.

use crate::config::PresenceConfig;
use crate::retry::{self, RetryPolicy};
use crate::store::PairingStore;
use dashmap::DashMap;
use famlink_types::{
    now_millis, DeviceHeartbeat, DevicePresence, EpochMillis, RelationshipId, StoreResult,
};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

#[derive(Debug, Clone, Copy)]
struct HeartbeatEntry {
    last_seen_at: Option<EpochMillis>,
    missed: u32,
}

/// Tracks heartbeats and derives per-device presence.
pub struct PresenceTracker {
    store: Arc<dyn PairingStore>,
    threshold_ms: u64,
    heartbeats: DashMap<RelationshipId, HeartbeatEntry>,
    snapshot_tx: watch::Sender<Vec<DevicePresence>>,
}

impl PresenceTracker {
    /// Create a tracker over the relationship store.
    pub fn new(store: Arc<dyn PairingStore>, config: &PresenceConfig) -> Self {
        let (snapshot_tx, _) = watch::channel(Vec::new());
        Self {
            store,
            threshold_ms: config.offline_threshold_secs * 1_000,
            heartbeats: DashMap::new(),
            snapshot_tx,
        }
    }

    /// Record a heartbeat for a relationship's device.
    ///
    /// Resets the missed counter; the next poll derives the device as
    /// online.
    pub fn record_heartbeat(&self, id: &RelationshipId) {
        let now = now_millis();
        self.heartbeats.insert(
            *id,
            HeartbeatEntry {
                last_seen_at: Some(now),
                missed: 0,
            },
        );
        tracing::debug!("heartbeat for relationship {}", id);
    }

    /// The stored heartbeat for a relationship, if the device has ever
    /// reported.
    pub fn heartbeat(&self, id: &RelationshipId) -> Option<DeviceHeartbeat> {
        self.heartbeats.get(id).and_then(|entry| {
            entry.last_seen_at.map(|last_seen_at| DeviceHeartbeat {
                relationship_id: *id,
                last_seen_at,
            })
        })
    }

    /// Run one presence evaluation at the given instant.
    ///
    /// Refreshes the active relationship set (dropping heartbeats of
    /// unpaired relationships, the cascade), recomputes online-ness, and
    /// increments the missed counter for every stale device. Publishes
    /// the result on the watch channel and returns it.
    pub async fn poll_once(&self, now: EpochMillis) -> StoreResult<Vec<DevicePresence>> {
        let active = self.store.active_relationships().await?;
        let active_ids: HashSet<RelationshipId> = active.iter().map(|r| r.id).collect();
        self.heartbeats.retain(|id, _| active_ids.contains(id));

        let mut presences = Vec::with_capacity(active.len());
        for relationship in active {
            let mut entry = self
                .heartbeats
                .entry(relationship.id)
                .or_insert(HeartbeatEntry {
                    last_seen_at: None,
                    missed: 0,
                });

            let online = is_online(entry.last_seen_at, now, self.threshold_ms);
            if !online {
                entry.missed = entry.missed.saturating_add(1);
            }

            presences.push(DevicePresence {
                relationship_id: relationship.id,
                child_id: relationship.child_id,
                device_name: relationship.device_name,
                is_online: online,
                missed_heartbeats: entry.missed,
                last_seen_at: entry.last_seen_at,
            });
        }

        self.snapshot_tx.send_replace(presences.clone());
        Ok(presences)
    }

    /// The most recently published presence snapshot.
    pub fn snapshot(&self) -> Vec<DevicePresence> {
        self.snapshot_tx.borrow().clone()
    }

    /// Subscribe to presence snapshots. The receiver always holds the
    /// latest value; cancel by dropping it.
    pub fn subscribe(&self) -> watch::Receiver<Vec<DevicePresence>> {
        self.snapshot_tx.subscribe()
    }
}

impl std::fmt::Debug for PresenceTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PresenceTracker")
            .field("threshold_ms", &self.threshold_ms)
            .field("tracked", &self.heartbeats.len())
            .finish_non_exhaustive()
    }
}

/// Whether a heartbeat at `last_seen_at` counts as online at `now`.
fn is_online(last_seen_at: Option<EpochMillis>, now: EpochMillis, threshold_ms: u64) -> bool {
    match last_seen_at {
        Some(last) => now.saturating_sub(last) < threshold_ms,
        None => false,
    }
}

/// Spawn the scheduled presence poll.
///
/// Transient store failures are retried with bounded backoff inside each
/// tick; a tick that still fails is logged and the next tick tries again.
/// Returns a handle that can be used to abort the task.
pub fn spawn_presence_task(
    tracker: Arc<PresenceTracker>,
    interval: Duration,
    policy: RetryPolicy,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        tracing::info!("presence poll started (interval: {:?})", interval);
        let mut timer = tokio::time::interval(interval);

        loop {
            timer.tick().await;

            let result = retry::with_backoff(&policy, || {
                let tracker = tracker.clone();
                async move { tracker.poll_once(now_millis()).await }
            })
            .await;

            match result {
                Ok(presences) => {
                    tracing::debug!("presence poll: {} active devices", presences.len())
                }
                Err((attempts, e)) => {
                    tracing::warn!("presence poll failed after {} attempts: {}", attempts, e)
                }
            }
        }
    })
}
