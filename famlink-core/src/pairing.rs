//! Pairing code issuance and redemption.
//!
//! The registry owns [`PairingCode`] and [`Relationship`] records. A child
//! device requests a short-lived code, the parent redeems it, and the
//! resulting relationship resolves the shared conversation for both
//! sides.
//!
//! Redemption is race-safe by construction: the store's `consume_code` is
//! a single conditional transition, so two concurrent redemptions of the
//! same code produce exactly one relationship; the loser sees
//! [`PairingError::AlreadyConsumed`]. Consumption happens before the
//! relationship insert, which means a code that loses the separate
//! child-uniqueness race is spent. That matches the single-use contract:
//! a lost race is resolved by requesting a fresh code, never by retrying
//! the same one.

use crate::config::PairingConfig;
use crate::error::{PairingError, PairingResult};
use crate::events::EventBus;
use crate::store::PairingStore;
use dashmap::DashMap;
use famlink_types::{
    now_millis, ConversationId, DomainEvent, PairCode, PairingCode, Relationship, RelationshipId,
    RosterEvent, StoreError, UserId,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

/// Code characters: uppercase alphanumeric.
const CODE_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Buffer size for per-parent roster channels.
const ROSTER_CHANNEL_CAPACITY: usize = 64;

/// Issues and redeems pairing codes; owns relationship records.
pub struct PairingRegistry {
    store: Arc<dyn PairingStore>,
    bus: EventBus,
    config: PairingConfig,
    rosters: DashMap<UserId, broadcast::Sender<RosterEvent>>,
}

impl PairingRegistry {
    /// Create a registry over the given store, publishing domain events
    /// on `bus`.
    pub fn new(store: Arc<dyn PairingStore>, bus: EventBus, config: PairingConfig) -> Self {
        Self {
            store,
            bus,
            config,
            rosters: DashMap::new(),
        }
    }

    /// Issue a fresh pairing code for `issuer`, revoking any outstanding
    /// unconsumed code first so at most one is redeemable at a time.
    ///
    /// Fails with [`PairingError::CodeSpace`] if a unique code value
    /// cannot be found within the configured number of attempts.
    pub async fn issue_code(&self, issuer: &UserId) -> PairingResult<PairingCode> {
        self.store.revoke_unconsumed(issuer).await?;

        let now = now_millis();
        let ttl_ms = self.config.code_ttl_secs * 1_000;
        let attempts = self.config.max_issue_attempts.max(1);

        for attempt in 1..=attempts {
            let record = PairingCode {
                code: generate_code(self.config.code_length),
                issuer_id: issuer.clone(),
                created_at: now,
                expires_at: now + ttl_ms,
                consumed: false,
            };

            match self.store.insert_code(record.clone()).await {
                Ok(()) => {
                    tracing::info!(
                        "issued pairing code for {} (expires in {}s)",
                        issuer,
                        self.config.code_ttl_secs
                    );
                    return Ok(record);
                }
                Err(StoreError::Conflict(_)) => {
                    tracing::debug!("pairing code collision on attempt {}", attempt);
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(PairingError::CodeSpace { attempts })
    }

    /// Redeem a code on behalf of the parent, creating an active
    /// relationship with the issuing child device.
    ///
    /// `device_name` labels the child device on the parent's roster.
    pub async fn redeem_code(
        &self,
        code: &PairCode,
        parent: &UserId,
        device_name: &str,
    ) -> PairingResult<Relationship> {
        let record = self
            .store
            .find_code(code)
            .await?
            .ok_or(PairingError::UnknownCode)?;

        if record.consumed {
            return Err(PairingError::AlreadyConsumed);
        }
        if record.is_expired(now_millis()) {
            return Err(PairingError::Expired);
        }

        // The conditional transition. Everything before this line was a
        // courtesy check; this is where a concurrent redemption loses.
        let record = match self.store.consume_code(code).await {
            Ok(record) => record,
            Err(StoreError::NotFound(_)) => return Err(PairingError::UnknownCode),
            Err(StoreError::Conflict(_)) => return Err(PairingError::AlreadyConsumed),
            Err(e) => return Err(e.into()),
        };

        let relationship = Relationship {
            id: RelationshipId::new(),
            parent_id: parent.clone(),
            child_id: record.issuer_id.clone(),
            device_name: device_name.to_string(),
            pair_code: code.clone(),
            paired_at: now_millis(),
            is_active: true,
        };

        match self.store.insert_relationship(relationship.clone()).await {
            Ok(()) => {}
            Err(StoreError::Conflict(_)) => return Err(PairingError::ChildAlreadyPaired),
            Err(e) => return Err(e.into()),
        }

        tracing::info!(
            "paired child {} with parent {} as \"{}\"",
            relationship.child_id,
            relationship.parent_id,
            relationship.device_name
        );

        self.publish_roster(parent, RosterEvent::Paired(relationship.clone()));
        self.bus.publish(DomainEvent::CodeRedeemed {
            relationship: relationship.clone(),
        });

        Ok(relationship)
    }

    /// Unlink a relationship. Idempotent: unpairing an already-inactive
    /// or unknown relationship succeeds silently.
    ///
    /// Dependent state cascades from here: the presence tracker drops the
    /// heartbeat at its next poll, and any live typing lease expires at
    /// the next sweep since the conversation no longer resolves.
    pub async fn unpair(&self, id: &RelationshipId) -> PairingResult<()> {
        match self.store.deactivate_relationship(id).await? {
            Some(relationship) => {
                tracing::info!(
                    "unpaired child {} from parent {}",
                    relationship.child_id,
                    relationship.parent_id
                );
                self.publish_roster(
                    &relationship.parent_id,
                    RosterEvent::Unpaired(relationship.clone()),
                );
                self.bus
                    .publish(DomainEvent::RelationshipEnded { relationship });
            }
            None => {
                tracing::debug!("unpair: relationship {} already inactive or unknown", id);
            }
        }
        Ok(())
    }

    /// Snapshot of the parent's active child relationships, oldest first.
    ///
    /// Live updates arrive via [`PairingRegistry::subscribe_roster`], not
    /// by re-polling.
    pub async fn active_children(&self, parent: &UserId) -> PairingResult<Vec<Relationship>> {
        Ok(self.store.active_for_parent(parent).await?)
    }

    /// Subscribe to roster changes for a parent. Cancel by dropping the
    /// receiver.
    pub fn subscribe_roster(&self, parent: &UserId) -> broadcast::Receiver<RosterEvent> {
        self.rosters
            .entry(parent.clone())
            .or_insert_with(|| broadcast::channel(ROSTER_CHANNEL_CAPACITY).0)
            .subscribe()
    }

    /// Resolve a conversation to its active relationship, if any.
    pub async fn resolve_conversation(
        &self,
        conversation: &ConversationId,
    ) -> PairingResult<Option<Relationship>> {
        Ok(self.store.active_for_conversation(conversation).await?)
    }

    /// Look up a relationship by id (active or not).
    pub async fn relationship(
        &self,
        id: &RelationshipId,
    ) -> PairingResult<Option<Relationship>> {
        Ok(self.store.relationship(id).await?)
    }

    fn publish_roster(&self, parent: &UserId, event: RosterEvent) {
        if let Some(tx) = self.rosters.get(parent) {
            let _ = tx.send(event);
        }
    }
}

impl std::fmt::Debug for PairingRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PairingRegistry")
            .field("config", &self.config)
            .field("roster_channels", &self.rosters.len())
            .finish_non_exhaustive()
    }
}

/// Generate a random code of `length` characters (clamped to 6-8).
fn generate_code(length: usize) -> PairCode {
    let length = length.clamp(6, 8);
    let mut bytes = vec![0u8; length];
    getrandom::getrandom(&mut bytes).expect("getrandom failed");

    let value: String = bytes
        .iter()
        .map(|b| CODE_ALPHABET[(*b as usize) % CODE_ALPHABET.len()] as char)
        .collect();

    PairCode::new(value).expect("generated code is always valid")
}

/// Spawn a background task that deletes expired pairing codes.
///
/// Returns a handle that can be used to abort the task.
pub fn spawn_code_sweeper(
    store: Arc<dyn PairingStore>,
    interval: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        tracing::info!("pairing code sweeper started (interval: {:?})", interval);
        let mut timer = tokio::time::interval(interval);

        loop {
            timer.tick().await;

            match store.purge_expired_codes(now_millis()).await {
                Ok(0) => tracing::debug!("code sweep: nothing expired"),
                Ok(purged) => tracing::info!("code sweep: removed {} expired codes", purged),
                Err(e) => tracing::warn!("code sweep failed: {}", e),
            }
        }
    })
}
