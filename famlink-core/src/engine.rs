//! The message store and sync engine.
//!
//! One ordered, append-mostly log per conversation with many independent
//! subscribers. `connect` hands out a [`ConversationFeed`]: an ordered
//! snapshot plus a live event stream, so a late subscriber sees the full
//! backlog in exactly the order every earlier subscriber saw it. Mutations
//! (`send`, `mark_delivered`, `mark_read`, `set_typing`) go through the
//! store and are republished to every feed.
//!
//! Typing indicators are liveness leases held in memory, never persisted.
//! The sweeper expires any lease that outlives the debounce window and
//! publishes the implicit `isTyping=false`, so an unclean client
//! disconnect cannot leave a stuck indicator.

use crate::config::TypingConfig;
use crate::error::{FeedError, FeedResult, SendError, SendResult};
use crate::events::EventBus;
use crate::pairing::PairingRegistry;
use crate::retry::{self, RetryPolicy};
use crate::store::{MessageDraft, MessageLog};
use dashmap::DashMap;
use famlink_types::{
    now_millis, ConversationId, DomainEvent, EpochMillis, FeedEvent, Message, MessageId,
    MessageKind, Relationship, Seq, StoreError, StoreResult, TypingState, UserId,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

/// Buffer size for per-conversation feed channels.
const FEED_CHANNEL_CAPACITY: usize = 256;

/// Message persistence plus live fan-out for conversations.
pub struct SyncEngine {
    log: Arc<dyn MessageLog>,
    registry: Arc<PairingRegistry>,
    bus: EventBus,
    retry: RetryPolicy,
    debounce_ms: u64,
    feeds: DashMap<ConversationId, broadcast::Sender<FeedEvent>>,
    typing: DashMap<(ConversationId, UserId), TypingState>,
}

impl SyncEngine {
    /// Create an engine over the given log. Conversations are resolved
    /// through the pairing registry; message arrivals are published on
    /// `bus`.
    pub fn new(
        log: Arc<dyn MessageLog>,
        registry: Arc<PairingRegistry>,
        bus: EventBus,
        typing: &TypingConfig,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            log,
            registry,
            bus,
            retry,
            debounce_ms: typing.debounce_ms,
            feeds: DashMap::new(),
            typing: DashMap::new(),
        }
    }

    /// Subscribe to a conversation.
    ///
    /// The returned feed carries the full ordered history plus every
    /// subsequent event. Must be called before `send`/`set_typing` are
    /// meaningful for this peer; drop or [`ConversationFeed::disconnect`]
    /// to release the subscription.
    pub async fn connect(&self, conversation: &ConversationId) -> FeedResult<ConversationFeed> {
        self.resolve_active(conversation).await?;

        // Subscribe before snapshotting so nothing falls between the
        // two; the feed dedupes the overlap by sequence.
        let rx = self
            .feeds
            .entry(conversation.clone())
            .or_insert_with(|| broadcast::channel(FEED_CHANNEL_CAPACITY).0)
            .subscribe();
        let snapshot = self.log.snapshot(conversation).await?;
        let max_seen = snapshot.last().map(|m| m.seq).unwrap_or_else(Seq::zero);

        tracing::debug!(
            "feed connected: {} ({} messages in backlog)",
            conversation,
            snapshot.len()
        );

        Ok(ConversationFeed {
            conversation_id: conversation.clone(),
            snapshot,
            max_seen,
            rx: Some(rx),
        })
    }

    /// Append a message to a conversation.
    ///
    /// Fails or succeeds atomically: observers either see the stored
    /// message with its server-assigned ordering or nothing. Transient
    /// store failures are retried with bounded backoff here; terminal
    /// failure preserves the draft so the caller can re-trigger.
    pub async fn send(
        &self,
        conversation: &ConversationId,
        sender: &UserId,
        text: &str,
        kind: MessageKind,
    ) -> SendResult<Message> {
        if text.trim().is_empty() {
            return Err(SendError::EmptyText);
        }

        let relationship = self
            .resolve_active(conversation)
            .await
            .map_err(send_error_from_feed)?;
        let recipient = relationship
            .peer_of(sender)
            .ok_or(SendError::NotParticipant)?
            .clone();

        let draft = MessageDraft {
            conversation_id: conversation.clone(),
            sender_id: sender.clone(),
            text: text.to_string(),
            kind,
        };

        let appended = retry::with_backoff(&self.retry, || {
            let log = self.log.clone();
            let draft = draft.clone();
            async move { log.append(draft).await }
        })
        .await;

        let message = match appended {
            Ok(message) => message,
            Err((attempts, StoreError::Unavailable(reason))) => {
                return Err(SendError::RetriesExhausted {
                    attempts,
                    draft,
                    source: StoreError::Unavailable(reason),
                });
            }
            Err((_, e)) => return Err(SendError::Store(e)),
        };

        tracing::debug!(
            "message {} appended to {} at seq {}",
            message.id,
            conversation,
            message.seq
        );

        self.publish_feed(conversation, FeedEvent::Message(message.clone()));
        self.bus.publish(DomainEvent::MessagePosted {
            message: message.clone(),
            recipient,
        });

        Ok(message)
    }

    /// Record that the recipient's client received a message.
    ///
    /// Monotonic: a second call keeps the first timestamp.
    pub async fn mark_delivered(&self, id: &MessageId) -> StoreResult<Message> {
        let message = self.log.set_delivered(id, now_millis()).await?;
        self.publish_feed(
            &message.conversation_id,
            FeedEvent::MessageUpdated(message.clone()),
        );
        Ok(message)
    }

    /// Record that the recipient read a message.
    ///
    /// Setting read on an undelivered message is not an error; delivery
    /// is set implicitly first, so `read` always implies `delivered`.
    pub async fn mark_read(&self, id: &MessageId) -> StoreResult<Message> {
        let message = self.log.set_read(id, now_millis()).await?;
        self.publish_feed(
            &message.conversation_id,
            FeedEvent::MessageUpdated(message.clone()),
        );
        Ok(message)
    }

    /// Upsert a typing lease for a user in a conversation.
    ///
    /// `is_typing = true` must be renewed within the debounce window or
    /// the sweeper publishes the implicit stop. Each renewal resets the
    /// window.
    pub async fn set_typing(
        &self,
        conversation: &ConversationId,
        user: &UserId,
        is_typing: bool,
    ) -> FeedResult<()> {
        let relationship = self.resolve_active(conversation).await?;
        if relationship.peer_of(user).is_none() {
            return Err(FeedError::NotParticipant);
        }

        let state = TypingState {
            conversation_id: conversation.clone(),
            user_id: user.clone(),
            is_typing,
            updated_at: now_millis(),
        };

        let key = (conversation.clone(), user.clone());
        if is_typing {
            self.typing.insert(key, state.clone());
        } else {
            self.typing.remove(&key);
        }

        self.publish_feed(conversation, FeedEvent::Typing(state));
        Ok(())
    }

    /// Expire typing leases older than the debounce window at `now`.
    ///
    /// Publishes the implicit `isTyping=false` for each expired lease and
    /// returns them. Called by the sweeper task; exposed for direct use
    /// in tests and embedders with their own scheduling.
    pub fn sweep_typing(&self, now: EpochMillis) -> Vec<TypingState> {
        let debounce = self.debounce_ms;
        let stale: Vec<(ConversationId, UserId)> = self
            .typing
            .iter()
            .filter(|entry| now.saturating_sub(entry.value().updated_at) >= debounce)
            .map(|entry| entry.key().clone())
            .collect();

        let mut expired = Vec::new();
        for key in stale {
            // Re-check under the entry lock so a renewal that raced the
            // scan wins.
            let removed = self
                .typing
                .remove_if(&key, |_, state| {
                    now.saturating_sub(state.updated_at) >= debounce
                })
                .is_some();
            if removed {
                let state = TypingState {
                    conversation_id: key.0.clone(),
                    user_id: key.1.clone(),
                    is_typing: false,
                    updated_at: now,
                };
                self.publish_feed(&key.0, FeedEvent::Typing(state.clone()));
                expired.push(state);
            }
        }
        expired
    }

    /// Current unexpired typing leases for a conversation.
    pub fn typing_states(&self, conversation: &ConversationId) -> Vec<TypingState> {
        self.typing
            .iter()
            .filter(|entry| entry.key().0 == *conversation)
            .map(|entry| entry.value().clone())
            .collect()
    }

    async fn resolve_active(
        &self,
        conversation: &ConversationId,
    ) -> Result<Relationship, FeedError> {
        match self.registry.resolve_conversation(conversation).await {
            Ok(Some(relationship)) => Ok(relationship),
            Ok(None) => Err(FeedError::UnknownConversation),
            Err(crate::error::PairingError::Store(e)) => Err(FeedError::Store(e)),
            Err(_) => Err(FeedError::UnknownConversation),
        }
    }

    fn publish_feed(&self, conversation: &ConversationId, event: FeedEvent) {
        if let Some(tx) = self.feeds.get(conversation) {
            let _ = tx.send(event);
        }
    }
}

impl std::fmt::Debug for SyncEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncEngine")
            .field("debounce_ms", &self.debounce_ms)
            .field("feeds", &self.feeds.len())
            .field("typing_leases", &self.typing.len())
            .finish_non_exhaustive()
    }
}

fn send_error_from_feed(e: FeedError) -> SendError {
    match e {
        FeedError::UnknownConversation => SendError::UnknownConversation,
        FeedError::NotParticipant => SendError::NotParticipant,
        FeedError::Store(s) => SendError::Store(s),
    }
}

/// A live subscription to one conversation.
///
/// Holds the ordered backlog at connect time; [`next_event`] yields
/// everything after it, deduplicated by sequence across the
/// snapshot/stream boundary.
///
/// [`next_event`]: ConversationFeed::next_event
pub struct ConversationFeed {
    conversation_id: ConversationId,
    snapshot: Vec<Message>,
    max_seen: Seq,
    rx: Option<broadcast::Receiver<FeedEvent>>,
}

impl ConversationFeed {
    /// The conversation this feed observes.
    pub fn conversation_id(&self) -> &ConversationId {
        &self.conversation_id
    }

    /// The ordered message history as of connect.
    pub fn snapshot(&self) -> &[Message] {
        &self.snapshot
    }

    /// Await the next feed event.
    ///
    /// Returns `None` once disconnected. A subscriber that falls behind
    /// the channel buffer skips the missed events with a warning rather
    /// than failing the feed.
    pub async fn next_event(&mut self) -> Option<FeedEvent> {
        loop {
            let rx = self.rx.as_mut()?;
            match rx.recv().await {
                Ok(FeedEvent::Message(message)) => {
                    if message.seq <= self.max_seen {
                        continue; // already present in the snapshot
                    }
                    self.max_seen = message.seq;
                    return Some(FeedEvent::Message(message));
                }
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    tracing::warn!(
                        "feed for {} lagged, skipped {} events",
                        self.conversation_id,
                        missed
                    );
                }
                Err(broadcast::error::RecvError::Closed) => {
                    self.rx = None;
                    return None;
                }
            }
        }
    }

    /// Release the subscription. Idempotent; further calls and further
    /// `next_event` polls are no-ops.
    pub fn disconnect(&mut self) {
        self.rx = None;
    }

    /// Whether the feed still receives live events.
    pub fn is_connected(&self) -> bool {
        self.rx.is_some()
    }
}

impl std::fmt::Debug for ConversationFeed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConversationFeed")
            .field("conversation_id", &self.conversation_id)
            .field("snapshot_len", &self.snapshot.len())
            .field("connected", &self.is_connected())
            .finish()
    }
}

/// Spawn the typing lease sweeper.
///
/// Returns a handle that can be used to abort the task.
pub fn spawn_typing_sweeper(
    engine: Arc<SyncEngine>,
    interval: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        tracing::info!("typing sweeper started (interval: {:?})", interval);
        let mut timer = tokio::time::interval(interval);

        loop {
            timer.tick().await;

            let expired = engine.sweep_typing(now_millis());
            if !expired.is_empty() {
                tracing::debug!("typing sweep: expired {} leases", expired.len());
            }
        }
    })
}
