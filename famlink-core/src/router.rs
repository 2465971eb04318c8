//! Notification routing.
//!
//! The router is the standing consumer of the domain event bus. It
//! converts message arrivals (for the peer, never the sender), unlinks,
//! and limit warnings into notification records, publishes them to
//! per-recipient live subscriptions, and requests a best-effort external
//! push keyed by the recipient's device token. Push failures are logged
//! and dropped; the durable record is the source of truth.
//!
//! Notification records are mutated only by their recipient. The unread
//! count is derived from the records on every read, never cached, so it
//! cannot drift from the store.

use crate::events::EventBus;
use crate::store::NotificationStore;
use async_trait::async_trait;
use dashmap::DashMap;
use famlink_types::{
    now_millis, DomainEvent, EpochMillis, MessageKind, Notification, NotificationId,
    NotificationKind, StoreResult, UserId,
};
use std::sync::Arc;
use tokio::sync::broadcast;

/// Buffer size for per-recipient notification channels.
const NOTIFY_CHANNEL_CAPACITY: usize = 64;

/// A push dispatch request for the external transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushRequest {
    /// Opaque device token registered by the recipient's client.
    pub device_token: String,
    /// Notification headline.
    pub title: String,
    /// Notification body.
    pub body: String,
}

/// Error from the external push transport.
#[derive(Debug, thiserror::Error)]
pub enum PushError {
    /// The transport rejected or failed the dispatch attempt.
    #[error("push dispatch failed: {0}")]
    Dispatch(String),
}

/// External push transport. Fire-and-forget: the core never retries and
/// never surfaces a failed dispatch to the originating user.
#[async_trait]
pub trait PushTransport: Send + Sync {
    /// Attempt one delivery to a device token.
    async fn dispatch(&self, request: PushRequest) -> Result<(), PushError>;
}

/// A transport that drops every dispatch. Useful for tests and for
/// deployments without a push provider.
#[derive(Debug, Default)]
pub struct NoopPush;

#[async_trait]
impl PushTransport for NoopPush {
    async fn dispatch(&self, _request: PushRequest) -> Result<(), PushError> {
        Ok(())
    }
}

/// Converts domain events into the notification feed.
pub struct NotificationRouter {
    store: Arc<dyn NotificationStore>,
    push: Arc<dyn PushTransport>,
    tokens: DashMap<UserId, String>,
    subscribers: DashMap<UserId, broadcast::Sender<Notification>>,
}

impl NotificationRouter {
    /// Create a router over the given store and push transport.
    pub fn new(store: Arc<dyn NotificationStore>, push: Arc<dyn PushTransport>) -> Self {
        Self {
            store,
            push,
            tokens: DashMap::new(),
            subscribers: DashMap::new(),
        }
    }

    /// Register the device token push dispatches for `user` are keyed by.
    pub fn register_token(&self, user: &UserId, token: impl Into<String>) {
        self.tokens.insert(user.clone(), token.into());
    }

    /// Remove a user's device token; subsequent dispatches are skipped.
    pub fn remove_token(&self, user: &UserId) {
        self.tokens.remove(user);
    }

    /// Subscribe to new notifications for a recipient. Cancel by dropping
    /// the receiver.
    pub fn subscribe(&self, recipient: &UserId) -> broadcast::Receiver<Notification> {
        self.subscribers
            .entry(recipient.clone())
            .or_insert_with(|| broadcast::channel(NOTIFY_CHANNEL_CAPACITY).0)
            .subscribe()
    }

    /// The recipient's notifications, newest first.
    pub async fn notifications(&self, recipient: &UserId) -> StoreResult<Vec<Notification>> {
        self.store.for_recipient(recipient).await
    }

    /// The recipient's unread count, derived from the records.
    pub async fn unread_count(&self, recipient: &UserId) -> StoreResult<u64> {
        self.store.unread_count(recipient).await
    }

    /// Mark one of the recipient's notifications read.
    pub async fn mark_read(
        &self,
        id: &NotificationId,
        recipient: &UserId,
    ) -> StoreResult<Notification> {
        self.store.mark_read(id, recipient, now_millis()).await
    }

    /// Mark all of the recipient's notifications read. Returns how many
    /// changed.
    pub async fn mark_all_read(&self, recipient: &UserId) -> StoreResult<u64> {
        self.store.mark_all_read(recipient, now_millis()).await
    }

    /// Delete one of the recipient's notifications.
    pub async fn delete(&self, id: &NotificationId, recipient: &UserId) -> StoreResult<()> {
        self.store.delete(id, recipient).await
    }

    /// Convert one domain event into a notification record.
    ///
    /// Returns the stored record, or `None` for events that produce no
    /// notification (a message observed by its own sender).
    pub async fn handle_event(&self, event: DomainEvent) -> StoreResult<Option<Notification>> {
        let Some(notification) = notification_from_event(&event, now_millis()) else {
            return Ok(None);
        };

        self.store.insert(notification.clone()).await?;
        tracing::debug!(
            "notification {} for {} ({:?})",
            notification.id,
            notification.recipient_id,
            notification.kind
        );

        if let Some(tx) = self.subscribers.get(&notification.recipient_id) {
            let _ = tx.send(notification.clone());
        }

        self.dispatch_push(&notification).await;
        Ok(Some(notification))
    }

    /// Best-effort push dispatch. No retry, no error surfaced.
    async fn dispatch_push(&self, notification: &Notification) {
        let Some(token) = self
            .tokens
            .get(&notification.recipient_id)
            .map(|t| t.value().clone())
        else {
            tracing::debug!(
                "no device token for {}, skipping push",
                notification.recipient_id
            );
            return;
        };

        let request = PushRequest {
            device_token: token,
            title: notification.title.clone(),
            body: notification.body.clone(),
        };

        if let Err(e) = self.push.dispatch(request).await {
            tracing::warn!(
                "push to {} failed (record kept): {}",
                notification.recipient_id,
                e
            );
        }
    }
}

impl std::fmt::Debug for NotificationRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationRouter")
            .field("tokens", &self.tokens.len())
            .field("subscriber_channels", &self.subscribers.len())
            .finish_non_exhaustive()
    }
}

/// Pure mapping from a domain event to a notification record.
fn notification_from_event(event: &DomainEvent, now: EpochMillis) -> Option<Notification> {
    let (recipient, kind, title, body) = match event {
        DomainEvent::MessagePosted { message, recipient } => {
            if message.sender_id == *recipient {
                return None;
            }
            let title = match message.kind {
                MessageKind::Reminder => "Reminder",
                MessageKind::Encouragement => "Encouragement",
                MessageKind::Warning => "Warning",
                MessageKind::Text | MessageKind::Custom => "New message",
            };
            (
                recipient.clone(),
                NotificationKind::Message,
                title.to_string(),
                message.text.clone(),
            )
        }
        DomainEvent::CodeRedeemed { relationship } => (
            relationship.child_id.clone(),
            NotificationKind::Pairing,
            "Device paired".to_string(),
            format!("Connected as \"{}\"", relationship.device_name),
        ),
        DomainEvent::RelationshipEnded { relationship } => (
            relationship.child_id.clone(),
            NotificationKind::Unlink,
            "Device unlinked".to_string(),
            "This device is no longer connected to a parent account".to_string(),
        ),
        DomainEvent::LimitWarning {
            recipient,
            title,
            body,
        } => (
            recipient.clone(),
            NotificationKind::Warning,
            title.clone(),
            body.clone(),
        ),
    };

    Some(Notification {
        id: NotificationId::new(),
        recipient_id: recipient,
        kind,
        title,
        body,
        created_at: now,
        read_at: None,
    })
}

/// Spawn the router's event loop over the bus.
///
/// Consumes the bus in order; cross-component consistency stays eventual.
/// Returns a handle that can be used to abort the task.
pub fn spawn_router(
    router: Arc<NotificationRouter>,
    bus: &EventBus,
) -> tokio::task::JoinHandle<()> {
    let mut events = bus.subscribe();
    tokio::spawn(async move {
        tracing::info!("notification router started");
        loop {
            match events.recv().await {
                Ok(event) => {
                    if let Err(e) = router.handle_event(event).await {
                        tracing::warn!("notification routing failed: {}", e);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    tracing::warn!("notification router lagged, missed {} events", missed);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}
