//! The process-wide typed event channel.
//!
//! Replaces broadcast/observer signaling with one explicit channel of
//! [`DomainEvent`]. Producers (pairing registry, sync engine, external
//! threshold triggers) publish; the notification router is the standing
//! consumer. Subscribers cancel by dropping their receiver.

use famlink_types::{DomainEvent, UserId};
use tokio::sync::broadcast;

/// Default channel capacity. Slow consumers past this lag and are told
/// how many events they missed.
const DEFAULT_CAPACITY: usize = 256;

/// A cloneable handle to the process-wide domain event channel.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<DomainEvent>,
}

impl EventBus {
    /// Create a bus with the given buffer capacity.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Subscribe to all subsequent domain events.
    pub fn subscribe(&self) -> broadcast::Receiver<DomainEvent> {
        self.tx.subscribe()
    }

    /// Publish an event. Delivery is best-effort: with no live
    /// subscribers the event is dropped.
    pub fn publish(&self, event: DomainEvent) {
        if self.tx.send(event).is_err() {
            tracing::debug!("domain event dropped: no subscribers");
        }
    }

    /// Raise a threshold-based limit warning for a user.
    ///
    /// Entry point for the (external) screen-time collection layer; the
    /// router converts this into a warning notification.
    pub fn raise_warning(
        &self,
        recipient: UserId,
        title: impl Into<String>,
        body: impl Into<String>,
    ) {
        self.publish(DomainEvent::LimitWarning {
            recipient,
            title: title.into(),
            body: body.into(),
        });
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_receive_published_events() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe();

        bus.raise_warning(UserId::new("child-1"), "Time's up", "Daily limit reached");

        let event = rx.recv().await.unwrap();
        assert!(matches!(
            event,
            DomainEvent::LimitWarning { recipient, .. } if recipient == UserId::new("child-1")
        ));
    }

    #[tokio::test]
    async fn publish_without_subscribers_is_harmless() {
        let bus = EventBus::default();
        bus.raise_warning(UserId::new("child-1"), "t", "b");
    }

    #[tokio::test]
    async fn dropped_receiver_cancels_subscription() {
        let bus = EventBus::default();
        let rx = bus.subscribe();
        drop(rx);

        // No panic, event is simply dropped
        bus.raise_warning(UserId::new("child-1"), "t", "b");
    }
}
