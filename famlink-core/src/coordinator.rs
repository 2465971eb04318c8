//! Process-start wiring for the coordination core.
//!
//! Each component is instantiated exactly once and handed to its
//! consumers by `Arc`: dependency injection instead of ambient
//! singletons. The coordinator also owns the background tasks (router
//! loop, presence poll, typing sweeper, code sweeper) and aborts them on
//! shutdown or drop.

use crate::config::CoreConfig;
use crate::engine::{spawn_typing_sweeper, SyncEngine};
use crate::events::EventBus;
use crate::pairing::{spawn_code_sweeper, PairingRegistry};
use crate::presence::{spawn_presence_task, PresenceTracker};
use crate::retry::RetryPolicy;
use crate::router::{spawn_router, NotificationRouter, PushTransport};
use crate::store::{MemoryStore, MessageLog, NotificationStore, PairingStore};
use std::sync::Arc;
use std::time::Duration;

/// The assembled coordination core.
pub struct Coordinator {
    /// The process-wide domain event channel.
    pub bus: EventBus,
    /// Pairing code issuance and relationship records.
    pub registry: Arc<PairingRegistry>,
    /// Conversations, feeds, and typing state.
    pub engine: Arc<SyncEngine>,
    /// Heartbeats and derived presence.
    pub presence: Arc<PresenceTracker>,
    /// The notification feed.
    pub router: Arc<NotificationRouter>,
    tasks: Vec<tokio::task::JoinHandle<()>>,
}

impl Coordinator {
    /// Assemble the core over an in-memory store and start its background
    /// tasks. Must be called within a tokio runtime.
    pub fn start(config: CoreConfig, push: Arc<dyn PushTransport>) -> Self {
        Self::with_store(config, Arc::new(MemoryStore::new()), push)
    }

    /// Assemble the core over any backend that implements all three
    /// storage seams.
    pub fn with_store<S>(config: CoreConfig, store: Arc<S>, push: Arc<dyn PushTransport>) -> Self
    where
        S: PairingStore + MessageLog + NotificationStore + 'static,
    {
        let bus = EventBus::default();
        let retry = RetryPolicy::from_config(&config.retry);

        let pairing_store: Arc<dyn PairingStore> = store.clone();
        let message_log: Arc<dyn MessageLog> = store.clone();
        let notification_store: Arc<dyn NotificationStore> = store;

        let poll_interval = Duration::from_secs(config.presence.poll_interval_secs);
        let sweep_interval = Duration::from_millis(config.typing.sweep_interval_ms);
        let code_sweep_interval = Duration::from_secs(config.pairing.sweep_interval_secs);

        let registry = Arc::new(PairingRegistry::new(
            pairing_store.clone(),
            bus.clone(),
            config.pairing,
        ));
        let engine = Arc::new(SyncEngine::new(
            message_log,
            registry.clone(),
            bus.clone(),
            &config.typing,
            retry.clone(),
        ));
        let presence = Arc::new(PresenceTracker::new(pairing_store.clone(), &config.presence));
        let router = Arc::new(NotificationRouter::new(notification_store, push));

        let tasks = vec![
            spawn_router(router.clone(), &bus),
            spawn_presence_task(presence.clone(), poll_interval, retry),
            spawn_typing_sweeper(engine.clone(), sweep_interval),
            spawn_code_sweeper(pairing_store, code_sweep_interval),
        ];

        tracing::info!("coordination core started ({} background tasks)", tasks.len());

        Self {
            bus,
            registry,
            engine,
            presence,
            router,
            tasks,
        }
    }

    /// Abort the background tasks. Component handles stay usable for
    /// direct calls; only the scheduled work stops.
    pub fn shutdown(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
    }
}

impl Drop for Coordinator {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for Coordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Coordinator")
            .field("tasks", &self.tasks.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::router::NoopPush;
    use famlink_types::{MessageKind, UserId};

    #[tokio::test]
    async fn assembled_core_pairs_and_messages() {
        let mut core = Coordinator::start(CoreConfig::default(), Arc::new(NoopPush));

        let child = UserId::new("child-1");
        let parent = UserId::new("parent-1");
        let code = core.registry.issue_code(&child).await.unwrap();
        let relationship = core
            .registry
            .redeem_code(&code.code, &parent, "phone")
            .await
            .unwrap();

        let sent = core
            .engine
            .send(
                &relationship.conversation_id(),
                &parent,
                "hello",
                MessageKind::Text,
            )
            .await
            .unwrap();
        assert_eq!(sent.text, "hello");

        core.shutdown();
    }

    #[tokio::test]
    async fn shutdown_is_idempotent() {
        let mut core = Coordinator::start(CoreConfig::default(), Arc::new(NoopPush));
        core.shutdown();
        core.shutdown();
    }
}
