//! # famlink-core
//!
//! The real-time coordination core for famlink: pairing a parent account
//! with child devices via short-lived codes, keeping a bidirectional
//! conversation with typing state synchronized across both sides, deriving
//! device presence from heartbeats, and routing domain events into a
//! notification feed.
//!
//! ## Architecture
//!
//! ```text
//! intents (pair, send, mark read) → owning component → storage traits
//!                                         ↓
//!                live feeds (broadcast/watch) → subscribers re-render
//! ```
//!
//! Components are instantiated once at process start and passed by
//! `Arc`; there is no ambient global state. Cross-component signaling
//! goes through the typed [`EventBus`]; the [`NotificationRouter`] is its
//! only standing consumer. The [`OnboardingState`] machine is pure (no
//! I/O) and is driven by the caller interpreting its actions.
//!
//! [`Coordinator::start`] wires everything together for embedders that
//! want the default in-memory assembly.

pub mod config;
pub mod coordinator;
pub mod engine;
pub mod error;
pub mod events;
pub mod onboarding;
pub mod pairing;
pub mod presence;
pub mod retry;
pub mod router;
pub mod store;

pub use config::{ConfigError, CoreConfig};
pub use coordinator::Coordinator;
pub use engine::{spawn_typing_sweeper, ConversationFeed, SyncEngine};
pub use error::{FeedError, PairingError, SendError};
pub use events::EventBus;
pub use onboarding::{CompletionPath, OnboardingAction, OnboardingEvent, OnboardingState};
pub use pairing::{spawn_code_sweeper, PairingRegistry};
pub use presence::{spawn_presence_task, PresenceTracker};
pub use retry::RetryPolicy;
pub use router::{
    spawn_router, NoopPush, NotificationRouter, PushError, PushRequest, PushTransport,
};
pub use store::{MemoryStore, MessageDraft, MessageLog, NotificationStore, PairingStore};
