//! # famlink-types
//!
//! Identity, record, and event types for the famlink coordination core.
//!
//! This crate provides the foundational types used across all famlink
//! crates:
//! - [`UserId`], [`RelationshipId`], [`MessageId`], [`NotificationId`],
//!   [`ConversationId`], [`PairCode`], [`Seq`] - identity and ordering types
//! - Durable records ([`PairingCode`], [`Relationship`], [`Message`],
//!   [`Notification`]) and the ephemeral liveness views ([`TypingState`],
//!   [`DeviceHeartbeat`], [`DevicePresence`])
//! - [`DomainEvent`], [`RosterEvent`], [`FeedEvent`] - typed event payloads
//! - [`StoreError`] - the backend-agnostic storage failure surface
//!
//! The JSON representation of every record uses camelCase field names with
//! timestamps as epoch milliseconds; that shape is the interchange format
//! shared with clients and test fixtures.

#![warn(missing_docs)]
#![warn(clippy::all)]

mod error;
mod events;
mod ids;
mod records;
mod time;

pub use error::{StoreError, StoreResult};
pub use events::{DomainEvent, FeedEvent, RosterEvent};
pub use ids::{
    ConversationId, InvalidPairCode, MessageId, NotificationId, PairCode, RelationshipId, Seq,
    UserId,
};
pub use records::{
    DeviceHeartbeat, DevicePresence, Message, MessageKind, Notification, NotificationKind,
    PairingCode, Relationship, Role, TypingState,
};
pub use time::{now_millis, EpochMillis};
