//! Typed event payloads.
//!
//! Components communicate through explicit channels carrying these types:
//! [`DomainEvent`] on the process-wide event bus (consumed by the
//! notification router), [`RosterEvent`] on per-parent roster
//! subscriptions, and [`FeedEvent`] on per-conversation feed
//! subscriptions. There is no implicit observer registration anywhere;
//! subscribers hold a receiver and drop it to cancel.

use crate::ids::UserId;
use crate::records::{Message, Relationship, TypingState};

/// A domain event published on the process-wide bus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DomainEvent {
    /// A message was appended to a conversation.
    MessagePosted {
        /// The stored message.
        message: Message,
        /// The pair member who did not send it.
        recipient: UserId,
    },
    /// A pairing code was redeemed and a relationship created.
    CodeRedeemed {
        /// The newly created relationship.
        relationship: Relationship,
    },
    /// A relationship was unlinked.
    RelationshipEnded {
        /// The relationship, now inactive.
        relationship: Relationship,
    },
    /// A screen-time threshold trigger fired.
    LimitWarning {
        /// The user to warn.
        recipient: UserId,
        /// Warning headline.
        title: String,
        /// Warning body.
        body: String,
    },
}

/// A live update on a parent's device roster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RosterEvent {
    /// A child device paired with this parent.
    Paired(Relationship),
    /// A child device was unlinked from this parent.
    Unpaired(Relationship),
}

/// A live update on a conversation feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedEvent {
    /// A new message was appended.
    Message(Message),
    /// An existing message changed status (delivered/read).
    MessageUpdated(Message),
    /// A typing lease changed, including the implicit expiry to
    /// `is_typing = false`.
    Typing(TypingState),
}
