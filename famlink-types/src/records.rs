//! Durable records and derived views.
//!
//! These are the shapes persisted by the storage layer and presented to
//! clients. JSON field names follow the interchange format (camelCase,
//! epoch-millisecond timestamps).

use crate::ids::{
    ConversationId, MessageId, NotificationId, PairCode, RelationshipId, Seq, UserId,
};
use crate::time::EpochMillis;
use serde::{Deserialize, Serialize};

/// Role claim supplied by the identity provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// A parent account.
    Parent,
    /// A child device account.
    Child,
}

/// A short-lived single-use pairing code record.
///
/// At most one unconsumed, unexpired code exists per issuer at a time;
/// issuing a new code revokes the previous one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PairingCode {
    /// The code value shown to the user.
    pub code: PairCode,
    /// The user (child device) that requested the code.
    pub issuer_id: UserId,
    /// When the code was issued.
    pub created_at: EpochMillis,
    /// When the code stops being redeemable.
    pub expires_at: EpochMillis,
    /// Whether the code has been redeemed. Single-use: this transition
    /// happens at most once, atomically.
    pub consumed: bool,
}

impl PairingCode {
    /// Whether the code is past its expiry at the given instant.
    pub fn is_expired(&self, now: EpochMillis) -> bool {
        now >= self.expires_at
    }
}

/// The durable parent↔child association created by code redemption.
///
/// A child belongs to at most one active relationship; a parent may own
/// many.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Relationship {
    /// Unique identifier for this relationship.
    pub id: RelationshipId,
    /// The parent account.
    pub parent_id: UserId,
    /// The child device account.
    pub child_id: UserId,
    /// Human-readable name for the child device.
    pub device_name: String,
    /// The code that was redeemed to create this relationship.
    pub pair_code: PairCode,
    /// When the pairing completed.
    pub paired_at: EpochMillis,
    /// False once unpaired. Inactive relationships are kept for history
    /// but resolve no conversation and receive no presence tracking.
    pub is_active: bool,
}

impl Relationship {
    /// The conversation shared by this pair.
    pub fn conversation_id(&self) -> ConversationId {
        ConversationId::for_pair(&self.parent_id, &self.child_id)
    }

    /// The member of the pair that is not `user`, if `user` is a member.
    pub fn peer_of(&self, user: &UserId) -> Option<&UserId> {
        if *user == self.parent_id {
            Some(&self.child_id)
        } else if *user == self.child_id {
            Some(&self.parent_id)
        } else {
            None
        }
    }
}

/// Category of a conversation message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    /// Free-form chat text.
    Text,
    /// A screen-time reminder.
    Reminder,
    /// An encouragement nudge.
    Encouragement,
    /// A limit warning.
    Warning,
    /// Client-defined category.
    Custom,
}

/// A message within a conversation.
///
/// `sent_at` is assigned by the store and is monotonically non-decreasing
/// within a conversation; `seq` breaks ties. `read_at` is only ever set
/// after `delivered_at`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Unique identifier for this message.
    pub id: MessageId,
    /// The conversation this message belongs to.
    pub conversation_id: ConversationId,
    /// The user that sent the message.
    pub sender_id: UserId,
    /// Message body.
    pub text: String,
    /// Store-assigned send timestamp.
    pub sent_at: EpochMillis,
    /// When the recipient's client acknowledged receipt.
    pub delivered_at: Option<EpochMillis>,
    /// When the recipient read the message.
    pub read_at: Option<EpochMillis>,
    /// Message category.
    #[serde(rename = "type")]
    pub kind: MessageKind,
    /// Store-assigned insertion sequence within the conversation.
    pub seq: Seq,
}

/// Ephemeral typing indicator for one user in one conversation.
///
/// A liveness lease, not a durable record: without renewal inside the
/// debounce window it expires and an implicit `isTyping=false` is
/// published, so a stuck indicator cannot outlive an unclean disconnect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypingState {
    /// The conversation the user is typing in.
    pub conversation_id: ConversationId,
    /// The user composing.
    pub user_id: UserId,
    /// Whether the user is currently typing.
    pub is_typing: bool,
    /// When the lease was last renewed.
    pub updated_at: EpochMillis,
}

/// Last-seen record for a paired device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceHeartbeat {
    /// The relationship whose child device reported the heartbeat.
    pub relationship_id: RelationshipId,
    /// When the device last reported.
    pub last_seen_at: EpochMillis,
}

/// Derived presence view for a paired device.
///
/// `is_online` is a pure function of heartbeat recency against the
/// configured threshold, recomputed on every scheduled poll.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DevicePresence {
    /// The relationship this presence belongs to.
    pub relationship_id: RelationshipId,
    /// The child account behind the device.
    pub child_id: UserId,
    /// Human-readable device name.
    pub device_name: String,
    /// Whether the device reported a heartbeat within the threshold.
    pub is_online: bool,
    /// Consecutive polls that found the device stale. Resets on the next
    /// heartbeat.
    pub missed_heartbeats: u32,
    /// When the device last reported, if it ever has.
    pub last_seen_at: Option<EpochMillis>,
}

/// Category of a user-facing notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    /// A new conversation message arrived.
    Message,
    /// A pairing completed.
    Pairing,
    /// A relationship was unlinked.
    Unlink,
    /// A screen-time limit warning fired.
    Warning,
}

/// A user-facing notification record.
///
/// Created by the notification router; mutated only by the recipient
/// (mark-read, delete), never by the originating side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    /// Unique identifier for this notification.
    pub id: NotificationId,
    /// The user this notification is addressed to.
    pub recipient_id: UserId,
    /// Notification category.
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    /// Short headline.
    pub title: String,
    /// Body text.
    pub body: String,
    /// When the router created the record.
    pub created_at: EpochMillis,
    /// When the recipient marked it read.
    pub read_at: Option<EpochMillis>,
}

impl Notification {
    /// Whether the recipient has marked this notification read.
    pub fn is_read(&self) -> bool {
        self.read_at.is_some()
    }
}
