//! Identity and ordering types for famlink.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// An opaque user identifier supplied by the external identity provider.
///
/// The core never inspects the contents; it only compares and routes by it.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    /// Wrap an identity-provider id.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the raw id string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UserId({})", self.0)
    }
}

impl From<&str> for UserId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// A unique identifier for a parent↔child relationship record.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RelationshipId(uuid::Uuid);

impl RelationshipId {
    /// Create a new random RelationshipId.
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for RelationshipId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RelationshipId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for RelationshipId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RelationshipId({})", &self.0.to_string()[..8])
    }
}

/// A unique identifier for a message.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(uuid::Uuid);

impl MessageId {
    /// Create a new random MessageId.
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MessageId({})", &self.0.to_string()[..8])
    }
}

/// A unique identifier for a notification record.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NotificationId(uuid::Uuid);

impl NotificationId {
    /// Create a new random NotificationId.
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for NotificationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for NotificationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for NotificationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NotificationId({})", &self.0.to_string()[..8])
    }
}

/// The logical message thread for a parent/child pair.
///
/// Derived deterministically: the two user ids sorted lexicographically and
/// joined with `_`. Both directions of a pair produce the same identifier,
/// so either side can resolve the shared thread without a lookup table.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationId(String);

impl ConversationId {
    /// Derive the conversation id for a pair of users.
    ///
    /// Symmetric: `for_pair(a, b) == for_pair(b, a)`.
    pub fn for_pair(a: &UserId, b: &UserId) -> Self {
        let (lo, hi) = if a.as_str() <= b.as_str() {
            (a, b)
        } else {
            (b, a)
        };
        Self(format!("{}_{}", lo.as_str(), hi.as_str()))
    }

    /// Get the raw identifier string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ConversationId({})", self.0)
    }
}

/// Error returned when parsing a malformed pairing code.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid pairing code: {0}")]
pub struct InvalidPairCode(pub String);

/// A short-lived single-use pairing code value.
///
/// 6-8 uppercase alphanumeric characters. User input is normalized
/// (trimmed, uppercased) before validation so codes survive manual entry.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PairCode(String);

impl PairCode {
    /// Validate and wrap a code value.
    pub fn new(code: impl Into<String>) -> Result<Self, InvalidPairCode> {
        let code = code.into();
        if !(6..=8).contains(&code.len()) {
            return Err(InvalidPairCode(format!(
                "expected 6-8 characters, got {}",
                code.len()
            )));
        }
        if !code
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit())
        {
            return Err(InvalidPairCode(
                "characters must be A-Z or 0-9".to_string(),
            ));
        }
        Ok(Self(code))
    }

    /// Get the code string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for PairCode {
    type Err = InvalidPairCode;

    /// Parse user input: trims surrounding whitespace and uppercases
    /// before validating.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s.trim().to_ascii_uppercase())
    }
}

impl fmt::Display for PairCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for PairCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PairCode({})", self.0)
    }
}

/// A store-assigned insertion sequence within a conversation.
///
/// Breaks ties between messages that share a server timestamp; assigned by
/// the store, never by clients, so ordering survives clock drift.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct Seq(u64);

impl Seq {
    /// Create a Seq with the given value.
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    /// Get the numeric value.
    pub fn value(&self) -> u64 {
        self.0
    }

    /// The sequence before any message exists.
    pub fn zero() -> Self {
        Self(0)
    }

    /// The next sequence value.
    pub fn next(&self) -> Self {
        Self(self.0.saturating_add(1))
    }
}

impl fmt::Display for Seq {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for Seq {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Seq({})", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conversation_id_is_symmetric() {
        let parent = UserId::new("parent-1");
        let child = UserId::new("child-1");

        let a = ConversationId::for_pair(&parent, &child);
        let b = ConversationId::for_pair(&child, &parent);

        assert_eq!(a, b);
    }

    #[test]
    fn conversation_id_sorts_members() {
        let parent = UserId::new("parent-1");
        let child = UserId::new("child-1");

        let conv = ConversationId::for_pair(&parent, &child);
        assert_eq!(conv.as_str(), "child-1_parent-1");
    }

    #[test]
    fn pair_code_accepts_valid_lengths() {
        assert!(PairCode::new("AB12CD").is_ok());
        assert!(PairCode::new("AB12CD34").is_ok());
    }

    #[test]
    fn pair_code_rejects_bad_lengths() {
        assert!(PairCode::new("AB12C").is_err());
        assert!(PairCode::new("AB12CD345").is_err());
        assert!(PairCode::new("").is_err());
    }

    #[test]
    fn pair_code_rejects_bad_characters() {
        assert!(PairCode::new("ab12cd").is_err());
        assert!(PairCode::new("AB 2CD").is_err());
        assert!(PairCode::new("AB-2CD").is_err());
    }

    #[test]
    fn pair_code_parse_normalizes_input() {
        let code: PairCode = " ab12cd ".parse().unwrap();
        assert_eq!(code.as_str(), "AB12CD");
    }

    #[test]
    fn seq_ordering() {
        assert!(Seq::new(1) < Seq::new(2));
        assert_eq!(Seq::zero().next().value(), 1);
    }

    #[test]
    fn seq_saturates_at_max() {
        assert_eq!(Seq::new(u64::MAX).next().value(), u64::MAX);
    }

    #[test]
    fn ids_serialize_transparently() {
        let user = UserId::new("parent-1");
        assert_eq!(serde_json::to_string(&user).unwrap(), r#""parent-1""#);

        let conv = ConversationId::for_pair(&UserId::new("a"), &UserId::new("b"));
        assert_eq!(serde_json::to_string(&conv).unwrap(), r#""a_b""#);
    }

    #[test]
    fn uuid_ids_roundtrip_through_json() {
        let id = MessageId::new();
        let json = serde_json::to_string(&id).unwrap();
        let restored: MessageId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, restored);
    }
}
