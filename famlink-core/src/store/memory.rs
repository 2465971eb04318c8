//! In-memory storage backend.
//!
//! Conditional transitions happen under the owning map entry's lock, so
//! `consume_code` and `insert_relationship` are real compare-and-swap
//! operations, not read-then-write. Message appends for one conversation
//! are serialized by a per-conversation mutex that assigns the sequence
//! and the monotonic store timestamp together.

use super::{MessageDraft, MessageLog, NotificationStore, PairingStore};
use async_trait::async_trait;
use dashmap::DashMap;
use famlink_types::{
    now_millis, ConversationId, EpochMillis, Message, MessageId, Notification, NotificationId,
    PairCode, PairingCode, Relationship, RelationshipId, Seq, StoreError, StoreResult, UserId,
};
use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use tokio::sync::Mutex;

/// Append state for one conversation.
#[derive(Debug)]
struct ConversationLog {
    messages: Vec<Message>,
    next_seq: Seq,
    last_sent_at: EpochMillis,
}

impl ConversationLog {
    fn new() -> Self {
        Self {
            messages: Vec::new(),
            next_seq: Seq::zero().next(),
            last_sent_at: 0,
        }
    }
}

/// In-process storage for all coordination records.
#[derive(Debug, Default)]
pub struct MemoryStore {
    codes: DashMap<PairCode, PairingCode>,
    relationships: DashMap<RelationshipId, Relationship>,
    /// Serializes the child-uniqueness check with the insert.
    pair_guard: StdMutex<()>,
    logs: DashMap<ConversationId, Arc<Mutex<ConversationLog>>>,
    message_index: DashMap<MessageId, ConversationId>,
    notifications: DashMap<NotificationId, Notification>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    async fn update_message<F>(&self, id: &MessageId, apply: F) -> StoreResult<Message>
    where
        F: FnOnce(&mut Message),
    {
        let conversation = self
            .message_index
            .get(id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| StoreError::NotFound(format!("message {}", id)))?;

        let log = self
            .logs
            .get(&conversation)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| StoreError::NotFound(format!("conversation {}", conversation)))?;

        let mut guard = log.lock().await;
        let message = guard
            .messages
            .iter_mut()
            .find(|m| m.id == *id)
            .ok_or_else(|| StoreError::NotFound(format!("message {}", id)))?;
        apply(message);
        Ok(message.clone())
    }
}

#[async_trait]
impl PairingStore for MemoryStore {
    async fn insert_code(&self, code: PairingCode) -> StoreResult<()> {
        match self.codes.entry(code.code.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => Err(StoreError::Conflict(format!(
                "pairing code {} already exists",
                code.code
            ))),
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(code);
                Ok(())
            }
        }
    }

    async fn revoke_unconsumed(&self, issuer: &UserId) -> StoreResult<u64> {
        let mut revoked = 0u64;
        self.codes.retain(|_, record| {
            if record.issuer_id == *issuer && !record.consumed {
                revoked += 1;
                false
            } else {
                true
            }
        });
        Ok(revoked)
    }

    async fn find_code(&self, code: &PairCode) -> StoreResult<Option<PairingCode>> {
        Ok(self.codes.get(code).map(|entry| entry.value().clone()))
    }

    async fn consume_code(&self, code: &PairCode) -> StoreResult<PairingCode> {
        // The entry lock makes this the single conditional transition:
        // exactly one caller observes consumed == false.
        match self.codes.get_mut(code) {
            None => Err(StoreError::NotFound(format!("pairing code {}", code))),
            Some(mut entry) => {
                if entry.consumed {
                    Err(StoreError::Conflict(format!(
                        "pairing code {} already consumed",
                        code
                    )))
                } else {
                    entry.consumed = true;
                    Ok(entry.clone())
                }
            }
        }
    }

    async fn insert_relationship(&self, relationship: Relationship) -> StoreResult<()> {
        let _guard = self.pair_guard.lock().unwrap_or_else(|e| e.into_inner());

        let child_taken = self
            .relationships
            .iter()
            .any(|r| r.is_active && r.child_id == relationship.child_id);
        if child_taken {
            return Err(StoreError::Conflict(format!(
                "child {} is already actively paired",
                relationship.child_id
            )));
        }

        self.relationships.insert(relationship.id, relationship);
        Ok(())
    }

    async fn deactivate_relationship(
        &self,
        id: &RelationshipId,
    ) -> StoreResult<Option<Relationship>> {
        match self.relationships.get_mut(id) {
            Some(mut entry) if entry.is_active => {
                entry.is_active = false;
                Ok(Some(entry.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn relationship(&self, id: &RelationshipId) -> StoreResult<Option<Relationship>> {
        Ok(self.relationships.get(id).map(|entry| entry.value().clone()))
    }

    async fn active_for_parent(&self, parent: &UserId) -> StoreResult<Vec<Relationship>> {
        let mut out: Vec<Relationship> = self
            .relationships
            .iter()
            .filter(|r| r.is_active && r.parent_id == *parent)
            .map(|r| r.value().clone())
            .collect();
        out.sort_by_key(|r| r.paired_at);
        Ok(out)
    }

    async fn active_for_child(&self, child: &UserId) -> StoreResult<Option<Relationship>> {
        Ok(self
            .relationships
            .iter()
            .find(|r| r.is_active && r.child_id == *child)
            .map(|r| r.value().clone()))
    }

    async fn active_for_conversation(
        &self,
        conversation: &ConversationId,
    ) -> StoreResult<Option<Relationship>> {
        Ok(self
            .relationships
            .iter()
            .find(|r| r.is_active && r.conversation_id() == *conversation)
            .map(|r| r.value().clone()))
    }

    async fn active_relationships(&self) -> StoreResult<Vec<Relationship>> {
        let mut out: Vec<Relationship> = self
            .relationships
            .iter()
            .filter(|r| r.is_active)
            .map(|r| r.value().clone())
            .collect();
        out.sort_by_key(|r| r.paired_at);
        Ok(out)
    }

    async fn purge_expired_codes(&self, now: EpochMillis) -> StoreResult<u64> {
        let mut purged = 0u64;
        self.codes.retain(|_, record| {
            if record.is_expired(now) {
                purged += 1;
                false
            } else {
                true
            }
        });
        Ok(purged)
    }
}

#[async_trait]
impl MessageLog for MemoryStore {
    async fn append(&self, draft: MessageDraft) -> StoreResult<Message> {
        let log = {
            self.logs
                .entry(draft.conversation_id.clone())
                .or_insert_with(|| Arc::new(Mutex::new(ConversationLog::new())))
                .value()
                .clone()
        };

        let mut guard = log.lock().await;
        let seq = guard.next_seq;
        guard.next_seq = seq.next();
        // Server-assigned ordering: never trust the client clock, never
        // step backwards within a conversation.
        let sent_at = now_millis().max(guard.last_sent_at);
        guard.last_sent_at = sent_at;

        let message = Message {
            id: MessageId::new(),
            conversation_id: draft.conversation_id.clone(),
            sender_id: draft.sender_id,
            text: draft.text,
            sent_at,
            delivered_at: None,
            read_at: None,
            kind: draft.kind,
            seq,
        };

        guard.messages.push(message.clone());
        self.message_index
            .insert(message.id, draft.conversation_id);
        Ok(message)
    }

    async fn snapshot(&self, conversation: &ConversationId) -> StoreResult<Vec<Message>> {
        match self.logs.get(conversation) {
            Some(entry) => {
                let log = entry.value().clone();
                drop(entry);
                let guard = log.lock().await;
                Ok(guard.messages.clone())
            }
            None => Ok(Vec::new()),
        }
    }

    async fn message(&self, id: &MessageId) -> StoreResult<Option<Message>> {
        match self.update_message(id, |_| {}).await {
            Ok(message) => Ok(Some(message)),
            Err(StoreError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn set_delivered(&self, id: &MessageId, at: EpochMillis) -> StoreResult<Message> {
        self.update_message(id, |m| {
            if m.delivered_at.is_none() {
                m.delivered_at = Some(at);
            }
        })
        .await
    }

    async fn set_read(&self, id: &MessageId, at: EpochMillis) -> StoreResult<Message> {
        self.update_message(id, |m| {
            if m.delivered_at.is_none() {
                m.delivered_at = Some(at);
            }
            if m.read_at.is_none() {
                m.read_at = Some(at);
            }
        })
        .await
    }
}

#[async_trait]
impl NotificationStore for MemoryStore {
    async fn insert(&self, notification: Notification) -> StoreResult<()> {
        self.notifications.insert(notification.id, notification);
        Ok(())
    }

    async fn for_recipient(&self, recipient: &UserId) -> StoreResult<Vec<Notification>> {
        let mut out: Vec<Notification> = self
            .notifications
            .iter()
            .filter(|n| n.recipient_id == *recipient)
            .map(|n| n.value().clone())
            .collect();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(out)
    }

    async fn mark_read(
        &self,
        id: &NotificationId,
        recipient: &UserId,
        at: EpochMillis,
    ) -> StoreResult<Notification> {
        match self.notifications.get_mut(id) {
            Some(mut entry) if entry.recipient_id == *recipient => {
                if entry.read_at.is_none() {
                    entry.read_at = Some(at);
                }
                Ok(entry.clone())
            }
            _ => Err(StoreError::NotFound(format!("notification {}", id))),
        }
    }

    async fn mark_all_read(&self, recipient: &UserId, at: EpochMillis) -> StoreResult<u64> {
        let mut changed = 0u64;
        for mut entry in self.notifications.iter_mut() {
            if entry.recipient_id == *recipient && entry.read_at.is_none() {
                entry.read_at = Some(at);
                changed += 1;
            }
        }
        Ok(changed)
    }

    async fn delete(&self, id: &NotificationId, recipient: &UserId) -> StoreResult<()> {
        if self
            .notifications
            .remove_if(id, |_, n| n.recipient_id == *recipient)
            .is_some()
        {
            Ok(())
        } else {
            Err(StoreError::NotFound(format!("notification {}", id)))
        }
    }

    async fn unread_count(&self, recipient: &UserId) -> StoreResult<u64> {
        Ok(self
            .notifications
            .iter()
            .filter(|n| n.recipient_id == *recipient && n.read_at.is_none())
            .count() as u64)
    }
}
