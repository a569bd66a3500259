//! Durable message store: single source of truth for content and like
//! state.
//!
//! The [`MessageStore`] owns every message record plus the conversation
//! index, both protected by one `RwLock`. Creation assigns the id and
//! timestamp inside the write section, so ids are strictly monotonic and
//! the index always appends in creation order. The like toggle is a single
//! read-modify-write under the same lock, which makes concurrent toggles
//! linearizable: one net flip per call, never lost, never double-applied.

use std::collections::HashMap;

use courier_proto::conversation::ConversationKey;
use courier_proto::message::{
    MAX_TEXT_SIZE, Message, MessageBody, MessageId, PrincipalId, Timestamp, ValidationError,
};
use tokio::sync::RwLock;

use crate::index::ConversationIndex;

/// Error returned by store operations on a specific message.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// No message exists with the given id.
    #[error("message {0} not found")]
    NotFound(MessageId),
}

#[derive(Debug, Default)]
struct StoreInner {
    next_id: u64,
    messages: HashMap<MessageId, Message>,
    index: ConversationIndex,
}

/// In-memory message store with an embedded conversation index.
#[derive(Debug)]
pub struct MessageStore {
    inner: RwLock<StoreInner>,
    max_text_size: usize,
}

impl Default for MessageStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageStore {
    /// Creates an empty store with the default text size limit.
    #[must_use]
    pub fn new() -> Self {
        Self::with_max_text_size(MAX_TEXT_SIZE)
    }

    /// Creates an empty store with a custom text size limit.
    #[must_use]
    pub fn with_max_text_size(max_text_size: usize) -> Self {
        Self {
            inner: RwLock::new(StoreInner::default()),
            max_text_size,
        }
    }

    /// Persists a new message and returns the stored record.
    ///
    /// Validation happens before any write: a failed create leaves no
    /// partial state. Id and timestamp are assigned atomically inside the
    /// write section; `liked` and `read` start false.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::SelfAddressed`] when sender and recipient
    /// are the same principal, or the body's own validation error.
    pub async fn create(
        &self,
        sender: PrincipalId,
        recipient: PrincipalId,
        body: MessageBody,
    ) -> Result<Message, ValidationError> {
        if sender == recipient {
            return Err(ValidationError::SelfAddressed);
        }
        body.validate(self.max_text_size)?;

        let mut inner = self.inner.write().await;
        inner.next_id += 1;
        let message = Message {
            id: MessageId::from_u64(inner.next_id),
            sender: sender.clone(),
            recipient: recipient.clone(),
            body,
            liked: false,
            read: false,
            created_at: Timestamp::now(),
        };
        inner
            .index
            .insert(ConversationKey::new(sender, recipient), message.id);
        inner.messages.insert(message.id, message.clone());
        drop(inner);
        Ok(message)
    }

    /// Returns a copy of the message with the given id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if no such message exists.
    pub async fn get(&self, id: MessageId) -> Result<Message, StoreError> {
        let inner = self.inner.read().await;
        inner.messages.get(&id).cloned().ok_or(StoreError::NotFound(id))
    }

    /// Atomically flips the like bit and returns the post-toggle record.
    ///
    /// The flip is a single read-modify-write under the write lock, so
    /// concurrent toggles on the same id interleave correctly: each call
    /// contributes exactly one flip.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if no such message exists.
    pub async fn toggle_liked(&self, id: MessageId) -> Result<Message, StoreError> {
        let mut inner = self.inner.write().await;
        let message = inner.messages.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        message.liked = !message.liked;
        Ok(message.clone())
    }

    /// Returns all messages between the unordered pair `{a, b}`, ascending
    /// creation order. Empty when the pair never exchanged a message.
    pub async fn history(&self, a: &PrincipalId, b: &PrincipalId) -> Vec<Message> {
        let key = ConversationKey::new(a.clone(), b.clone());
        let inner = self.inner.read().await;
        inner
            .index
            .messages(&key)
            .iter()
            .filter_map(|id| inner.messages.get(id).cloned())
            .collect()
    }

    /// Total number of stored messages.
    pub async fn len(&self) -> usize {
        self.inner.read().await.messages.len()
    }

    /// Returns true if no message has been stored yet.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
