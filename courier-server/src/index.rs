//! Conversation index: derives the ordered message sequence between two
//! participants.
//!
//! The index maps a canonical [`ConversationKey`] to the ids of the
//! messages exchanged between its participants, in creation order. It owns
//! no message data and is maintained by the [`crate::store::MessageStore`]
//! inside the store's write section, so index entries are always appended
//! in id order.

use std::collections::HashMap;

use courier_proto::conversation::ConversationKey;
use courier_proto::message::MessageId;

/// Per-conversation message-id lists, append-ordered by creation.
#[derive(Debug, Default)]
pub struct ConversationIndex {
    conversations: HashMap<ConversationKey, Vec<MessageId>>,
}

impl ConversationIndex {
    /// Creates an empty index.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a message id to the conversation for `key`.
    pub fn insert(&mut self, key: ConversationKey, id: MessageId) {
        self.conversations.entry(key).or_default().push(id);
    }

    /// Returns the message ids of the conversation, ascending creation
    /// order. Empty slice if the participants never exchanged a message.
    #[must_use]
    pub fn messages(&self, key: &ConversationKey) -> &[MessageId] {
        self.conversations.get(key).map_or(&[], Vec::as_slice)
    }

    /// Number of conversations with at least one message.
    #[must_use]
    pub fn conversation_count(&self) -> usize {
        self.conversations.len()
    }
}
