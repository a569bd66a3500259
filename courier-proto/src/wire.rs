//! Client/server frame types and the postcard codec.
//!
//! Every WebSocket binary frame carries exactly one postcard-encoded
//! [`ClientFrame`] or [`ServerFrame`]. Direct replies to client requests
//! arrive in request order on a connection; [`ServerFrame::Event`] pushes
//! from the delivery broker interleave freely between them.

use serde::{Deserialize, Serialize};

use crate::message::{Message, MessageId, PrincipalId};

/// Error type for frame encode/decode operations.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// Serialization or deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Distinguishes a broker push for a newly created message from one for a
/// mutated message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventKind {
    /// A message was just persisted.
    Created,
    /// An existing message's like bit changed.
    Updated,
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Created => write!(f, "created"),
            Self::Updated => write!(f, "updated"),
        }
    }
}

/// Failure category carried on [`ServerFrame::Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    /// Malformed send request; nothing was persisted.
    Validation,
    /// Operation on a nonexistent message id.
    NotFound,
    /// Hello token rejected by the authentication collaborator.
    Unauthorized,
    /// Object storage or persistence unreachable; the request may be
    /// retried by the caller.
    UpstreamUnavailable,
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation => write!(f, "validation"),
            Self::NotFound => write!(f, "not-found"),
            Self::Unauthorized => write!(f, "unauthorized"),
            Self::UpstreamUnavailable => write!(f, "upstream-unavailable"),
        }
    }
}

/// Frames sent from a client to the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClientFrame {
    /// Authenticates the connection and registers a delivery session.
    ///
    /// Must be the first frame on a connection. The server replies with
    /// [`ServerFrame::Welcome`] on success. A later session for the same
    /// principal supersedes this one.
    Hello {
        /// Opaque credential, verified by the authentication collaborator.
        token: String,
    },

    /// Sends a text message to a recipient.
    SendText {
        /// Recipient principal.
        recipient: PrincipalId,
        /// Inline text body.
        text: String,
    },

    /// Sends an image message.
    ///
    /// The raw bytes are handed to the object-storage collaborator; only
    /// the resulting URL is persisted in the message record.
    SendImage {
        /// Recipient principal.
        recipient: PrincipalId,
        /// Raw image bytes to upload.
        data: Vec<u8>,
    },

    /// Atomically flips the like bit of a message.
    ToggleLike {
        /// The message to toggle.
        message_id: MessageId,
    },

    /// Requests the full ordered history with another principal.
    FetchHistory {
        /// The other participant.
        with: PrincipalId,
    },
}

/// Frames sent from the server to a client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServerFrame {
    /// Hello accepted; the session is registered for delivery.
    Welcome {
        /// The authenticated principal this session belongs to.
        principal: PrincipalId,
    },

    /// Direct reply to a send request: the persisted record.
    Sent {
        /// The created message, `liked` and `read` both false.
        message: Message,
    },

    /// Direct reply to a successful [`ClientFrame::ToggleLike`].
    LikeResult {
        /// The post-toggle record; `liked` is the authoritative value.
        message: Message,
    },

    /// Direct reply to [`ClientFrame::FetchHistory`].
    History {
        /// The other participant the history was requested for.
        with: PrincipalId,
        /// All messages of the conversation, ascending creation order.
        messages: Vec<Message>,
    },

    /// Broker push notifying a participant of a created or updated message.
    Event {
        /// Whether the message is new or mutated.
        kind: EventKind,
        /// The full current record.
        message: Message,
    },

    /// A request failed.
    ///
    /// `message_id` is set when the failure concerns a specific message
    /// (like-toggle failures), letting the client roll back its optimistic
    /// state for that message.
    Error {
        /// Failure category.
        code: ErrorCode,
        /// Human-readable description.
        reason: String,
        /// The message the failure concerns, if any.
        message_id: Option<MessageId>,
    },
}

/// Encodes a [`ClientFrame`] into bytes using postcard.
///
/// # Errors
///
/// Returns [`CodecError::Serialization`] if the frame cannot be serialized.
pub fn encode_client(frame: &ClientFrame) -> Result<Vec<u8>, CodecError> {
    postcard::to_allocvec(frame).map_err(|e| CodecError::Serialization(e.to_string()))
}

/// Decodes a [`ClientFrame`] from bytes using postcard.
///
/// # Errors
///
/// Returns [`CodecError::Serialization`] if the bytes cannot be deserialized.
pub fn decode_client(bytes: &[u8]) -> Result<ClientFrame, CodecError> {
    postcard::from_bytes(bytes).map_err(|e| CodecError::Serialization(e.to_string()))
}

/// Encodes a [`ServerFrame`] into bytes using postcard.
///
/// # Errors
///
/// Returns [`CodecError::Serialization`] if the frame cannot be serialized.
pub fn encode_server(frame: &ServerFrame) -> Result<Vec<u8>, CodecError> {
    postcard::to_allocvec(frame).map_err(|e| CodecError::Serialization(e.to_string()))
}

/// Decodes a [`ServerFrame`] from bytes using postcard.
///
/// # Errors
///
/// Returns [`CodecError::Serialization`] if the bytes cannot be deserialized.
pub fn decode_server(bytes: &[u8]) -> Result<ServerFrame, CodecError> {
    postcard::from_bytes(bytes).map_err(|e| CodecError::Serialization(e.to_string()))
}
