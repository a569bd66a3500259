//! Core message record and identifier types.
//!
//! A [`Message`] is the single durable unit of the system: created once by
//! a send operation, mutated only by the like toggle, never deleted. The
//! server assigns [`MessageId`]s from a monotonic sequence, so ids are
//! globally unique and creation-ordered within every conversation.

use serde::{Deserialize, Serialize};

/// Maximum allowed inline text body size in bytes (64 KB).
pub const MAX_TEXT_SIZE: usize = 64 * 1024;

/// An authenticated identity on whose behalf requests and connections are
/// made.
///
/// Supplied by the authentication collaborator; the core trusts it without
/// re-validating credentials.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PrincipalId(String);

impl PrincipalId {
    /// Creates a principal identifier from its string representation.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the string representation of this principal.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for PrincipalId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Server-assigned message identifier.
///
/// Assigned from a store-owned monotonic sequence: globally unique, never
/// reused, and strictly increasing in creation order.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct MessageId(u64);

impl MessageId {
    /// Creates a `MessageId` from its raw sequence number.
    #[must_use]
    pub const fn from_u64(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw sequence number.
    #[must_use]
    pub const fn as_u64(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Millisecond-precision UTC timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(u64);

impl Timestamp {
    /// Creates a timestamp for the current instant.
    #[must_use]
    pub fn now() -> Self {
        let millis = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis();
        Self(u64::try_from(millis).unwrap_or(u64::MAX))
    }

    /// Creates a timestamp from milliseconds since the UNIX epoch.
    #[must_use]
    pub const fn from_millis(millis: u64) -> Self {
        Self(millis)
    }

    /// Returns the timestamp as milliseconds since the UNIX epoch.
    #[must_use]
    pub const fn as_millis(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}ms", self.0)
    }
}

/// Body of a message: inline text or a reference to externally stored
/// binary content.
///
/// Image bytes never travel inside a `Message`; the object-storage
/// collaborator resolves them to a stable URL before the record is created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageBody {
    /// Plain text content.
    Text(String),
    /// Reference to an uploaded image.
    Image {
        /// Stable, externally resolvable URL of the stored bytes.
        url: String,
    },
}

impl MessageBody {
    /// Validates this body for persistence.
    ///
    /// Text must be non-empty and at most `max_text_size` bytes. An image
    /// body must carry a non-empty, already-resolved URL.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::EmptyBody`], [`ValidationError::BodyTooLarge`],
    /// or [`ValidationError::EmptyImageUrl`].
    pub fn validate(&self, max_text_size: usize) -> Result<(), ValidationError> {
        match self {
            Self::Text(text) => {
                if text.is_empty() {
                    return Err(ValidationError::EmptyBody);
                }
                if text.len() > max_text_size {
                    return Err(ValidationError::BodyTooLarge {
                        size: text.len(),
                        max: max_text_size,
                    });
                }
            }
            Self::Image { url } => {
                if url.is_empty() {
                    return Err(ValidationError::EmptyImageUrl);
                }
            }
        }
        Ok(())
    }
}

/// A stored direct message.
///
/// `sender`, `recipient`, `body`, and `created_at` are immutable after
/// creation. `liked` flips only through the toggle operation and is a
/// single last-writer-wins bit, not a per-user set. `read` is reserved for
/// future read-receipt use and is not mutated by the specified flows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Unique, creation-ordered identifier.
    pub id: MessageId,
    /// Who sent the message.
    pub sender: PrincipalId,
    /// Who receives the message.
    pub recipient: PrincipalId,
    /// Text content or image reference.
    pub body: MessageBody,
    /// Shared like bit, last writer wins.
    pub liked: bool,
    /// Reserved read flag, defaults to false.
    pub read: bool,
    /// Creation instant; defines history order.
    pub created_at: Timestamp,
}

/// Error returned when a send request fails validation.
///
/// A validation failure rejects the request before any write; nothing is
/// persisted and nothing is published.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    /// Sender and recipient are the same principal.
    #[error("sender and recipient must differ")]
    SelfAddressed,
    /// Text body is empty.
    #[error("message body is empty")]
    EmptyBody,
    /// Text body exceeds the maximum allowed size.
    #[error("message body too large ({size} bytes, max {max} bytes)")]
    BodyTooLarge {
        /// Actual size of the body in bytes.
        size: usize,
        /// Maximum allowed size in bytes.
        max: usize,
    },
    /// Image body carries no resolved URL.
    #[error("image body has an empty url")]
    EmptyImageUrl,
}
