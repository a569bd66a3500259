//! Conversation keys: canonical unordered participant pairs.
//!
//! A conversation has no independent identity or storage. It is derived
//! entirely from the unordered pair of its two participants, so the key
//! canonicalizes the pair ordering to make `{a, b}` and `{b, a}` equal.

use serde::{Deserialize, Serialize};

use crate::message::PrincipalId;

/// Canonical key for the conversation between two principals.
///
/// Construction sorts the pair, so `ConversationKey::new(a, b)` equals
/// `ConversationKey::new(b, a)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConversationKey {
    first: PrincipalId,
    second: PrincipalId,
}

impl ConversationKey {
    /// Creates the canonical key for the unordered pair `{a, b}`.
    #[must_use]
    pub fn new(a: PrincipalId, b: PrincipalId) -> Self {
        if a <= b {
            Self { first: a, second: b }
        } else {
            Self { first: b, second: a }
        }
    }

    /// Returns the two participants in canonical order.
    #[must_use]
    pub const fn participants(&self) -> (&PrincipalId, &PrincipalId) {
        (&self.first, &self.second)
    }

    /// Returns true if the given principal is one of the two participants.
    #[must_use]
    pub fn contains(&self, principal: &PrincipalId) -> bool {
        &self.first == principal || &self.second == principal
    }
}

impl std::fmt::Display for ConversationKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}<->{}", self.first, self.second)
    }
}
