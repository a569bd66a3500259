//! Presence registry: maps a principal to at most one live delivery
//! channel.
//!
//! A [`SessionChannel`] is the sender half of the per-connection frame
//! channel; its [`ChannelId`] gives each connection a distinct identity so
//! a stale disconnect can never evict a newer session. Registering a
//! second channel for the same principal supersedes the first — the old
//! channel is not closed by the registry, it simply stops being
//! addressable.

use std::collections::HashMap;

use courier_proto::message::PrincipalId;
use courier_proto::wire::ServerFrame;
use tokio::sync::{RwLock, mpsc};
use uuid::Uuid;

/// Identity token distinguishing one connection's channel from another.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChannelId(Uuid);

impl ChannelId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for ChannelId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Error returned when a push into a session channel fails.
///
/// The receiving writer task has shut down; the frame was not delivered.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("session channel closed")]
pub struct ChannelClosed;

/// The live, addressable delivery path of one connected session.
#[derive(Debug, Clone)]
pub struct SessionChannel {
    id: ChannelId,
    sender: mpsc::UnboundedSender<ServerFrame>,
}

impl SessionChannel {
    /// Wraps the sender half of a connection's frame channel.
    #[must_use]
    pub fn new(sender: mpsc::UnboundedSender<ServerFrame>) -> Self {
        Self {
            id: ChannelId::new(),
            sender,
        }
    }

    /// Returns this channel's identity token.
    #[must_use]
    pub const fn id(&self) -> ChannelId {
        self.id
    }

    /// Pushes one frame toward the session's socket writer.
    ///
    /// Frames pushed through the same channel reach the socket in push
    /// order (per-destination FIFO).
    ///
    /// # Errors
    ///
    /// Returns [`ChannelClosed`] if the writer task has gone away.
    pub fn push(&self, frame: ServerFrame) -> Result<(), ChannelClosed> {
        self.sender.send(frame).map_err(|_| ChannelClosed)
    }
}

/// Registry of the zero-or-one live session per principal.
#[derive(Debug, Default)]
pub struct PresenceRegistry {
    sessions: RwLock<HashMap<PrincipalId, SessionChannel>>,
}

impl PresenceRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs or replaces the session for `principal`.
    ///
    /// Returns the superseded channel if one was registered. The registry
    /// does not notify the old channel.
    pub async fn register(
        &self,
        principal: PrincipalId,
        channel: SessionChannel,
    ) -> Option<SessionChannel> {
        let mut sessions = self.sessions.write().await;
        sessions.insert(principal, channel)
    }

    /// Removes the session only if the registered channel is the one
    /// identified by `channel_id`.
    ///
    /// A mismatch (the session was already superseded) is a silent no-op.
    /// Returns true if an entry was removed.
    pub async fn unregister(&self, principal: &PrincipalId, channel_id: ChannelId) -> bool {
        let mut sessions = self.sessions.write().await;
        match sessions.get(principal) {
            Some(current) if current.id() == channel_id => {
                sessions.remove(principal);
                true
            }
            _ => false,
        }
    }

    /// Returns the live channel for `principal`, if any.
    ///
    /// Absence means "not currently reachable" — a normal outcome, not a
    /// failure.
    pub async fn lookup(&self, principal: &PrincipalId) -> Option<SessionChannel> {
        let sessions = self.sessions.read().await;
        sessions.get(principal).cloned()
    }

    /// Number of currently registered sessions.
    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }
}
