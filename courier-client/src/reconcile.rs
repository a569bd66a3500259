//! Optimistic reconciliation for the like flag.
//!
//! Toggling a like flips the displayed value immediately, before the
//! server has answered. Each tracked message is either `Confirmed` (the
//! display matches the last server-acknowledged value) or `Pending` (a
//! toggle round trip is in flight and the display is optimistic). While
//! pending, the pre-toggle value is kept for rollback and any value
//! arriving from outside the round trip is buffered rather than applied,
//! so a stale echo of one's own toggle never causes a flicker.
//!
//! Replies and events share one FIFO stream per session, so a value
//! buffered while a toggle is in flight is always older than the reply
//! that settles it: a successful reply discards the buffer, while a
//! failed round trip falls back to it (the buffer is newer than the
//! pre-toggle value the rollback would otherwise restore).

use std::collections::HashMap;

use courier_proto::message::MessageId;

/// Reconciliation state of one message's like flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LikeState {
    /// Display matches the last server-acknowledged value.
    Confirmed(bool),
    /// A toggle request is in flight.
    Pending {
        /// Optimistically displayed value.
        display: bool,
        /// Pre-toggle value to restore if the request fails.
        rollback: bool,
        /// Last value observed from outside the round trip; consulted
        /// only if the round trip fails.
        buffered: Option<bool>,
    },
}

/// Outcome of starting a toggle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToggleOutcome {
    /// A request should be issued; show this value while it is in flight.
    Optimistic {
        /// The flipped value to display immediately.
        display: bool,
    },
    /// A toggle for this message is already in flight; no new request.
    InFlight,
    /// The message is not tracked locally; issue the request without an
    /// optimistic flip.
    Untracked,
}

/// Per-message like reconciliation machine.
///
/// Pure state; the session layer drives it from replies and events.
#[derive(Debug, Default)]
pub struct LikeReconciler {
    states: HashMap<MessageId, LikeState>,
}

impl LikeReconciler {
    /// Creates an empty reconciler.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a like value seen outside a toggle round trip: a send
    /// reply, a history snapshot, or a change event.
    ///
    /// Confirmed messages adopt the value directly. For a pending message
    /// the value is buffered instead, so the in-flight round trip settles
    /// against the server reply first; only the last buffered value is
    /// kept.
    pub fn observe(&mut self, id: MessageId, liked: bool) {
        match self.states.get_mut(&id) {
            Some(LikeState::Pending { buffered, .. }) => *buffered = Some(liked),
            _ => {
                self.states.insert(id, LikeState::Confirmed(liked));
            }
        }
    }

    /// Starts a toggle for `id`.
    ///
    /// From `Confirmed` the display flips immediately and the old value is
    /// kept for rollback. A second toggle while one is in flight issues no
    /// new request.
    pub fn begin_toggle(&mut self, id: MessageId) -> ToggleOutcome {
        match self.states.get(&id).copied() {
            Some(LikeState::Confirmed(current)) => {
                self.states.insert(
                    id,
                    LikeState::Pending {
                        display: !current,
                        rollback: current,
                        buffered: None,
                    },
                );
                ToggleOutcome::Optimistic { display: !current }
            }
            Some(LikeState::Pending { .. }) => ToggleOutcome::InFlight,
            None => ToggleOutcome::Untracked,
        }
    }

    /// Settles a pending toggle with the server's authoritative value.
    ///
    /// The reply always wins: it arrived after anything buffered during
    /// the round trip, so the buffer is discarded. Confirming an untracked
    /// or already-confirmed message just adopts the authoritative value.
    pub fn confirm(&mut self, id: MessageId, authoritative: bool) {
        self.states.insert(id, LikeState::Confirmed(authoritative));
    }

    /// Settles a pending toggle that failed or was abandoned: the display
    /// rolls back to the pre-toggle value, unless a newer value was
    /// buffered during the round trip.
    ///
    /// No-op when the message is not pending.
    pub fn rollback(&mut self, id: MessageId) {
        if let Some(LikeState::Pending { rollback, buffered, .. }) = self.states.get(&id).copied() {
            self.states
                .insert(id, LikeState::Confirmed(buffered.unwrap_or(rollback)));
        }
    }

    /// The value currently displayed for `id`, if tracked.
    #[must_use]
    pub fn display(&self, id: MessageId) -> Option<bool> {
        self.states.get(&id).map(|state| match state {
            LikeState::Confirmed(v) => *v,
            LikeState::Pending { display, .. } => *display,
        })
    }

    /// True while a toggle round trip for `id` is in flight.
    #[must_use]
    pub fn is_pending(&self, id: MessageId) -> bool {
        matches!(self.states.get(&id), Some(LikeState::Pending { .. }))
    }
}
