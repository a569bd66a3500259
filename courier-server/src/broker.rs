//! Delivery broker: routes created and mutated messages to the live
//! sessions of their participants.
//!
//! One `publish` call pushes at most one event per reachable participant
//! channel. Participants without a registered session are skipped
//! silently — there is no offline queueing; a reconnecting client
//! re-synchronizes through the history query. A failed push is logged and
//! reported in the [`PublishReport`] but never retried, and the registry
//! entry is left for disconnect handling to clean up.

use std::sync::Arc;

use courier_proto::message::{Message, PrincipalId};
use courier_proto::wire::{EventKind, ServerFrame};

use crate::presence::PresenceRegistry;

/// Outcome of one `publish` call, per participant.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PublishReport {
    /// Participants whose channel accepted the event.
    pub delivered: Vec<PrincipalId>,
    /// Participants with no registered session; event dropped silently.
    pub unreachable: Vec<PrincipalId>,
    /// Participants whose channel rejected the push (writer gone).
    pub failed: Vec<PrincipalId>,
}

/// Routes serialized events to participant sessions via the presence
/// registry.
#[derive(Debug, Clone)]
pub struct DeliveryBroker {
    registry: Arc<PresenceRegistry>,
}

impl DeliveryBroker {
    /// Creates a broker over the given registry.
    #[must_use]
    pub fn new(registry: Arc<PresenceRegistry>) -> Self {
        Self { registry }
    }

    /// Pushes one `Event { kind, message }` frame to each participant of
    /// the message that currently has a live session.
    ///
    /// Per-destination ordering: frames pushed into one session channel
    /// arrive in push order. No ordering is guaranteed across different
    /// principals or concurrent publishers.
    pub async fn publish(&self, kind: EventKind, message: &Message) -> PublishReport {
        let mut report = PublishReport::default();

        // sender != recipient holds for every stored message, so the two
        // destinations are distinct and each gets the event at most once.
        for principal in [&message.sender, &message.recipient] {
            match self.registry.lookup(principal).await {
                Some(channel) => {
                    let frame = ServerFrame::Event {
                        kind,
                        message: message.clone(),
                    };
                    if channel.push(frame).is_ok() {
                        report.delivered.push(principal.clone());
                    } else {
                        // Non-fatal: the persisted mutation stands, and the
                        // registry entry stays until disconnect handling
                        // removes it.
                        tracing::warn!(
                            principal = %principal,
                            message_id = %message.id,
                            kind = %kind,
                            "event push failed, channel closed"
                        );
                        report.failed.push(principal.clone());
                    }
                }
                None => {
                    tracing::debug!(
                        principal = %principal,
                        message_id = %message.id,
                        kind = %kind,
                        "participant not reachable, event dropped"
                    );
                    report.unreachable.push(principal.clone());
                }
            }
        }

        report
    }
}
