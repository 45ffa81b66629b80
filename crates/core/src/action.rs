//! Action types for the consensus state machine.

use crate::message::OutboundMessage;
use crate::Event;
use chainbft_types::{PublicKey, Vertex, View};
use std::sync::Arc;
use std::time::Duration;

/// Actions the state machine wants to perform.
///
/// Actions are **commands** - they describe something to do.
/// The runner executes them against the network, ledger, mempool and timers.
#[derive(Debug, Clone)]
pub enum Action {
    // ═══════════════════════════════════════════════════════════════════════
    // Network
    // ═══════════════════════════════════════════════════════════════════════
    /// Send a message to one validator.
    Send {
        to: PublicKey,
        message: OutboundMessage,
    },

    /// Send a message to each of `recipients`.
    Broadcast {
        recipients: Vec<PublicKey>,
        message: OutboundMessage,
    },

    // ═══════════════════════════════════════════════════════════════════════
    // Commit
    // ═══════════════════════════════════════════════════════════════════════
    /// A vertex committed. Deliver it to the ledger and clear its commands
    /// from the mempool. Emitted in view order, once per vertex.
    Commit { vertex: Arc<Vertex> },

    // ═══════════════════════════════════════════════════════════════════════
    // Timers
    // ═══════════════════════════════════════════════════════════════════════
    /// Arm the local-timeout timer for `view`, replacing any armed timer.
    ScheduleTimeout { view: View, duration: Duration },

    // ═══════════════════════════════════════════════════════════════════════
    // Internal
    // ═══════════════════════════════════════════════════════════════════════
    /// Deliver an event to this node, e.g. a vote addressed to itself as next
    /// proposer. Processed before the next external event.
    EnqueueInternal { event: Event },
}

impl Action {
    /// Get the action type name for telemetry.
    pub fn type_name(&self) -> &'static str {
        match self {
            Action::Send { .. } => "Send",
            Action::Broadcast { .. } => "Broadcast",
            Action::Commit { .. } => "Commit",
            Action::ScheduleTimeout { .. } => "ScheduleTimeout",
            Action::EnqueueInternal { .. } => "EnqueueInternal",
        }
    }

    /// The outbound message carried by this action, if any.
    pub fn message(&self) -> Option<&OutboundMessage> {
        match self {
            Action::Send { message, .. } | Action::Broadcast { message, .. } => Some(message),
            _ => None,
        }
    }
}
