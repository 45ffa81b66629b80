//! Event types for the consensus state machine.

use chainbft_messages::Proposal;
use chainbft_types::{NewView, ValidatorSet, View, Vote};
use std::sync::Arc;

/// All possible events a node can receive.
///
/// Events are **passive data** - they describe something that happened.
/// Producers on any thread push them into one channel; the dispatcher
/// consumes them in arrival order.
#[derive(Debug, Clone)]
pub enum Event {
    // ═══════════════════════════════════════════════════════════════════════
    // Epoch
    // ═══════════════════════════════════════════════════════════════════════
    /// A new validator set became authoritative.
    EpochChange { validator_set: Arc<ValidatorSet> },

    // ═══════════════════════════════════════════════════════════════════════
    // Timers
    // ═══════════════════════════════════════════════════════════════════════
    /// The pacemaker timer for `view` expired.
    LocalTimeout { view: View },

    // ═══════════════════════════════════════════════════════════════════════
    // Network Messages
    // ═══════════════════════════════════════════════════════════════════════
    /// Received a proposal from a leader.
    ProposalReceived { proposal: Proposal },

    /// Received a vote addressed to this node as next proposer.
    VoteReceived { vote: Vote },

    /// Received a NewView addressed to this node as next proposer.
    NewViewReceived { new_view: NewView },
}

impl Event {
    /// Get the event type name for telemetry.
    pub fn type_name(&self) -> &'static str {
        match self {
            Event::EpochChange { .. } => "EpochChange",
            Event::LocalTimeout { .. } => "LocalTimeout",
            Event::ProposalReceived { .. } => "ProposalReceived",
            Event::VoteReceived { .. } => "VoteReceived",
            Event::NewViewReceived { .. } => "NewViewReceived",
        }
    }

    /// Check if this event arrived from the network.
    pub fn is_network_message(&self) -> bool {
        matches!(
            self,
            Event::ProposalReceived { .. }
                | Event::VoteReceived { .. }
                | Event::NewViewReceived { .. }
        )
    }
}
