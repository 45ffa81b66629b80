//! Outbound message types for network communication.

use chainbft_messages::{NewViewMessage, Proposal, VoteMessage};

/// Outbound network messages.
///
/// These are the messages that a node can send to other validators.
/// The runner handles the actual network I/O.
#[derive(Debug, Clone)]
pub enum OutboundMessage {
    /// Vertex proposal from the view's leader.
    Proposal(Box<Proposal>),

    /// Vote to the proposer of the next view.
    Vote(VoteMessage),

    /// NewView to the proposer of the view being entered.
    NewView(Box<NewViewMessage>),
}

impl OutboundMessage {
    /// Get a human-readable name for this message type.
    pub fn type_name(&self) -> &'static str {
        match self {
            OutboundMessage::Proposal(_) => "Proposal",
            OutboundMessage::Vote(_) => "Vote",
            OutboundMessage::NewView(_) => "NewView",
        }
    }
}
