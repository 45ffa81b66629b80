//! Vote message.

use crate::NetworkMessage;
use chainbft_types::Vote;
use serde::{Deserialize, Serialize};

/// A vote sent to the proposer of the next view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteMessage {
    /// The vote being sent
    pub vote: Vote,
}

impl VoteMessage {
    pub fn new(vote: Vote) -> Self {
        Self { vote }
    }

    /// Get the inner vote.
    pub fn vote(&self) -> &Vote {
        &self.vote
    }

    /// Consume and return the inner vote.
    pub fn into_vote(self) -> Vote {
        self.vote
    }
}

impl NetworkMessage for VoteMessage {
    fn message_type_id() -> &'static str {
        "consensus.vote"
    }
}
