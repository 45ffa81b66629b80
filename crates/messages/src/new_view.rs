//! NewView message.

use crate::NetworkMessage;
use chainbft_types::NewView;
use serde::{Deserialize, Serialize};

/// A NewView sent to the proposer of the view being entered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewViewMessage {
    /// The NewView being sent
    pub new_view: NewView,
}

impl NewViewMessage {
    pub fn new(new_view: NewView) -> Self {
        Self { new_view }
    }

    /// Get the inner NewView.
    pub fn new_view(&self) -> &NewView {
        &self.new_view
    }

    /// Consume and return the inner NewView.
    pub fn into_new_view(self) -> NewView {
        self.new_view
    }
}

impl NetworkMessage for NewViewMessage {
    fn message_type_id() -> &'static str {
        "consensus.new_view"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Proposal, VoteMessage};

    #[test]
    fn test_message_type_ids_are_distinct() {
        let ids = [
            Proposal::message_type_id(),
            VoteMessage::message_type_id(),
            NewViewMessage::message_type_id(),
        ];
        assert_ne!(ids[0], ids[1]);
        assert_ne!(ids[1], ids[2]);
        assert_ne!(ids[0], ids[2]);
    }
}
