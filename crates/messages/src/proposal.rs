//! Proposal message.

use crate::NetworkMessage;
use chainbft_types::{signing, KeyPair, PublicKey, Signature, Vertex, View};
use serde::{Deserialize, Serialize};

/// A vertex proposed by the leader of its view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proposal {
    /// The proposed vertex
    pub vertex: Vertex,

    /// Validator that proposed it
    pub proposer: PublicKey,

    /// Proposer's signature over the vertex id
    pub signature: Signature,
}

impl Proposal {
    /// Sign `vertex` as its proposer.
    pub fn new(signing_key: &KeyPair, vertex: Vertex) -> Self {
        let signature =
            signing_key.sign(&signing::proposal_message(vertex.view(), &vertex.id()));
        Self {
            vertex,
            proposer: signing_key.public_key(),
            signature,
        }
    }

    /// View the vertex was proposed in.
    pub fn view(&self) -> View {
        self.vertex.view()
    }

    /// Check the proposer's signature.
    pub fn verify(&self) -> bool {
        self.proposer.verify(
            &signing::proposal_message(self.vertex.view(), &self.vertex.id()),
            &self.signature,
        )
    }

    /// Consume and return the inner vertex.
    pub fn into_vertex(self) -> Vertex {
        self.vertex
    }
}

impl NetworkMessage for Proposal {
    fn message_type_id() -> &'static str {
        "consensus.proposal"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chainbft_types::test_utils::test_keypair;
    use chainbft_types::{Command, QuorumCertificate};

    fn vertex() -> Vertex {
        Vertex::new(
            View(1),
            QuorumCertificate::genesis(Vertex::genesis().id()),
            vec![Command::new(b"cmd".to_vec())],
        )
    }

    #[test]
    fn test_proposal_signature() {
        let key = test_keypair(1);
        let proposal = Proposal::new(&key, vertex());

        assert!(proposal.verify());
        assert_eq!(proposal.proposer, key.public_key());
        assert_eq!(proposal.view(), View(1));
    }

    #[test]
    fn test_proposal_with_foreign_proposer_fails() {
        let mut proposal = Proposal::new(&test_keypair(1), vertex());
        proposal.proposer = test_keypair(2).public_key();
        assert!(!proposal.verify());
    }

    #[test]
    fn test_proposal_survives_json() {
        let proposal = Proposal::new(&test_keypair(1), vertex());
        let json = serde_json::to_vec(&proposal).unwrap();
        let decoded: Proposal = serde_json::from_slice(&json).unwrap();
        assert!(decoded.verify());
        assert_eq!(decoded.vertex.id(), proposal.vertex.id());
    }
}
