//! Vote for a vertex.

use crate::{signing, Hash, KeyPair, PublicKey, Signature, View};
use serde::{Deserialize, Serialize};

/// A single validator's signed endorsement of (vertex, view).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vote {
    /// Vertex being voted for.
    pub vertex_id: Hash,

    /// View of the vertex.
    pub view: View,

    /// Validator that cast the vote.
    pub author: PublicKey,

    /// Signature over the vote message.
    pub signature: Signature,
}

impl Vote {
    /// Sign a vote for `vertex_id` at `view`.
    pub fn new(signing_key: &KeyPair, vertex_id: Hash, view: View) -> Self {
        let signature = signing_key.sign(&signing::vote_message(view, &vertex_id));
        Self {
            vertex_id,
            view,
            author: signing_key.public_key(),
            signature,
        }
    }

    /// Check the signature against the author's key.
    pub fn verify(&self) -> bool {
        self.author.verify(
            &signing::vote_message(self.view, &self.vertex_id),
            &self.signature,
        )
    }
}
