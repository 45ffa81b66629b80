//! NewView: the message a validator sends when it leaves a view.

use crate::{signing, KeyPair, PublicKey, QuorumCertificate, Signature, View};
use serde::{Deserialize, Serialize};

/// Announces that the author has moved to `view` and hands the next proposer
/// the highest QC the author knows of.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewView {
    /// View the author is entering.
    pub view: View,

    /// Highest QC known to the author.
    pub highest_qc: QuorumCertificate,

    /// Validator that sent the message.
    pub author: PublicKey,

    /// Signature over the new-view message.
    pub signature: Signature,
}

impl NewView {
    /// Sign a NewView for `view` carrying `highest_qc`.
    pub fn new(signing_key: &KeyPair, view: View, highest_qc: QuorumCertificate) -> Self {
        let signature = signing_key.sign(&signing::new_view_message(
            view,
            &highest_qc.vertex_id,
            highest_qc.view,
        ));
        Self {
            view,
            highest_qc,
            author: signing_key.public_key(),
            signature,
        }
    }

    /// Check the author's signature.
    ///
    /// Does not verify the carried QC; that needs the epoch's validator set.
    pub fn verify(&self) -> bool {
        self.author.verify(
            &signing::new_view_message(self.view, &self.highest_qc.vertex_id, self.highest_qc.view),
            &self.signature,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Hash;

    #[test]
    fn test_signature_binds_qc() {
        let key = KeyPair::from_seed(&[3; 32]);
        let qc = QuorumCertificate::genesis(Hash::from_bytes(b"genesis"));
        let new_view = NewView::new(&key, View(2), qc);
        assert!(new_view.verify());

        let mut swapped = new_view.clone();
        swapped.highest_qc = QuorumCertificate::genesis(Hash::from_bytes(b"other"));
        assert!(!swapped.verify());

        let mut moved = new_view;
        moved.view = View(3);
        assert!(!moved.verify());
    }
}
