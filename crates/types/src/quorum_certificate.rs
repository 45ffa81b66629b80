//! Quorum certificate.

use crate::{signing, Hash, PublicKey, Signature, ValidatorSet, View};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Reasons a quorum certificate fails verification.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QcError {
    #[error("signer {0} is not in the validator set")]
    UnknownSigner(PublicKey),

    #[error("invalid signature from {0}")]
    InvalidSignature(PublicKey),

    #[error("insufficient voting power: {power} of {total}")]
    InsufficientPower { power: u64, total: u64 },

    #[error("genesis certificate must reference view 0 and carry no signatures")]
    MalformedGenesis,
}

/// Proof that a quorum of validators voted for a vertex at a view.
///
/// Signatures are collected individually and keyed by signer, so the signer
/// set is ordered and duplicate-free.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuorumCertificate {
    /// Vertex being certified.
    pub vertex_id: Hash,

    /// View the vertex was proposed in.
    pub view: View,

    /// Vote signatures, keyed by signer.
    pub signatures: BTreeMap<PublicKey, Signature>,
}

impl QuorumCertificate {
    /// Certificate for the genesis vertex.
    ///
    /// Carries no signatures and is valid under every validator set.
    pub fn genesis(genesis_vertex_id: Hash) -> Self {
        Self {
            vertex_id: genesis_vertex_id,
            view: View::GENESIS,
            signatures: BTreeMap::new(),
        }
    }

    /// Check if this certifies the genesis vertex.
    pub fn is_genesis(&self) -> bool {
        self.view.is_genesis()
    }

    /// Number of collected signatures.
    pub fn signer_count(&self) -> usize {
        self.signatures.len()
    }

    /// Combined voting power of signers that are members of `validators`.
    pub fn voting_power(&self, validators: &ValidatorSet) -> u64 {
        self.signatures
            .keys()
            .map(|key| validators.power_of(key))
            .sum()
    }

    /// Verify every signature and the quorum against `validators`.
    pub fn verify(&self, validators: &ValidatorSet) -> Result<(), QcError> {
        if self.is_genesis() {
            return if self.signatures.is_empty() {
                Ok(())
            } else {
                Err(QcError::MalformedGenesis)
            };
        }

        let message = signing::vote_message(self.view, &self.vertex_id);
        let mut power = 0u64;
        for (signer, signature) in &self.signatures {
            let signer_power = validators.power_of(signer);
            if signer_power == 0 {
                return Err(QcError::UnknownSigner(*signer));
            }
            if !signer.verify(&message, signature) {
                return Err(QcError::InvalidSignature(*signer));
            }
            power += signer_power;
        }

        if !validators.has_quorum(power) {
            return Err(QcError::InsufficientPower {
                power,
                total: validators.total_power(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{KeyPair, Validator};

    fn setup(n: u8) -> (Vec<KeyPair>, ValidatorSet) {
        let keys: Vec<KeyPair> = (1..=n).map(|i| KeyPair::from_seed(&[i; 32])).collect();
        let set = ValidatorSet::new(
            keys.iter()
                .map(|k| Validator::new(k.public_key(), 1))
                .collect(),
        )
        .unwrap();
        (keys, set)
    }

    fn signed_qc(keys: &[KeyPair], vertex_id: Hash, view: View) -> QuorumCertificate {
        let message = signing::vote_message(view, &vertex_id);
        QuorumCertificate {
            vertex_id,
            view,
            signatures: keys
                .iter()
                .map(|k| (k.public_key(), k.sign(&message)))
                .collect(),
        }
    }

    #[test]
    fn test_genesis_always_valid() {
        let (_, set) = setup(4);
        let qc = QuorumCertificate::genesis(Hash::from_bytes(b"genesis"));
        assert!(qc.is_genesis());
        assert_eq!(qc.verify(&set), Ok(()));
    }

    #[test]
    fn test_quorum_required() {
        let (keys, set) = setup(4);
        let vertex = Hash::from_bytes(b"vertex");

        let qc = signed_qc(&keys[..3], vertex, View(5));
        assert_eq!(qc.verify(&set), Ok(()));
        assert_eq!(qc.voting_power(&set), 3);

        let qc = signed_qc(&keys[..2], vertex, View(5));
        assert_eq!(
            qc.verify(&set),
            Err(QcError::InsufficientPower { power: 2, total: 4 })
        );
    }

    #[test]
    fn test_rejects_outsider_and_bad_signature() {
        let (keys, set) = setup(4);
        let outsider = KeyPair::from_seed(&[99; 32]);
        let vertex = Hash::from_bytes(b"vertex");

        let mut qc = signed_qc(&keys[..3], vertex, View(5));
        let message = signing::vote_message(View(5), &vertex);
        qc.signatures
            .insert(outsider.public_key(), outsider.sign(&message));
        assert_eq!(
            qc.verify(&set),
            Err(QcError::UnknownSigner(outsider.public_key()))
        );

        // Signatures over a different view do not certify this one
        let mut qc = signed_qc(&keys[..3], vertex, View(6));
        qc.view = View(5);
        assert!(matches!(qc.verify(&set), Err(QcError::InvalidSignature(_))));
    }
}
