//! Signed consensus fixtures.

use chainbft_types::test_utils::test_keypair;
use chainbft_types::{
    signing, Command, KeyPair, PublicKey, QuorumCertificate, Validator, ValidatorSet, Vertex,
    View, Vote,
};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Validators with their signing keys.
///
/// Key `i` is derived from seed `i + 1`, so fixtures are stable across runs.
#[derive(Debug, Clone)]
pub struct TestValidators {
    keys: Vec<KeyPair>,
    set: Arc<ValidatorSet>,
}

impl TestValidators {
    /// `n` validators with voting power 1 each.
    pub fn new(n: usize) -> Self {
        Self::weighted(&vec![1; n])
    }

    /// One validator per entry of `powers`.
    pub fn weighted(powers: &[u64]) -> Self {
        assert!(powers.len() < 200, "seed space exhausted");
        let keys: Vec<KeyPair> = (0..powers.len())
            .map(|i| test_keypair(i as u8 + 1))
            .collect();
        let validators = keys
            .iter()
            .zip(powers)
            .map(|(key, &power)| Validator::new(key.public_key(), power))
            .collect();
        let set = ValidatorSet::new(validators).expect("valid test validator set");
        Self {
            keys,
            set: Arc::new(set),
        }
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn key(&self, index: usize) -> &KeyPair {
        &self.keys[index]
    }

    pub fn keys(&self) -> &[KeyPair] {
        &self.keys
    }

    pub fn public_key(&self, index: usize) -> PublicKey {
        self.keys[index].public_key()
    }

    /// Index of the validator owning `key`.
    pub fn index_of(&self, key: &PublicKey) -> Option<usize> {
        self.keys.iter().position(|k| &k.public_key() == key)
    }

    pub fn set(&self) -> &ValidatorSet {
        &self.set
    }

    pub fn shared_set(&self) -> Arc<ValidatorSet> {
        Arc::clone(&self.set)
    }
}

/// A vote for `vertex` signed by validator `index`.
pub fn signed_vote(validators: &TestValidators, index: usize, vertex: &Vertex) -> Vote {
    Vote::new(validators.key(index), vertex.id(), vertex.view())
}

/// A QC for `vertex` signed by just enough validators, in index order, to
/// reach quorum. The genesis vertex gets the genesis QC.
pub fn certify(validators: &TestValidators, vertex: &Vertex) -> QuorumCertificate {
    if vertex.is_genesis() {
        return QuorumCertificate::genesis(vertex.id());
    }

    let message = signing::vote_message(vertex.view(), &vertex.id());
    let mut signatures = BTreeMap::new();
    let mut power = 0;
    for key in validators.keys() {
        if validators.set().has_quorum(power) {
            break;
        }
        power += validators.set().power_of(&key.public_key());
        signatures.insert(key.public_key(), key.sign(&message));
    }

    QuorumCertificate {
        vertex_id: vertex.id(),
        view: vertex.view(),
        signatures,
    }
}

/// A vertex at `view` whose parent QC certifies `parent`.
pub fn child_of(
    validators: &TestValidators,
    parent: &Vertex,
    view: View,
    commands: Vec<Command>,
) -> Vertex {
    Vertex::new(view, certify(validators, parent), commands)
}
