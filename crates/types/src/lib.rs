//! Core types for chained BFT consensus.
//!
//! This crate provides the fundamental data types shared by every other
//! crate in the workspace:
//!
//! - **Primitives**: [`Hash`], [`KeyPair`], [`PublicKey`], [`Signature`]
//! - **Identifiers**: [`View`], [`Epoch`], [`VotePower`]
//! - **Validators**: [`Validator`], [`ValidatorSet`]
//! - **Consensus**: [`Vertex`], [`QuorumCertificate`], [`Vote`], [`NewView`],
//!   [`Command`], [`SafetyState`]
//!
//! All signed and hashed structures use the domain-separated messages in
//! [`signing`].

mod command;
mod crypto;
mod hash;
mod identifiers;
mod new_view;
mod quorum_certificate;
mod safety;
pub mod signing;
mod validator;
mod vertex;
mod vote;

pub use command::Command;
pub use crypto::{KeyPair, PublicKey, Signature, SIGNATURE_LENGTH};
pub use hash::{Hash, HexError};
pub use identifiers::{Epoch, View, VotePower};
pub use new_view::NewView;
pub use quorum_certificate::{QcError, QuorumCertificate};
pub use safety::SafetyState;
pub use validator::{Validator, ValidatorSet, ValidatorSetError};
pub use vertex::Vertex;
pub use vote::Vote;

/// Deterministic keys and validator sets for tests.
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils {
    use super::*;

    /// Keypair derived from a one-byte seed.
    pub fn test_keypair(seed: u8) -> KeyPair {
        KeyPair::from_seed(&[seed; 32])
    }

    /// `n` keypairs with seeds `1..=n` and an equal-power validator set over them.
    pub fn test_validators(n: u8) -> (Vec<KeyPair>, ValidatorSet) {
        let keys: Vec<KeyPair> = (1..=n).map(test_keypair).collect();
        let validators = keys
            .iter()
            .map(|k| Validator::new(k.public_key(), 1))
            .collect();
        let set = ValidatorSet::new(validators).expect("test validator set is valid");
        (keys, set)
    }
}
