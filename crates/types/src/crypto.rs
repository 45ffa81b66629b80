//! Validator key pairs and signatures.
//!
//! Consensus messages are signed with ED25519. The primitives themselves come
//! from `ed25519-dalek`; this module only wraps them in the value types the
//! protocol passes around.

use crate::Hash;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Length of an ED25519 signature in bytes.
pub const SIGNATURE_LENGTH: usize = 64;

/// A validator signing key.
#[derive(Clone)]
pub struct KeyPair(ed25519_dalek::SigningKey);

impl KeyPair {
    /// Generate a new random keypair.
    pub fn generate() -> Self {
        let mut csprng = rand::rngs::OsRng;
        KeyPair(ed25519_dalek::SigningKey::generate(&mut csprng))
    }

    /// Derive a keypair from a 32-byte seed.
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        KeyPair(ed25519_dalek::SigningKey::from_bytes(seed))
    }

    /// Sign a message.
    pub fn sign(&self, message: &[u8]) -> Signature {
        use ed25519_dalek::Signer;
        Signature(self.0.sign(message).to_bytes().to_vec())
    }

    /// Get the public key.
    pub fn public_key(&self) -> PublicKey {
        PublicKey(self.0.verifying_key().to_bytes())
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "KeyPair({:?})", self.public_key())
    }
}

/// A validator's public key.
///
/// Validators are identified by their key throughout consensus; there is no
/// separate numeric validator id.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PublicKey([u8; 32]);

impl PublicKey {
    /// Wrap raw ED25519 public key bytes.
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        PublicKey(bytes)
    }

    /// Raw key bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Stable identifier of this key, used to order validators.
    pub fn uid(&self) -> Hash {
        Hash::from_bytes(&self.0)
    }

    /// Verify a signature over `message`.
    ///
    /// Malformed keys or signatures verify as `false`.
    pub fn verify(&self, message: &[u8], signature: &Signature) -> bool {
        use ed25519_dalek::Verifier;
        let Ok(key) = ed25519_dalek::VerifyingKey::from_bytes(&self.0) else {
            return false;
        };
        let Ok(bytes) = <[u8; SIGNATURE_LENGTH]>::try_from(signature.as_bytes()) else {
            return false;
        };
        let sig = ed25519_dalek::Signature::from_bytes(&bytes);
        key.verify(message, &sig).is_ok()
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({}..)", &hex::encode(self.0)[..12])
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", &hex::encode(self.0)[..12])
    }
}

/// A detached ED25519 signature.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Signature(Vec<u8>);

impl Signature {
    /// Create a zero/placeholder signature for testing.
    pub fn zero() -> Self {
        Signature(vec![0u8; SIGNATURE_LENGTH])
    }

    /// Wrap raw signature bytes (length is checked on verification).
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Signature(bytes)
    }

    /// Get signature as byte slice.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hex = hex::encode(&self.0);
        write!(f, "Signature({}..)", &hex[..hex.len().min(16)])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_verify() {
        let keypair = KeyPair::generate();
        let signature = keypair.sign(b"vertex");
        assert!(keypair.public_key().verify(b"vertex", &signature));
        assert!(!keypair.public_key().verify(b"other", &signature));
    }

    #[test]
    fn test_verify_rejects_foreign_and_malformed_signatures() {
        let signer = KeyPair::generate();
        let other = KeyPair::generate();
        let signature = signer.sign(b"vote");

        assert!(!other.public_key().verify(b"vote", &signature));
        assert!(!signer.public_key().verify(b"vote", &Signature::zero()));
        assert!(!signer
            .public_key()
            .verify(b"vote", &Signature::from_bytes(vec![1, 2, 3])));
    }

    #[test]
    fn test_keypair_from_seed_is_deterministic() {
        let seed = [42u8; 32];
        let kp1 = KeyPair::from_seed(&seed);
        let kp2 = KeyPair::from_seed(&seed);

        assert_eq!(kp1.public_key(), kp2.public_key());
        assert_eq!(kp1.sign(b"test"), kp2.sign(b"test"));
        assert_eq!(kp1.public_key().uid(), kp2.public_key().uid());
    }
}
