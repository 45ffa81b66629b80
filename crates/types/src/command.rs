//! Opaque commands carried by vertices.

use crate::Hash;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Domain tag mixed into command identifiers.
const DOMAIN_COMMAND: &[u8] = b"bft_command:";

/// An opaque unit of work drawn from the mempool.
///
/// Consensus never looks inside the payload; it only orders commands and
/// hands them to the ledger on commit.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<u8>", into = "Vec<u8>")]
pub struct Command {
    id: Hash,
    payload: Vec<u8>,
}

impl Command {
    /// Create a command; the identifier is the hash of the payload.
    pub fn new(payload: Vec<u8>) -> Self {
        let id = Hash::from_parts(&[DOMAIN_COMMAND, &payload]);
        Self { id, payload }
    }

    pub fn id(&self) -> Hash {
        self.id
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }
}

impl From<Vec<u8>> for Command {
    fn from(payload: Vec<u8>) -> Self {
        Self::new(payload)
    }
}

impl From<Command> for Vec<u8> {
    fn from(command: Command) -> Self {
        command.payload
    }
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Command")
            .field("id", &self.id)
            .field("len", &self.payload.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_depends_only_on_payload() {
        let a = Command::new(b"transfer".to_vec());
        let b = Command::new(b"transfer".to_vec());
        let c = Command::new(b"mint".to_vec());

        assert_eq!(a.id(), b.id());
        assert_ne!(a.id(), c.id());
        assert_ne!(a.id(), Hash::from_bytes(b"transfer"));
    }
}
