//! Validator set for one epoch.

use crate::{PublicKey, VotePower};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A single validator entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Validator {
    /// Key the validator signs consensus messages with.
    pub public_key: PublicKey,

    /// Voting power (stake weight).
    pub voting_power: u64,
}

impl Validator {
    /// Create a validator entry.
    pub fn new(public_key: PublicKey, voting_power: u64) -> Self {
        Self {
            public_key,
            voting_power,
        }
    }
}

/// Errors building a [`ValidatorSet`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidatorSetError {
    #[error("validator set is empty")]
    Empty,

    #[error("duplicate validator {0}")]
    Duplicate(PublicKey),

    #[error("validator {0} has zero voting power")]
    ZeroPower(PublicKey),

    #[error("total voting power overflows")]
    PowerOverflow,
}

/// Ordered set of validators authoritative for one epoch.
///
/// Immutable once constructed; shared by reference (usually behind an `Arc`)
/// between the epoch's coordinator, proposer election and vote aggregation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Validator>", into = "Vec<Validator>")]
pub struct ValidatorSet {
    validators: Vec<Validator>,
    index: HashMap<PublicKey, usize>,
    total_power: u64,
}

impl ValidatorSet {
    /// Build a validator set, rejecting empty sets, duplicate keys and
    /// zero-power entries.
    pub fn new(validators: Vec<Validator>) -> Result<Self, ValidatorSetError> {
        if validators.is_empty() {
            return Err(ValidatorSetError::Empty);
        }

        let mut index = HashMap::with_capacity(validators.len());
        let mut total_power: u64 = 0;
        for (i, validator) in validators.iter().enumerate() {
            if validator.voting_power == 0 {
                return Err(ValidatorSetError::ZeroPower(validator.public_key));
            }
            if index.insert(validator.public_key, i).is_some() {
                return Err(ValidatorSetError::Duplicate(validator.public_key));
            }
            total_power = total_power
                .checked_add(validator.voting_power)
                .ok_or(ValidatorSetError::PowerOverflow)?;
        }

        Ok(Self {
            validators,
            index,
            total_power,
        })
    }

    /// Validators in their given order.
    pub fn validators(&self) -> &[Validator] {
        &self.validators
    }

    /// Public keys in their given order.
    pub fn keys(&self) -> impl Iterator<Item = &PublicKey> {
        self.validators.iter().map(|v| &v.public_key)
    }

    pub fn len(&self) -> usize {
        self.validators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.validators.is_empty()
    }

    pub fn total_power(&self) -> u64 {
        self.total_power
    }

    /// Minimum voting power that constitutes a quorum.
    pub fn quorum_threshold(&self) -> u64 {
        VotePower::quorum_threshold(self.total_power)
    }

    /// Whether `power` is strictly more than two thirds of the total.
    pub fn has_quorum(&self, power: u64) -> bool {
        VotePower::has_quorum(power, self.total_power)
    }

    /// Voting power of `key`, zero if it is not a member.
    pub fn power_of(&self, key: &PublicKey) -> u64 {
        self.index
            .get(key)
            .map(|&i| self.validators[i].voting_power)
            .unwrap_or(0)
    }

    pub fn contains(&self, key: &PublicKey) -> bool {
        self.index.contains_key(key)
    }
}

impl TryFrom<Vec<Validator>> for ValidatorSet {
    type Error = ValidatorSetError;

    fn try_from(validators: Vec<Validator>) -> Result<Self, Self::Error> {
        Self::new(validators)
    }
}

impl From<ValidatorSet> for Vec<Validator> {
    fn from(set: ValidatorSet) -> Self {
        set.validators
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::KeyPair;

    fn key(seed: u8) -> PublicKey {
        KeyPair::from_seed(&[seed; 32]).public_key()
    }

    #[test]
    fn test_rejects_invalid_sets() {
        assert_eq!(ValidatorSet::new(vec![]), Err(ValidatorSetError::Empty));

        let a = key(1);
        assert_eq!(
            ValidatorSet::new(vec![Validator::new(a, 1), Validator::new(a, 2)]),
            Err(ValidatorSetError::Duplicate(a))
        );
        assert_eq!(
            ValidatorSet::new(vec![Validator::new(a, 0)]),
            Err(ValidatorSetError::ZeroPower(a))
        );
        assert_eq!(
            ValidatorSet::new(vec![
                Validator::new(a, u64::MAX),
                Validator::new(key(2), 1)
            ]),
            Err(ValidatorSetError::PowerOverflow)
        );
    }

    #[test]
    fn test_weighted_quorum() {
        let (a, b, c) = (key(1), key(2), key(3));
        let set = ValidatorSet::new(vec![
            Validator::new(a, 5),
            Validator::new(b, 3),
            Validator::new(c, 2),
        ])
        .unwrap();

        assert_eq!(set.total_power(), 10);
        assert_eq!(set.quorum_threshold(), 7);
        assert!(set.has_quorum(7));
        assert!(!set.has_quorum(6));

        assert_eq!(set.power_of(&b), 3);
        assert_eq!(set.power_of(&key(9)), 0);
        assert!(set.contains(&c));
        assert!(!set.contains(&key(9)));
        assert_eq!(set.keys().copied().collect::<Vec<_>>(), vec![a, b, c]);
    }

    #[test]
    fn test_quorum_with_maximal_total_power() {
        let third = u64::MAX / 3;
        let set = ValidatorSet::new(vec![
            Validator::new(key(1), third),
            Validator::new(key(2), third),
            Validator::new(key(3), third),
        ])
        .unwrap();

        assert_eq!(set.total_power(), u64::MAX);
        assert!(!set.has_quorum(third));
        assert!(!set.has_quorum(third * 2));
        assert!(set.has_quorum(u64::MAX));
        assert!(set.quorum_threshold() > third * 2);
    }

    #[test]
    fn test_serde_revalidates() {
        let a = key(1);
        let set = ValidatorSet::new(vec![Validator::new(a, 1)]).unwrap();
        let json = serde_json::to_string(&set).unwrap();
        let back: ValidatorSet = serde_json::from_str(&json).unwrap();
        assert_eq!(back, set);

        let bad = serde_json::to_string(&vec![Validator::new(a, 0)]).unwrap();
        assert!(serde_json::from_str::<ValidatorSet>(&bad).is_err());
    }
}
