//! Proposer election: view → leader.

use chainbft_types::{PublicKey, ValidatorSet, View};

/// Errors building a proposer election.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ElectionError {
    #[error("rotating leader schedule needs at least one leader")]
    NoLeaders,
}

/// Maps each view to the validator allowed to propose in it.
///
/// Pure and deterministic: every honest node computes the same proposer for
/// the same view.
#[derive(Debug, Clone)]
pub enum ProposerElection {
    /// Round-robin over a fixed leader order.
    Rotating(RotatingLeaders),

    /// One fixed proposer for every view. Bootstrap and tests only.
    Dictator(Dictatorship),
}

impl ProposerElection {
    /// The proposer for `view`.
    pub fn proposer(&self, view: View) -> &PublicKey {
        match self {
            ProposerElection::Rotating(rotating) => rotating.proposer(view),
            ProposerElection::Dictator(dictator) => dictator.proposer(view),
        }
    }
}

/// Round-robin leader schedule: `leaders[view mod N]`.
#[derive(Debug, Clone)]
pub struct RotatingLeaders {
    leaders: Vec<PublicKey>,
}

impl RotatingLeaders {
    /// Schedule over `leaders` in the given order.
    pub fn new(leaders: Vec<PublicKey>) -> Result<Self, ElectionError> {
        if leaders.is_empty() {
            return Err(ElectionError::NoLeaders);
        }
        Ok(Self { leaders })
    }

    /// Schedule over every member of `validators`, sorted by key identifier.
    pub fn from_validator_set(validators: &ValidatorSet) -> Self {
        let mut leaders: Vec<PublicKey> = validators.keys().copied().collect();
        leaders.sort_by_cached_key(PublicKey::uid);
        // ValidatorSet is never empty
        Self { leaders }
    }

    pub fn proposer(&self, view: View) -> &PublicKey {
        let index = view.0 % self.leaders.len() as u64;
        &self.leaders[index as usize]
    }

    /// Leaders in schedule order.
    pub fn leaders(&self) -> &[PublicKey] {
        &self.leaders
    }
}

/// A single proposer regardless of view.
#[derive(Debug, Clone)]
pub struct Dictatorship {
    dictator: PublicKey,
}

impl Dictatorship {
    pub fn new(dictator: PublicKey) -> Self {
        Self { dictator }
    }

    pub fn proposer(&self, _view: View) -> &PublicKey {
        &self.dictator
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chainbft_types::test_utils::{test_keypair, test_validators};

    #[test]
    fn test_rotating_wraps_around() {
        let a = test_keypair(1).public_key();
        let b = test_keypair(2).public_key();
        let election = ProposerElection::Rotating(RotatingLeaders::new(vec![a, b]).unwrap());

        assert_eq!(election.proposer(View(0)), &a);
        assert_eq!(election.proposer(View(1)), &b);
        assert_eq!(election.proposer(View(2)), &a);
        assert_eq!(election.proposer(View(3)), &b);
    }

    #[test]
    fn test_rotating_rejects_empty() {
        assert_eq!(
            RotatingLeaders::new(vec![]).unwrap_err(),
            ElectionError::NoLeaders
        );
    }

    #[test]
    fn test_from_validator_set_sorts_by_uid() {
        let (_, set) = test_validators(5);
        let rotating = RotatingLeaders::from_validator_set(&set);

        let uids: Vec<_> = rotating.leaders().iter().map(PublicKey::uid).collect();
        let mut sorted = uids.clone();
        sorted.sort();
        assert_eq!(uids, sorted);
        assert_eq!(rotating.leaders().len(), 5);

        // Independent of the order the set was given in
        let mut reversed: Vec<_> = set.validators().to_vec();
        reversed.reverse();
        let reversed = ValidatorSet::new(reversed).unwrap();
        assert_eq!(
            RotatingLeaders::from_validator_set(&reversed).leaders(),
            rotating.leaders()
        );
    }

    #[test]
    fn test_dictator_ignores_view() {
        let d = test_keypair(7).public_key();
        let election = ProposerElection::Dictator(Dictatorship::new(d));

        for view in [0, 1, 1000] {
            assert_eq!(election.proposer(View(view)), &d);
        }
    }
}
