//! Domain-specific identifier types.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Consensus round number.
///
/// Views are scoped to an epoch in the protocol, but the node keeps one
/// monotonic counter across epochs so safety state never regresses.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct View(pub u64);

impl View {
    /// View of the genesis vertex.
    pub const GENESIS: Self = View(0);

    /// Get the next view.
    pub fn next(self) -> Self {
        View(self.0 + 1)
    }

    /// Get the previous view (returns None at genesis).
    pub fn prev(self) -> Option<Self> {
        self.0.checked_sub(1).map(View)
    }

    /// Check if this is the genesis view.
    pub fn is_genesis(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for View {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "View({})", self.0)
    }
}

/// Epoch counter; one epoch per accepted validator set.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Epoch(pub u64);

impl Epoch {
    /// Get the next epoch.
    pub fn next(self) -> Self {
        Epoch(self.0 + 1)
    }
}

impl fmt::Display for Epoch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Epoch({})", self.0)
    }
}

/// Vote power (stake weight).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VotePower(pub u64);

impl VotePower {
    /// Get the raw value.
    pub fn get(&self) -> u64 {
        self.0
    }

    /// Minimum power that constitutes a quorum of `total` (> 2/3).
    ///
    /// Computed in u128; `total` may be as large as `u64::MAX`.
    pub fn quorum_threshold(total: u64) -> u64 {
        let threshold = u128::from(total) * 2 / 3 + 1;
        // 2/3 of u64::MAX plus one still fits
        threshold as u64
    }

    /// Calculate if we have 2f+1 quorum (>2/3 of total).
    pub fn has_quorum(voted: u64, total: u64) -> bool {
        u128::from(voted) * 3 > u128::from(total) * 2
    }
}

impl fmt::Display for VotePower {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
