//! Persisted safety state.

use crate::{QuorumCertificate, View};
use serde::{Deserialize, Serialize};

/// Per-validator record that prevents equivocation.
///
/// Must be durable across restarts and epoch changes: views recorded here
/// never decrease.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SafetyState {
    /// Highest view this validator has voted in.
    pub last_voted_view: View,

    /// Highest view this validator has timed out of.
    pub last_timeout_view: View,

    /// Highest QC seen when the state was last written.
    ///
    /// Kept for regression checks and restart diagnostics. It is not handed
    /// back to the pacemaker: vertices are not persisted, and a node cannot
    /// propose on a QC whose vertex it does not hold.
    pub highest_qc: Option<QuorumCertificate>,
}

impl SafetyState {
    /// View of the stored highest QC, genesis if none.
    pub fn highest_qc_view(&self) -> View {
        self.highest_qc
            .as_ref()
            .map(|qc| qc.view)
            .unwrap_or(View::GENESIS)
    }

    /// Whether `self` is behind `other` in any monotonic field.
    pub fn regresses_from(&self, other: &SafetyState) -> bool {
        self.last_voted_view < other.last_voted_view
            || self.last_timeout_view < other.last_timeout_view
            || self.highest_qc_view() < other.highest_qc_view()
    }
}
