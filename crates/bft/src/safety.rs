//! Safety rules: the persisted gatekeeper for votes and timeouts.
//!
//! A validator must never vote twice in the same view. The only defence is
//! the [`SafetyState`] record, which is written through a
//! [`SafetyStateStore`] before any vote or NewView leaves this module.

use crate::VertexStore;
use chainbft_types::{
    KeyPair, NewView, PublicKey, QcError, QuorumCertificate, SafetyState, ValidatorSet, Vertex,
    View, Vote,
};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, info};

// ═══════════════════════════════════════════════════════════════════════════
// Persistence
// ═══════════════════════════════════════════════════════════════════════════

/// Errors reading or writing persisted safety state.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("safety state I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("safety state is corrupt: {0}")]
    Corrupt(String),

    #[error("safety state regressed: stored {stored:?} is behind backup {backup:?}")]
    Regression {
        stored: Box<SafetyState>,
        backup: Box<SafetyState>,
    },

    #[error("safety state write failed: {0}")]
    WriteFailed(String),
}

/// Durable storage for the safety state.
pub trait SafetyStateStore: Send {
    /// Read the persisted state, `None` if nothing was ever written.
    fn load(&self) -> Result<Option<SafetyState>, StoreError>;

    /// Durably write `state`. Must not return until the write survives a crash.
    fn persist(&mut self, state: &SafetyState) -> Result<(), StoreError>;
}

#[derive(Debug, Default)]
struct MemoryStoreInner {
    state: Option<SafetyState>,
    fail_writes: bool,
}

/// In-memory store. Clones share the same state, so a handle kept outside
/// [`SafetyRules`] observes every write.
#[derive(Debug, Clone, Default)]
pub struct MemorySafetyStore {
    inner: Arc<Mutex<MemoryStoreInner>>,
}

impl MemorySafetyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store that already holds `state`.
    pub fn with_state(state: SafetyState) -> Self {
        let store = Self::default();
        store.inner.lock().state = Some(state);
        store
    }

    /// The last persisted state.
    pub fn persisted(&self) -> Option<SafetyState> {
        self.inner.lock().state.clone()
    }

    /// Make subsequent writes fail.
    pub fn set_fail_writes(&self, fail: bool) {
        self.inner.lock().fail_writes = fail;
    }
}

impl SafetyStateStore for MemorySafetyStore {
    fn load(&self) -> Result<Option<SafetyState>, StoreError> {
        Ok(self.inner.lock().state.clone())
    }

    fn persist(&mut self, state: &SafetyState) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        if inner.fail_writes {
            return Err(StoreError::WriteFailed("injected failure".to_string()));
        }
        inner.state = Some(state.clone());
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Rules
// ═══════════════════════════════════════════════════════════════════════════

/// Startup failures. The node must not participate without a trusted state.
#[derive(Debug, thiserror::Error)]
pub enum SafetyRulesError {
    #[error("failed to load safety state: {0}")]
    Load(#[from] StoreError),
}

/// Reasons a vote or NewView is withheld.
///
/// Always local and non-fatal.
#[derive(Debug, thiserror::Error)]
pub enum SafetyViolation {
    #[error("view {view} is not above last voted view {last_voted}")]
    StaleView { view: View, last_voted: View },

    #[error("view {view} was already timed out of (last timeout {last_timeout})")]
    TimedOut { view: View, last_timeout: View },

    #[error("timeout for view {view} rejected (last voted {last_voted}, last timeout {last_timeout})")]
    StaleTimeout {
        view: View,
        last_voted: View,
        last_timeout: View,
    },

    #[error("genesis vertex cannot be voted for")]
    Genesis,

    #[error("parent QC references unknown vertex {0:?}")]
    UnknownParent(chainbft_types::Hash),

    #[error("parent QC is invalid: {0}")]
    InvalidQuorumCertificate(#[from] QcError),

    #[error("parent QC claims {qc_view} but parent vertex is at {parent_view}")]
    ParentViewMismatch { qc_view: View, parent_view: View },

    #[error("parent QC view {qc_view} is not below vertex view {view}")]
    ParentViewNotLower { qc_view: View, view: View },

    #[error("failed to persist safety state: {0}")]
    PersistenceFailed(#[source] StoreError),
}

/// Gatekeeps voting and timing out.
///
/// Owned by the epoch manager for the life of the node, so the monotonic-view
/// guarantee spans epoch changes.
pub struct SafetyRules {
    signing_key: KeyPair,
    state: SafetyState,
    store: Box<dyn SafetyStateStore>,
}

impl std::fmt::Debug for SafetyRules {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SafetyRules")
            .field("public_key", &self.signing_key.public_key())
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl SafetyRules {
    /// Load the persisted state, starting fresh only if none was ever written.
    pub fn load(
        signing_key: KeyPair,
        store: Box<dyn SafetyStateStore>,
    ) -> Result<Self, SafetyRulesError> {
        let state = match store.load()? {
            Some(state) => {
                info!(
                    last_voted_view = state.last_voted_view.0,
                    last_timeout_view = state.last_timeout_view.0,
                    "Loaded safety state"
                );
                state
            }
            None => {
                info!("No persisted safety state, starting fresh");
                SafetyState::default()
            }
        };

        Ok(Self {
            signing_key,
            state,
            store,
        })
    }

    pub fn state(&self) -> &SafetyState {
        &self.state
    }

    pub fn public_key(&self) -> PublicKey {
        self.signing_key.public_key()
    }

    /// Decide whether to vote for `vertex`.
    ///
    /// The updated state is persisted before the vote is signed; if the write
    /// fails no vote is produced.
    pub fn process_proposal(
        &mut self,
        vertex: &Vertex,
        validators: &ValidatorSet,
        vertices: &VertexStore,
    ) -> Result<Vote, SafetyViolation> {
        let view = vertex.view();
        if view <= self.state.last_voted_view {
            return Err(SafetyViolation::StaleView {
                view,
                last_voted: self.state.last_voted_view,
            });
        }
        if view <= self.state.last_timeout_view {
            return Err(SafetyViolation::TimedOut {
                view,
                last_timeout: self.state.last_timeout_view,
            });
        }

        let parent_qc = vertex.parent_qc().ok_or(SafetyViolation::Genesis)?;
        let parent = vertices
            .get(&parent_qc.vertex_id)
            .ok_or(SafetyViolation::UnknownParent(parent_qc.vertex_id))?;
        if parent.view() != parent_qc.view {
            return Err(SafetyViolation::ParentViewMismatch {
                qc_view: parent_qc.view,
                parent_view: parent.view(),
            });
        }
        // A QC the store already holds was verified when it was recorded
        if !vertices.is_certified(&parent_qc.vertex_id) {
            parent_qc.verify(validators)?;
        }
        if parent_qc.view >= view {
            return Err(SafetyViolation::ParentViewNotLower {
                qc_view: parent_qc.view,
                view,
            });
        }

        let mut next = self.state.clone();
        next.last_voted_view = view;
        Self::raise_highest_qc(&mut next, parent_qc);
        self.commit_state(next)?;

        debug!(vertex = ?vertex.id(), view = view.0, "Voting for vertex");
        Ok(Vote::new(&self.signing_key, vertex.id(), view))
    }

    /// Decide whether to time out of `view`.
    ///
    /// Returns a NewView for the following view carrying `highest_qc`.
    pub fn process_local_timeout(
        &mut self,
        view: View,
        highest_qc: &QuorumCertificate,
    ) -> Result<NewView, SafetyViolation> {
        if view < self.state.last_voted_view || view <= self.state.last_timeout_view {
            return Err(SafetyViolation::StaleTimeout {
                view,
                last_voted: self.state.last_voted_view,
                last_timeout: self.state.last_timeout_view,
            });
        }

        let mut next = self.state.clone();
        next.last_timeout_view = view;
        Self::raise_highest_qc(&mut next, highest_qc);
        self.commit_state(next)?;

        debug!(view = view.0, qc_view = highest_qc.view.0, "Timing out of view");
        Ok(NewView::new(
            &self.signing_key,
            view.next(),
            highest_qc.clone(),
        ))
    }

    fn raise_highest_qc(state: &mut SafetyState, qc: &QuorumCertificate) {
        if qc.view > state.highest_qc_view() || state.highest_qc.is_none() {
            state.highest_qc = Some(qc.clone());
        }
    }

    fn commit_state(&mut self, next: SafetyState) -> Result<(), SafetyViolation> {
        self.store
            .persist(&next)
            .map_err(SafetyViolation::PersistenceFailed)?;
        self.state = next;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chainbft_test_helpers::{certify, child_of, TestValidators};
    use tracing_test::traced_test;

    struct Fixture {
        validators: TestValidators,
        store: MemorySafetyStore,
        rules: SafetyRules,
        vertices: VertexStore,
    }

    fn fixture() -> Fixture {
        let validators = TestValidators::new(4);
        let store = MemorySafetyStore::new();
        let rules = SafetyRules::load(validators.key(0).clone(), Box::new(store.clone())).unwrap();
        Fixture {
            validators,
            store,
            rules,
            vertices: VertexStore::new(Vertex::genesis()),
        }
    }

    #[traced_test]
    #[test]
    fn test_votes_once_per_view() {
        let mut f = fixture();
        let genesis = Vertex::genesis();
        let a = child_of(&f.validators, &genesis, View(1), vec![]);
        let b = child_of(
            &f.validators,
            &genesis,
            View(1),
            vec![chainbft_types::Command::new(b"x".to_vec())],
        );

        let vote = f
            .rules
            .process_proposal(&a, f.validators.set(), &f.vertices)
            .unwrap();
        assert!(vote.verify());
        assert_eq!(vote.view, View(1));

        // Conflicting vertex in the same view
        assert!(matches!(
            f.rules.process_proposal(&b, f.validators.set(), &f.vertices),
            Err(SafetyViolation::StaleView { .. })
        ));
        // Same vertex again
        assert!(matches!(
            f.rules.process_proposal(&a, f.validators.set(), &f.vertices),
            Err(SafetyViolation::StaleView { .. })
        ));
    }

    #[traced_test]
    #[test]
    fn test_state_persisted_before_vote() {
        let mut f = fixture();
        let vertex = child_of(&f.validators, &Vertex::genesis(), View(3), vec![]);

        f.rules
            .process_proposal(&vertex, f.validators.set(), &f.vertices)
            .unwrap();
        assert_eq!(f.store.persisted().unwrap().last_voted_view, View(3));
    }

    #[traced_test]
    #[test]
    fn test_persistence_failure_withholds_vote() {
        let mut f = fixture();
        f.store.set_fail_writes(true);
        let vertex = child_of(&f.validators, &Vertex::genesis(), View(1), vec![]);

        assert!(matches!(
            f.rules.process_proposal(&vertex, f.validators.set(), &f.vertices),
            Err(SafetyViolation::PersistenceFailed(_))
        ));
        assert_eq!(f.rules.state().last_voted_view, View::GENESIS);

        f.store.set_fail_writes(false);
        assert!(f
            .rules
            .process_proposal(&vertex, f.validators.set(), &f.vertices)
            .is_ok());
    }

    #[traced_test]
    #[test]
    fn test_reload_keeps_last_voted_view() {
        let mut f = fixture();
        let vertex = child_of(&f.validators, &Vertex::genesis(), View(5), vec![]);
        f.rules
            .process_proposal(&vertex, f.validators.set(), &f.vertices)
            .unwrap();

        // Restart from the same store
        let mut reloaded =
            SafetyRules::load(f.validators.key(0).clone(), Box::new(f.store.clone())).unwrap();
        assert_eq!(reloaded.state().last_voted_view, View(5));
        assert!(matches!(
            reloaded.process_proposal(&vertex, f.validators.set(), &f.vertices),
            Err(SafetyViolation::StaleView { .. })
        ));
    }

    #[test]
    fn test_rejects_unknown_parent() {
        let mut f = fixture();
        let unknown = child_of(&f.validators, &Vertex::genesis(), View(1), vec![]);
        let vertex = child_of(&f.validators, &unknown, View(2), vec![]);

        assert!(matches!(
            f.rules.process_proposal(&vertex, f.validators.set(), &f.vertices),
            Err(SafetyViolation::UnknownParent(id)) if id == unknown.id()
        ));
        assert_eq!(f.store.persisted(), None);
    }

    #[test]
    fn test_rejects_invalid_parent_qc() {
        let mut f = fixture();
        let parent = child_of(&f.validators, &Vertex::genesis(), View(1), vec![]);
        f.vertices.insert_vertex(parent.clone()).unwrap();

        // Only two of four validators signed
        let mut qc = certify(&f.validators, &parent);
        while qc.signatures.len() > 2 {
            let last = *qc.signatures.keys().next_back().unwrap();
            qc.signatures.remove(&last);
        }
        let vertex = Vertex::new(View(2), qc, vec![]);

        assert!(matches!(
            f.rules.process_proposal(&vertex, f.validators.set(), &f.vertices),
            Err(SafetyViolation::InvalidQuorumCertificate(
                QcError::InsufficientPower { .. }
            ))
        ));
    }

    #[test]
    fn test_rejects_genesis() {
        let mut f = fixture();
        assert!(matches!(
            f.rules
                .process_proposal(&Vertex::genesis(), f.validators.set(), &f.vertices),
            Err(SafetyViolation::StaleView { .. }) | Err(SafetyViolation::Genesis)
        ));
    }

    #[traced_test]
    #[test]
    fn test_timeout_discipline() {
        let mut f = fixture();
        let genesis_qc = QuorumCertificate::genesis(Vertex::genesis().id());

        let vertex = child_of(&f.validators, &Vertex::genesis(), View(4), vec![]);
        f.rules
            .process_proposal(&vertex, f.validators.set(), &f.vertices)
            .unwrap();

        // Below the voted view
        assert!(matches!(
            f.rules.process_local_timeout(View(3), &genesis_qc),
            Err(SafetyViolation::StaleTimeout { .. })
        ));

        // Timing out of the voted view itself is allowed, once
        let new_view = f.rules.process_local_timeout(View(4), &genesis_qc).unwrap();
        assert_eq!(new_view.view, View(5));
        assert!(new_view.verify());
        assert_eq!(f.store.persisted().unwrap().last_timeout_view, View(4));

        assert!(matches!(
            f.rules.process_local_timeout(View(4), &genesis_qc),
            Err(SafetyViolation::StaleTimeout { .. })
        ));

        // A timed-out view without a vote can no longer be voted in
        f.rules.process_local_timeout(View(6), &genesis_qc).unwrap();
        let late = child_of(&f.validators, &Vertex::genesis(), View(6), vec![]);
        assert!(matches!(
            f.rules.process_proposal(&late, f.validators.set(), &f.vertices),
            Err(SafetyViolation::TimedOut { .. })
        ));

        let next = child_of(&f.validators, &Vertex::genesis(), View(7), vec![]);
        assert!(f
            .rules
            .process_proposal(&next, f.validators.set(), &f.vertices)
            .is_ok());
    }
}
