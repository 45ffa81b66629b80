//! NewView aggregation for the pacemaker fast path.

use chainbft_types::{NewView, PublicKey, QuorumCertificate, ValidatorSet, View};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::debug;

#[derive(Debug)]
struct NewViewBucket {
    authors: BTreeSet<PublicKey>,
    power: u64,
    highest_qc: QuorumCertificate,
    complete: bool,
}

/// Collects NewView messages addressed to this node, per view.
///
/// Expects messages whose signatures were already checked by the caller.
#[derive(Debug)]
pub struct PendingNewViews {
    validators: Arc<ValidatorSet>,
    by_view: BTreeMap<View, NewViewBucket>,
}

impl PendingNewViews {
    pub fn new(validators: Arc<ValidatorSet>) -> Self {
        Self {
            validators,
            by_view: BTreeMap::new(),
        }
    }

    /// Add a NewView. Returns its view the first time the authors' combined
    /// power reaches quorum.
    pub fn insert(&mut self, new_view: &NewView) -> Option<View> {
        let power = self.validators.power_of(&new_view.author);
        if power == 0 {
            debug!(author = %new_view.author, "Ignoring NewView from non-validator");
            return None;
        }

        let bucket = self
            .by_view
            .entry(new_view.view)
            .or_insert_with(|| NewViewBucket {
                authors: BTreeSet::new(),
                power: 0,
                highest_qc: new_view.highest_qc.clone(),
                complete: false,
            });
        if new_view.highest_qc.view > bucket.highest_qc.view {
            bucket.highest_qc = new_view.highest_qc.clone();
        }
        if bucket.authors.insert(new_view.author) {
            bucket.power += power;
        }

        if bucket.complete || !self.validators.has_quorum(bucket.power) {
            return None;
        }
        bucket.complete = true;
        debug!(
            view = new_view.view.0,
            qc_view = bucket.highest_qc.view.0,
            "NewView quorum reached"
        );
        Some(new_view.view)
    }

    /// Highest QC carried by NewViews for `view`.
    pub fn highest_qc(&self, view: View) -> Option<&QuorumCertificate> {
        self.by_view.get(&view).map(|bucket| &bucket.highest_qc)
    }

    /// Drop everything for views below `view`.
    pub fn prune_below(&mut self, view: View) {
        self.by_view = self.by_view.split_off(&view);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chainbft_test_helpers::{certify, child_of, TestValidators};
    use chainbft_types::Vertex;

    #[test]
    fn test_quorum_emitted_once() {
        let validators = TestValidators::new(4);
        let mut pending = PendingNewViews::new(validators.shared_set());
        let genesis_qc = QuorumCertificate::genesis(Vertex::genesis().id());

        let nv = |i: usize| NewView::new(validators.key(i), View(3), genesis_qc.clone());

        assert_eq!(pending.insert(&nv(0)), None);
        assert_eq!(pending.insert(&nv(0)), None);
        assert_eq!(pending.insert(&nv(1)), None);
        assert_eq!(pending.insert(&nv(2)), Some(View(3)));
        assert_eq!(pending.insert(&nv(3)), None);
    }

    #[test]
    fn test_tracks_highest_qc() {
        let validators = TestValidators::new(4);
        let mut pending = PendingNewViews::new(validators.shared_set());
        let genesis = Vertex::genesis();
        let genesis_qc = QuorumCertificate::genesis(genesis.id());
        let vertex = child_of(&validators, &genesis, View(1), vec![]);
        let qc = certify(&validators, &vertex);

        pending.insert(&NewView::new(validators.key(0), View(3), genesis_qc.clone()));
        pending.insert(&NewView::new(validators.key(1), View(3), qc.clone()));
        pending.insert(&NewView::new(validators.key(2), View(3), genesis_qc));

        assert_eq!(pending.highest_qc(View(3)), Some(&qc));

        pending.prune_below(View(4));
        assert_eq!(pending.highest_qc(View(3)), None);
    }
}
