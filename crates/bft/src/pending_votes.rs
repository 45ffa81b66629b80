//! Vote aggregation into quorum certificates.

use chainbft_types::{Hash, PublicKey, QuorumCertificate, Signature, ValidatorSet, View, Vote};
use indexmap::IndexMap;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// Evidence of a validator voting for two vertices in one view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Equivocation {
    pub author: PublicKey,
    pub view: View,
    /// Vertex the author voted for first; this vote is the one counted.
    pub first: Hash,
    /// Conflicting vertex; this vote is discarded.
    pub second: Hash,
}

/// Partial signatures for one (view, vertex).
#[derive(Debug, Default)]
struct VoteBucket {
    signatures: BTreeMap<PublicKey, Signature>,
    power: u64,
}

/// Collects votes per (view, vertex) for one epoch.
///
/// Expects votes whose signatures were already checked by the caller.
#[derive(Debug)]
pub struct PendingVotes {
    validators: Arc<ValidatorSet>,

    /// Open buckets, in the order their first vote arrived.
    buckets: IndexMap<(View, Hash), VoteBucket>,

    /// Which vertex each author voted for in each view.
    votes_by_author: HashMap<(View, PublicKey), Hash>,

    /// Targets that already produced a QC.
    certified: HashSet<(View, Hash)>,

    equivocations: Vec<Equivocation>,
}

impl PendingVotes {
    pub fn new(validators: Arc<ValidatorSet>) -> Self {
        Self {
            validators,
            buckets: IndexMap::new(),
            votes_by_author: HashMap::new(),
            certified: HashSet::new(),
            equivocations: Vec::new(),
        }
    }

    /// Add a vote. Returns a QC the first time its target reaches quorum.
    pub fn accumulate(&mut self, vote: Vote) -> Option<QuorumCertificate> {
        let power = self.validators.power_of(&vote.author);
        if power == 0 {
            debug!(author = %vote.author, "Ignoring vote from non-validator");
            return None;
        }

        let key = (vote.view, vote.vertex_id);
        match self.votes_by_author.get(&(vote.view, vote.author)) {
            Some(first) if *first != vote.vertex_id => {
                let equivocation = Equivocation {
                    author: vote.author,
                    view: vote.view,
                    first: *first,
                    second: vote.vertex_id,
                };
                warn!(
                    author = %vote.author,
                    view = vote.view.0,
                    first = ?equivocation.first,
                    second = ?equivocation.second,
                    "Validator equivocated"
                );
                if !self.equivocations.contains(&equivocation) {
                    self.equivocations.push(equivocation);
                }
                return None;
            }
            Some(_) => {}
            None => {
                self.votes_by_author
                    .insert((vote.view, vote.author), vote.vertex_id);
            }
        }

        if self.certified.contains(&key) {
            trace!(view = vote.view.0, "Late vote for certified vertex");
            return None;
        }

        let bucket = self.buckets.entry(key).or_default();
        if bucket
            .signatures
            .insert(vote.author, vote.signature)
            .is_none()
        {
            bucket.power += power;
        }
        debug!(
            view = vote.view.0,
            vertex = ?vote.vertex_id,
            power = bucket.power,
            total = self.validators.total_power(),
            "Vote added"
        );

        if !self.validators.has_quorum(bucket.power) {
            return None;
        }

        let bucket = self.buckets.shift_remove(&key)?;
        self.certified.insert(key);
        debug!(view = vote.view.0, vertex = ?vote.vertex_id, "Quorum reached");
        Some(QuorumCertificate {
            vertex_id: vote.vertex_id,
            view: vote.view,
            signatures: bucket.signatures,
        })
    }

    /// Abandon everything for views below `view`.
    pub fn prune_below(&mut self, view: View) {
        self.buckets.retain(|(v, _), _| *v >= view);
        self.votes_by_author.retain(|(v, _), _| *v >= view);
        self.certified.retain(|(v, _)| *v >= view);
    }

    /// Recorded equivocations, oldest first.
    pub fn equivocations(&self) -> &[Equivocation] {
        &self.equivocations
    }

    /// Number of open buckets.
    pub fn pending_count(&self) -> usize {
        self.buckets.len()
    }
}
