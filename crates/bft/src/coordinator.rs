//! Per-epoch event coordinators.
//!
//! # Protocol
//!
//! Each view repeats the same cycle:
//!
//! - The view's leader proposes a vertex extending its highest QC
//! - Validators store it, check it with [`SafetyRules`](crate::SafetyRules),
//!   and vote to the leader of the next view
//! - The next leader aggregates votes into a QC, advances, and proposes once
//!   it holds the certified vertex
//! - If the view stalls, the local timeout fires and validators send a
//!   NewView carrying their highest QC to the next leader, which proposes as
//!   soon as a quorum of NewViews arrives
//!
//! Coordinators hold only per-epoch state. The long-lived services are lent
//! in as `&mut ConsensusServices` for each call.

use crate::{ConsensusServices, PendingNewViews, PendingVotes, ProposerElection};
use chainbft_core::{Action, Event, OutboundMessage};
use chainbft_messages::{NewViewMessage, Proposal, VoteMessage};
use chainbft_types::{
    Epoch, NewView, PublicKey, QuorumCertificate, ValidatorSet, Vertex, View, Vote,
};
use std::sync::Arc;
use tracing::{debug, info, instrument, trace, warn};

/// The coordinator for the current epoch.
#[derive(Debug)]
pub enum EventCoordinator {
    /// No validator set known yet. Every event is dropped.
    Empty,

    /// Participating in an epoch.
    Validating(Box<ValidatingEventCoordinator>),
}

impl EventCoordinator {
    /// Epoch this coordinator serves, `None` before the first epoch.
    pub fn epoch(&self) -> Option<Epoch> {
        match self {
            EventCoordinator::Empty => None,
            EventCoordinator::Validating(coordinator) => Some(coordinator.epoch),
        }
    }

    pub fn on_epoch_start(&mut self, services: &mut ConsensusServices) -> Vec<Action> {
        match self {
            EventCoordinator::Empty => vec![],
            EventCoordinator::Validating(c) => c.on_epoch_start(services),
        }
    }

    pub fn process_proposal(
        &mut self,
        proposal: Proposal,
        services: &mut ConsensusServices,
    ) -> Vec<Action> {
        match self {
            EventCoordinator::Empty => {
                debug!(view = proposal.view().0, "No epoch yet, dropping proposal");
                vec![]
            }
            EventCoordinator::Validating(c) => c.process_proposal(proposal, services),
        }
    }

    pub fn process_vote(&mut self, vote: Vote, services: &mut ConsensusServices) -> Vec<Action> {
        match self {
            EventCoordinator::Empty => {
                debug!(view = vote.view.0, "No epoch yet, dropping vote");
                vec![]
            }
            EventCoordinator::Validating(c) => c.process_vote(vote, services),
        }
    }

    pub fn process_local_timeout(
        &mut self,
        view: View,
        services: &mut ConsensusServices,
    ) -> Vec<Action> {
        match self {
            EventCoordinator::Empty => {
                debug!(view = view.0, "No epoch yet, dropping local timeout");
                vec![]
            }
            EventCoordinator::Validating(c) => c.process_local_timeout(view, services),
        }
    }

    pub fn process_new_view(
        &mut self,
        new_view: NewView,
        services: &mut ConsensusServices,
    ) -> Vec<Action> {
        match self {
            EventCoordinator::Empty => {
                debug!(view = new_view.view.0, "No epoch yet, dropping NewView");
                vec![]
            }
            EventCoordinator::Validating(c) => c.process_new_view(new_view, services),
        }
    }
}

/// Runs the proposal/vote/timeout protocol for one epoch.
#[derive(Debug)]
pub struct ValidatingEventCoordinator {
    epoch: Epoch,
    validators: Arc<ValidatorSet>,
    election: ProposerElection,
    pending_votes: PendingVotes,
    pending_new_views: PendingNewViews,
}

impl ValidatingEventCoordinator {
    pub fn new(
        epoch: Epoch,
        validators: Arc<ValidatorSet>,
        election: ProposerElection,
        pending_votes: PendingVotes,
        pending_new_views: PendingNewViews,
    ) -> Self {
        Self {
            epoch,
            validators,
            election,
            pending_votes,
            pending_new_views,
        }
    }

    pub fn validators(&self) -> &ValidatorSet {
        &self.validators
    }

    pub fn election(&self) -> &ProposerElection {
        &self.election
    }

    pub fn pending_votes(&self) -> &PendingVotes {
        &self.pending_votes
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Handlers
    // ═══════════════════════════════════════════════════════════════════════════

    /// Arm the timer for the current view and propose if this node leads it.
    pub fn on_epoch_start(&mut self, services: &mut ConsensusServices) -> Vec<Action> {
        let mut actions = vec![Self::schedule_timeout(services)];
        actions.extend(self.try_propose(services));
        actions
    }

    #[instrument(skip_all, fields(epoch = self.epoch.0, view = proposal.view().0))]
    pub fn process_proposal(
        &mut self,
        proposal: Proposal,
        services: &mut ConsensusServices,
    ) -> Vec<Action> {
        let view = proposal.view();
        if !proposal.verify() {
            debug!(proposer = %proposal.proposer, "Dropping proposal with invalid signature");
            return vec![];
        }
        let expected = self.election.proposer(view);
        if &proposal.proposer != expected {
            warn!(
                proposer = %proposal.proposer,
                expected = %expected,
                "Dropping proposal from non-leader"
            );
            return vec![];
        }
        let vertex = proposal.into_vertex();
        let Some(parent_qc) = vertex.parent_qc().cloned() else {
            debug!("Dropping proposal for a genesis vertex");
            return vec![];
        };
        if !self.is_valid_qc(&parent_qc, services) {
            debug!(parent = ?parent_qc.vertex_id, "Dropping proposal with invalid parent QC");
            return vec![];
        }

        // Stored even when stale or not voted for, so later vertices can
        // extend it
        let vertex_id = vertex.id();
        let mut actions = match services.vertex_store.insert_vertex(vertex.clone()) {
            Ok(committed) => Self::commit_actions(committed, services),
            Err(error) => {
                debug!(%error, "Dropping proposal that cannot be stored");
                return vec![];
            }
        };

        // Votes for this vertex may have formed a QC before it arrived
        let certified_early = services.pacemaker.highest_qc().vertex_id == vertex_id;
        if certified_early {
            let qc = services.pacemaker.highest_qc().clone();
            let committed = services.vertex_store.add_qc(qc);
            actions.extend(Self::commit_actions(committed, services));
        }
        if let Some(new_view) = services.pacemaker.process_qc(&parent_qc) {
            actions.push(self.on_view_advanced(new_view, services));
        }

        if view < services.pacemaker.current_view() {
            debug!(
                current_view = services.pacemaker.current_view().0,
                "Stored stale proposal without voting"
            );
        } else {
            match services.safety_rules.process_proposal(
                &vertex,
                &self.validators,
                &services.vertex_store,
            ) {
                Ok(vote) => {
                    let next_leader = *self.election.proposer(view.next());
                    actions.push(Self::route_vote(next_leader, vote, services));
                }
                Err(violation) => debug!(%violation, "Withholding vote"),
            }
        }

        if certified_early {
            actions.extend(self.try_propose(services));
        }
        actions
    }

    #[instrument(skip_all, fields(epoch = self.epoch.0, view = vote.view.0))]
    pub fn process_vote(&mut self, vote: Vote, services: &mut ConsensusServices) -> Vec<Action> {
        if !self.validators.contains(&vote.author) {
            debug!(author = %vote.author, "Dropping vote from non-validator");
            return vec![];
        }
        if self.election.proposer(vote.view.next()) != &services.public_key() {
            debug!(author = %vote.author, "Dropping vote not addressed to this node");
            return vec![];
        }
        if !vote.verify() {
            debug!(author = %vote.author, "Dropping vote with invalid signature");
            return vec![];
        }

        let Some(qc) = self.pending_votes.accumulate(vote) else {
            return vec![];
        };
        info!(
            vertex = ?qc.vertex_id,
            signers = qc.signer_count(),
            "Formed quorum certificate"
        );
        self.on_qc(qc, services)
    }

    #[instrument(skip_all, fields(epoch = self.epoch.0, view = view.0))]
    pub fn process_local_timeout(
        &mut self,
        view: View,
        services: &mut ConsensusServices,
    ) -> Vec<Action> {
        let Some(next) = services.pacemaker.process_local_timeout(view) else {
            return vec![];
        };
        let mut actions = vec![self.on_view_advanced(next, services)];

        let highest_qc = services.pacemaker.highest_qc().clone();
        match services
            .safety_rules
            .process_local_timeout(view, &highest_qc)
        {
            Ok(new_view) => {
                let leader = *self.election.proposer(new_view.view);
                actions.push(Self::route_new_view(leader, new_view, services));
            }
            Err(violation) => debug!(%violation, "Withholding NewView"),
        }
        actions
    }

    #[instrument(skip_all, fields(epoch = self.epoch.0, view = new_view.view.0))]
    pub fn process_new_view(
        &mut self,
        new_view: NewView,
        services: &mut ConsensusServices,
    ) -> Vec<Action> {
        if !self.validators.contains(&new_view.author) {
            debug!(author = %new_view.author, "Dropping NewView from non-validator");
            return vec![];
        }
        if !new_view.verify() {
            debug!(author = %new_view.author, "Dropping NewView with invalid signature");
            return vec![];
        }
        if !self.is_valid_qc(&new_view.highest_qc, services) {
            debug!(author = %new_view.author, "Dropping NewView with invalid QC");
            return vec![];
        }

        // Learn the QC whether or not this node is the addressee
        let qc = &new_view.highest_qc;
        let committed = services.vertex_store.add_qc(qc.clone());
        let mut actions = Self::commit_actions(committed, services);
        if let Some(advanced) = services.pacemaker.process_qc(qc) {
            actions.push(self.on_view_advanced(advanced, services));
        }

        if self.election.proposer(new_view.view) != &services.public_key() {
            trace!("NewView not addressed to this node");
            return actions;
        }
        if new_view.view < services.pacemaker.current_view() {
            debug!(
                current_view = services.pacemaker.current_view().0,
                "Ignoring stale NewView"
            );
            return actions;
        }

        let Some(view) = self.pending_new_views.insert(&new_view) else {
            return actions;
        };
        if let Some(advanced) = services.pacemaker.process_new_view_quorum(view) {
            actions.push(self.on_view_advanced(advanced, services));
        }
        actions.extend(self.try_propose(services));
        actions
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Internals
    // ═══════════════════════════════════════════════════════════════════════════

    fn on_qc(&mut self, qc: QuorumCertificate, services: &mut ConsensusServices) -> Vec<Action> {
        let committed = services.vertex_store.add_qc(qc.clone());
        let mut actions = Self::commit_actions(committed, services);
        if let Some(new_view) = services.pacemaker.process_qc(&qc) {
            actions.push(self.on_view_advanced(new_view, services));
        }
        actions.extend(self.try_propose(services));
        actions
    }

    /// Propose for the current view if this node leads it and has not yet
    /// proposed in it.
    fn try_propose(&mut self, services: &mut ConsensusServices) -> Vec<Action> {
        let view = services.pacemaker.current_view();
        let me = services.public_key();
        if self.election.proposer(view) != &me {
            return vec![];
        }
        if services.last_proposed_view.is_some_and(|last| last >= view) {
            trace!(view = view.0, "Already proposed in this view");
            return vec![];
        }

        let highest_qc = services.pacemaker.highest_qc().clone();
        if !services.vertex_store.contains(&highest_qc.vertex_id) {
            debug!(
                view = view.0,
                parent = ?highest_qc.vertex_id,
                "Deferring proposal until the certified vertex arrives"
            );
            return vec![];
        }
        let vertex =
            services
                .proposal_generator
                .generate(view, &highest_qc, &services.vertex_store);
        services.last_proposed_view = Some(view);
        info!(
            view = view.0,
            vertex = ?vertex.id(),
            parent_view = highest_qc.view.0,
            commands = vertex.commands().len(),
            "Proposing vertex"
        );

        let proposal = Proposal::new(&services.signing_key, vertex);
        let recipients: Vec<PublicKey> =
            self.validators.keys().filter(|k| **k != me).copied().collect();
        let mut actions = Vec::new();
        if !recipients.is_empty() {
            actions.push(Action::Broadcast {
                recipients,
                message: OutboundMessage::Proposal(Box::new(proposal.clone())),
            });
        }
        actions.extend(self.process_proposal(proposal, services));
        actions
    }

    fn on_view_advanced(&mut self, view: View, services: &ConsensusServices) -> Action {
        // The leader of `view` still collects votes for the view before it
        self.pending_votes
            .prune_below(view.prev().unwrap_or(View::GENESIS));
        self.pending_new_views.prune_below(view);
        Self::schedule_timeout(services)
    }

    fn schedule_timeout(services: &ConsensusServices) -> Action {
        Action::ScheduleTimeout {
            view: services.pacemaker.current_view(),
            duration: services.pacemaker.timeout(),
        }
    }

    /// QCs already recorded by the vertex store were verified when recorded.
    fn is_valid_qc(&self, qc: &QuorumCertificate, services: &ConsensusServices) -> bool {
        match services.vertex_store.certificate(&qc.vertex_id) {
            Some(known) if known.view == qc.view => true,
            _ => qc.verify(&self.validators).is_ok(),
        }
    }

    fn route_vote(to: PublicKey, vote: Vote, services: &ConsensusServices) -> Action {
        if to == services.public_key() {
            Action::EnqueueInternal {
                event: Event::VoteReceived { vote },
            }
        } else {
            Action::Send {
                to,
                message: OutboundMessage::Vote(VoteMessage::new(vote)),
            }
        }
    }

    fn route_new_view(to: PublicKey, new_view: NewView, services: &ConsensusServices) -> Action {
        if to == services.public_key() {
            Action::EnqueueInternal {
                event: Event::NewViewReceived { new_view },
            }
        } else {
            Action::Send {
                to,
                message: OutboundMessage::NewView(Box::new(NewViewMessage::new(new_view))),
            }
        }
    }

    fn commit_actions(
        committed: Vec<Arc<Vertex>>,
        services: &mut ConsensusServices,
    ) -> Vec<Action> {
        committed
            .into_iter()
            .map(|vertex| {
                services.proposal_generator.mark_committed(&vertex);
                Action::Commit { vertex }
            })
            .collect()
    }
}
