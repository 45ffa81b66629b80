//! Epoch management and the long-lived consensus services.

use crate::{
    BftConfig, EventCoordinator, Pacemaker, PendingNewViews, PendingVotes, ProposalGenerator,
    ProposerElection, RotatingLeaders, SafetyRules, SafetyRulesError, SafetyStateStore,
    ValidatingEventCoordinator, VertexStore,
};
use chainbft_core::Mempool;
use chainbft_types::{Epoch, KeyPair, PublicKey, QuorumCertificate, ValidatorSet, Vertex, View};
use std::sync::Arc;
use tracing::{info, warn};

/// Services that live for the whole node lifetime.
///
/// Owned by [`EpochManager`] and lent to the current coordinator for the
/// duration of each call. Their state carries across epoch changes.
#[derive(Debug)]
pub struct ConsensusServices {
    pub pacemaker: Pacemaker,
    pub vertex_store: VertexStore,
    pub safety_rules: SafetyRules,
    pub proposal_generator: ProposalGenerator,
    pub signing_key: KeyPair,

    /// Last view this node proposed in; at most one proposal per view.
    pub last_proposed_view: Option<View>,
}

impl ConsensusServices {
    /// Build the services from genesis, loading persisted safety state.
    ///
    /// Fails if the safety state cannot be trusted.
    pub fn new(
        config: &BftConfig,
        signing_key: KeyPair,
        safety_store: Box<dyn SafetyStateStore>,
        mempool: Arc<dyn Mempool>,
    ) -> Result<Self, SafetyRulesError> {
        let genesis = Vertex::genesis();
        let genesis_qc = QuorumCertificate::genesis(genesis.id());
        let safety_rules = SafetyRules::load(signing_key.clone(), safety_store)?;

        let mut pacemaker = Pacemaker::new(config, genesis_qc);
        // Resume past anything voted or timed out of before a restart
        let state = safety_rules.state();
        let resume_view = state.last_voted_view.max(state.last_timeout_view);
        if !resume_view.is_genesis() {
            pacemaker.skip_to(resume_view.next());
        }
        // The vertex store restarts at genesis, so the pacemaker does too
        if let Some(qc) = state.highest_qc.as_ref().filter(|qc| !qc.view.is_genesis()) {
            info!(
                qc_view = qc.view.0,
                vertex = ?qc.vertex_id,
                resume_view = pacemaker.current_view().0,
                "Persisted highest QC is not restored; waiting for a newer QC"
            );
        }

        Ok(Self {
            pacemaker,
            vertex_store: VertexStore::new(genesis),
            safety_rules,
            proposal_generator: ProposalGenerator::new(mempool, config.max_commands_per_vertex),
            signing_key,
            last_proposed_view: None,
        })
    }

    pub fn public_key(&self) -> PublicKey {
        self.signing_key.public_key()
    }
}

/// Builds one coordinator per epoch around the shared services.
#[derive(Debug)]
pub struct EpochManager {
    services: ConsensusServices,
    epoch: Epoch,
}

impl EpochManager {
    pub fn new(services: ConsensusServices) -> Self {
        Self {
            services,
            epoch: Epoch::default(),
        }
    }

    /// The coordinator to use before any validator set is known.
    pub fn start(&self) -> EventCoordinator {
        EventCoordinator::Empty
    }

    /// Build the coordinator for a new validator set.
    ///
    /// Proposer election and vote aggregation start fresh; pacemaker, vertex
    /// store and safety rules continue from where the last epoch left them.
    pub fn next_epoch(&mut self, validator_set: Arc<ValidatorSet>) -> EventCoordinator {
        self.epoch = self.epoch.next();
        let me = self.services.public_key();
        if !validator_set.contains(&me) {
            warn!(epoch = self.epoch.0, "Local key is not in the new validator set");
        }
        info!(
            epoch = self.epoch.0,
            validators = validator_set.len(),
            total_power = validator_set.total_power(),
            view = self.services.pacemaker.current_view().0,
            "Starting epoch"
        );

        let election =
            ProposerElection::Rotating(RotatingLeaders::from_validator_set(&validator_set));
        EventCoordinator::Validating(Box::new(ValidatingEventCoordinator::new(
            self.epoch,
            Arc::clone(&validator_set),
            election,
            PendingVotes::new(Arc::clone(&validator_set)),
            PendingNewViews::new(validator_set),
        )))
    }

    pub fn epoch(&self) -> Epoch {
        self.epoch
    }

    pub fn services(&self) -> &ConsensusServices {
        &self.services
    }

    pub fn services_mut(&mut self) -> &mut ConsensusServices {
        &mut self.services
    }
}
