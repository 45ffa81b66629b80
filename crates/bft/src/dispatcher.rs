//! Single-threaded event dispatch.

use crate::{ConsensusServices, EpochManager, EventCoordinator};
use chainbft_core::{Action, Event, StateMachine};
use tracing::{info, trace};

/// Routes every event to the current coordinator, one at a time, in arrival
/// order.
///
/// Epoch changes swap the coordinator between two events, so no event is
/// ever split across coordinators.
#[derive(Debug)]
pub struct Dispatcher {
    epoch_manager: EpochManager,
    coordinator: EventCoordinator,
}

impl Dispatcher {
    pub fn new(epoch_manager: EpochManager) -> Self {
        let coordinator = epoch_manager.start();
        Self {
            epoch_manager,
            coordinator,
        }
    }

    /// Process one event and return the actions it produced.
    pub fn dispatch(&mut self, event: Event) -> Vec<Action> {
        trace!(event = event.type_name(), "Dispatching event");
        self.epoch_manager
            .services_mut()
            .proposal_generator
            .begin_event();
        let actions = match event {
            Event::EpochChange { validator_set } => {
                self.coordinator = self.epoch_manager.next_epoch(validator_set);
                info!(epoch = ?self.coordinator.epoch(), "Coordinator swapped");
                self.coordinator
                    .on_epoch_start(self.epoch_manager.services_mut())
            }
            Event::LocalTimeout { view } => self
                .coordinator
                .process_local_timeout(view, self.epoch_manager.services_mut()),
            Event::ProposalReceived { proposal } => self
                .coordinator
                .process_proposal(proposal, self.epoch_manager.services_mut()),
            Event::VoteReceived { vote } => self
                .coordinator
                .process_vote(vote, self.epoch_manager.services_mut()),
            Event::NewViewReceived { new_view } => self
                .coordinator
                .process_new_view(new_view, self.epoch_manager.services_mut()),
        };
        trace!(actions = actions.len(), "Event handled");
        actions
    }

    pub fn coordinator(&self) -> &EventCoordinator {
        &self.coordinator
    }

    pub fn services(&self) -> &ConsensusServices {
        self.epoch_manager.services()
    }
}

impl StateMachine for Dispatcher {
    fn handle(&mut self, event: Event) -> Vec<Action> {
        self.dispatch(event)
    }
}
