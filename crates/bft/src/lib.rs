//! Chained BFT consensus state machine.
//!
//! This crate provides a synchronous implementation of a pipelined,
//! three-chain BFT protocol.
//!
//! # Architecture
//!
//! The [`Dispatcher`] processes events one at a time:
//!
//! - `Event::EpochChange` → [`EpochManager::next_epoch`] builds a fresh coordinator
//! - `Event::ProposalReceived` → [`SafetyRules`] check, store vertex, vote
//! - `Event::VoteReceived` → [`PendingVotes`] aggregation, QC, propose
//! - `Event::LocalTimeout` → [`Pacemaker`] advance, NewView to next leader
//! - `Event::NewViewReceived` → [`PendingNewViews`] quorum, fast-path propose
//!
//! Long-lived services ([`Pacemaker`], [`VertexStore`], [`SafetyRules`]) are
//! owned by the [`EpochManager`] and survive epoch changes. All I/O is
//! performed by the runner via returned `Action`s.

mod config;
mod coordinator;
mod dispatcher;
mod election;
mod epoch;
mod pacemaker;
mod pending_new_views;
mod pending_votes;
mod proposal_generator;
mod safety;
mod vertex_store;

pub use config::BftConfig;
pub use coordinator::{EventCoordinator, ValidatingEventCoordinator};
pub use dispatcher::Dispatcher;
pub use election::{Dictatorship, ElectionError, ProposerElection, RotatingLeaders};
pub use epoch::{ConsensusServices, EpochManager};
pub use pacemaker::Pacemaker;
pub use pending_new_views::PendingNewViews;
pub use pending_votes::{Equivocation, PendingVotes};
pub use proposal_generator::ProposalGenerator;
pub use safety::{
    MemorySafetyStore, SafetyRules, SafetyRulesError, SafetyStateStore, SafetyViolation,
    StoreError,
};
pub use vertex_store::{VertexStore, VertexStoreError, VertexStoreSnapshot};
