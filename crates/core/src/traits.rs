//! Core traits for the state machine and its collaborators.

use crate::{Action, Event};
use chainbft_messages::{NewViewMessage, Proposal, VoteMessage};
use chainbft_types::{Command, Hash, PublicKey, Vertex};
use std::collections::HashSet;

/// A state machine that processes events.
///
/// Consensus logic is implemented as state machines that are:
///
/// - **Synchronous**: No async, no `.await`
/// - **Deterministic**: Same state + event = same actions
/// - **Pure-ish**: Mutates self, but performs no I/O
pub trait StateMachine {
    /// Process an event, returning actions for the runner to perform.
    fn handle(&mut self, event: Event) -> Vec<Action>;
}

/// Source of pending commands.
///
/// Called from inside event handlers, so implementations must answer from
/// memory without blocking.
pub trait Mempool: Send + Sync {
    /// Up to `count` pending commands, in mempool order, skipping any whose id
    /// is in `exclude`.
    fn get_commands(&self, count: usize, exclude: &HashSet<Hash>) -> Vec<Command>;

    /// A command was committed and applied.
    fn remove_committed(&self, id: &Hash);

    /// A command was committed but the ledger rejected it.
    fn remove_rejected(&self, id: &Hash);
}

/// Point-to-point delivery of consensus messages.
///
/// Retry and backoff belong to the transport.
pub trait NetworkSender: Send + Sync {
    fn send_proposal(&self, target: &PublicKey, message: &Proposal);

    fn send_vote(&self, target: &PublicKey, message: &VoteMessage);

    fn send_new_view(&self, target: &PublicKey, message: &NewViewMessage);
}

/// Receiver of committed vertices.
pub trait Ledger: Send + Sync {
    /// Apply a committed vertex. Returns the ids of commands the ledger
    /// rejected; every other command counts as committed.
    fn deliver(&self, vertex: &Vertex) -> Vec<Hash>;
}
