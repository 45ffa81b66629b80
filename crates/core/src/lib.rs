//! Core types for chained BFT consensus.
//!
//! This crate provides the foundational types for the consensus architecture:
//!
//! - [`Event`]: All possible inputs to the consensus state machine
//! - [`Action`]: All possible outputs from the consensus state machine
//! - [`StateMachine`]: The trait the dispatcher implements
//! - [`Mempool`], [`NetworkSender`], [`Ledger`]: the collaborators the runner
//!   executes actions against
//!
//! # Architecture
//!
//! ```text
//! Events → StateMachine::handle() → Actions
//! ```
//!
//! The state machine is:
//! - **Synchronous**: No async, no .await
//! - **Single-threaded**: One event at a time, in arrival order
//! - **Pure-ish**: Mutates self, but performs no I/O
//!
//! All I/O is handled by the runner which:
//! 1. Delivers events to the state machine
//! 2. Executes the returned actions
//! 3. Feeds timer expiry back in as events

mod action;
mod event;
mod message;
mod traits;

pub use action::Action;
pub use event::Event;
pub use message::OutboundMessage;
pub use traits::{Ledger, Mempool, NetworkSender, StateMachine};
