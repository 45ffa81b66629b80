//! Test helpers for chained BFT consensus.
//!
//! Provides validator sets with real keys, properly signed votes and quorum
//! certificates, and in-memory collaborators that record what consensus asks
//! of them.

mod collaborators;
mod fixtures;

pub use collaborators::{RecordingLedger, RecordingMempool, RecordingNetwork};
pub use fixtures::{certify, child_of, signed_vote, TestValidators};
