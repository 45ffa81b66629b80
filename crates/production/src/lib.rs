//! Production runner with async I/O.
//!
//! Wraps the synchronous consensus [`Dispatcher`](chainbft_bft::Dispatcher)
//! with real I/O:
//!
//! - Events arrive over one tokio mpsc channel, fed by [`EventSender`]s
//! - The pacemaker timer runs as a tokio task ([`TimerManager`])
//! - Safety state is written to disk ([`FileSafetyStore`])
//! - Network, ledger and mempool are supplied through the collaborator
//!   traits in `chainbft-core`
//!
//! # Architecture
//!
//! A single task owns the state machine and receives events via an mpsc
//! channel. This avoids mutex contention.
//!
//! ```text
//! producers ──► EventSender ──► mpsc ──► ConsensusRunner
//!                                          └─ loop { event = recv(); actions = dispatch(event); execute(actions) }
//!                                                 │
//!                 ┌───────────────┬───────────────┼───────────────┐
//!                 ▼               ▼               ▼               ▼
//!           NetworkSender      Ledger          Mempool       TimerManager
//! ```

pub mod config;
mod runner;
mod storage;
pub mod telemetry;
mod timers;

pub use config::{load_signing_key, ConfigError, NodeConfig};
pub use runner::{ConsensusRunner, ConsensusRunnerBuilder, EventSender, RunnerError, ShutdownHandle};
pub use storage::FileSafetyStore;
pub use telemetry::{init_tracing, TelemetryError};
pub use timers::TimerManager;
