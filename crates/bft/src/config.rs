//! BFT configuration.

use std::time::Duration;

/// BFT consensus configuration.
#[derive(Debug, Clone)]
pub struct BftConfig {
    /// Local timeout for a view with no prior consecutive timeouts.
    pub base_timeout: Duration,

    /// Multiplier applied per consecutive timeout. Values below 1.0 are
    /// treated as 1.0.
    pub backoff_rate: f64,

    /// Upper bound on the local timeout.
    pub max_timeout: Duration,

    /// Maximum commands drawn from the mempool per vertex.
    pub max_commands_per_vertex: usize,
}

impl Default for BftConfig {
    fn default() -> Self {
        Self {
            base_timeout: Duration::from_secs(1),
            backoff_rate: 2.0,
            max_timeout: Duration::from_secs(30),
            max_commands_per_vertex: 1024,
        }
    }
}

impl BftConfig {
    /// Create a new BFT configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the base local timeout.
    pub fn with_base_timeout(mut self, timeout: Duration) -> Self {
        self.base_timeout = timeout;
        self
    }

    /// Set the backoff multiplier.
    pub fn with_backoff_rate(mut self, rate: f64) -> Self {
        self.backoff_rate = rate;
        self
    }

    /// Set the timeout cap.
    pub fn with_max_timeout(mut self, timeout: Duration) -> Self {
        self.max_timeout = timeout;
        self
    }

    /// Set the maximum commands per vertex.
    pub fn with_max_commands(mut self, max: usize) -> Self {
        self.max_commands_per_vertex = max;
        self
    }
}
