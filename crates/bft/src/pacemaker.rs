//! Pacemaker: view advancement and local timeouts.
//!
//! The pacemaker only drives liveness. It advances the local view on QCs and
//! on timeouts without checking anything about votes; that is
//! [`SafetyRules`](crate::SafetyRules)' job.

use crate::BftConfig;
use chainbft_types::{QuorumCertificate, View};
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug)]
pub struct Pacemaker {
    current_view: View,
    highest_qc: QuorumCertificate,
    consecutive_timeouts: u32,
    base_timeout: Duration,
    backoff_rate: f64,
    max_timeout: Duration,
}

impl Pacemaker {
    /// Start at view 1 with the genesis QC as highest QC.
    pub fn new(config: &BftConfig, genesis_qc: QuorumCertificate) -> Self {
        Self {
            current_view: genesis_qc.view.next(),
            highest_qc: genesis_qc,
            consecutive_timeouts: 0,
            base_timeout: config.base_timeout,
            backoff_rate: config.backoff_rate.max(1.0),
            max_timeout: config.max_timeout,
        }
    }

    pub fn current_view(&self) -> View {
        self.current_view
    }

    pub fn highest_qc(&self) -> &QuorumCertificate {
        &self.highest_qc
    }

    pub fn consecutive_timeouts(&self) -> u32 {
        self.consecutive_timeouts
    }

    /// Replace the highest QC if `qc` is higher. Returns whether it changed.
    pub fn update_highest_qc(&mut self, qc: &QuorumCertificate) -> bool {
        if qc.view <= self.highest_qc.view {
            return false;
        }
        debug!(
            old_view = self.highest_qc.view.0,
            new_view = qc.view.0,
            "Updated highest QC"
        );
        self.highest_qc = qc.clone();
        true
    }

    /// Learn a QC; moves to the view after it if that is ahead.
    pub fn process_qc(&mut self, qc: &QuorumCertificate) -> Option<View> {
        self.update_highest_qc(qc);

        let next = qc.view.next();
        if next <= self.current_view {
            return None;
        }
        debug!(from = self.current_view.0, to = next.0, "Advancing view on QC");
        self.current_view = next;
        self.consecutive_timeouts = 0;
        Some(next)
    }

    /// Local timer for `view` expired. Moves to the view after it unless the
    /// timeout is stale.
    pub fn process_local_timeout(&mut self, view: View) -> Option<View> {
        if view < self.current_view {
            debug!(
                view = view.0,
                current_view = self.current_view.0,
                "Ignoring stale local timeout"
            );
            return None;
        }

        let next = view.next();
        self.current_view = next;
        self.consecutive_timeouts = self.consecutive_timeouts.saturating_add(1);
        info!(
            view = view.0,
            next_view = next.0,
            consecutive = self.consecutive_timeouts,
            "Local timeout"
        );
        Some(next)
    }

    /// A quorum of NewViews for `view` arrived; jump to it if it is ahead.
    pub fn process_new_view_quorum(&mut self, view: View) -> Option<View> {
        if view <= self.current_view {
            return None;
        }
        debug!(from = self.current_view.0, to = view.0, "Advancing view on NewView quorum");
        self.current_view = view;
        Some(view)
    }

    /// Move to `view` without counting a timeout. Used when resuming after a
    /// restart.
    pub fn skip_to(&mut self, view: View) {
        if view > self.current_view {
            info!(from = self.current_view.0, to = view.0, "Resuming at view");
            self.current_view = view;
        }
    }

    /// Timeout for the current view: exponential in consecutive timeouts,
    /// capped.
    pub fn timeout(&self) -> Duration {
        let exponent = i32::try_from(self.consecutive_timeouts).unwrap_or(i32::MAX);
        let scaled = self.base_timeout.as_nanos() as f64 * self.backoff_rate.powi(exponent);
        if !scaled.is_finite() || scaled >= self.max_timeout.as_nanos() as f64 {
            return self.max_timeout;
        }
        Duration::from_nanos(scaled.round() as u64)
    }
}
