//! Local-timeout timer for the consensus runner.
//!
//! The pacemaker has exactly one timer armed at a time. Each schedule
//! replaces the previous one; a timer that fires pushes
//! `Event::LocalTimeout` into the runner's channel.

use chainbft_core::Event;
use chainbft_types::View;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

/// Owns the tokio task backing the pacemaker timer.
#[derive(Debug)]
pub struct TimerManager {
    /// Armed timer: view it fires for and its task.
    armed: Option<(View, JoinHandle<()>)>,
    event_tx: mpsc::Sender<Event>,
}

impl TimerManager {
    pub fn new(event_tx: mpsc::Sender<Event>) -> Self {
        Self {
            armed: None,
            event_tx,
        }
    }

    /// Arm the timer for `view`, cancelling any armed timer first.
    pub fn schedule_local_timeout(&mut self, view: View, duration: Duration) {
        self.cancel();

        let event_tx = self.event_tx.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            trace!(view = view.0, "Local timeout fired");
            // Runner gone means shutdown; nothing to report
            let _ = event_tx.send(Event::LocalTimeout { view }).await;
        });

        self.armed = Some((view, handle));
        debug!(view = view.0, ?duration, "Local timeout armed");
    }

    /// Cancel the armed timer. No-op if none is armed or it already fired.
    pub fn cancel(&mut self) {
        if let Some((view, handle)) = self.armed.take() {
            handle.abort();
            trace!(view = view.0, "Local timeout cancelled");
        }
    }

    /// View of the armed timer, if any.
    pub fn armed_view(&self) -> Option<View> {
        self.armed.as_ref().map(|(view, _)| *view)
    }
}

impl Drop for TimerManager {
    fn drop(&mut self) {
        self.cancel();
    }
}
