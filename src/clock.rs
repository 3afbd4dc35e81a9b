use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::debug;

use crate::state::SessionState;

const TICK: Duration = Duration::from_secs(1);

/// Periodic ticker that refreshes `duration_seconds` while recording
///
/// The ticker task only exists while recording; pausing or stopping aborts it.
#[derive(Debug, Default)]
pub struct DurationClock {
    task: Option<JoinHandle<()>>,
}

impl DurationClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start(&mut self, state: Arc<RwLock<SessionState>>) {
        if self.is_running() {
            return;
        }

        self.task = Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + TICK, TICK);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                state.write().tick();
            }
        }));
        debug!("Duration clock started");
    }

    pub fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            debug!("Duration clock stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }
}

impl Drop for DurationClock {
    fn drop(&mut self) {
        self.stop();
    }
}
