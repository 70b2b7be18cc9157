//! Background reclamation of idle upload sessions.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{interval, MissedTickBehavior};

use crate::session::UploadSessionManager;

/// Periodically reclaims sessions that received no chunk within the idle
/// timeout, so abandoned uploads do not pin staging space forever.
pub struct SessionSweeper {
    manager: Arc<UploadSessionManager>,
    idle_timeout: Duration,
    sweep_interval: Duration,
}

impl SessionSweeper {
    pub fn new(
        manager: Arc<UploadSessionManager>,
        idle_timeout: Duration,
        sweep_interval: Duration,
    ) -> Self {
        Self {
            manager,
            idle_timeout,
            sweep_interval,
        }
    }

    /// Start the background sweep task.
    /// Returns a JoinHandle for graceful shutdown.
    pub fn start(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut tick = interval(self.sweep_interval);
            tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tick.tick().await;

                let reclaimed = self.manager.sweep_idle(self.idle_timeout).await;
                if reclaimed > 0 {
                    tracing::info!(reclaimed, "Idle upload session sweep completed");
                }
            }
        })
    }
}
