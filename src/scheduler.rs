//! Periodic health-score refresh.
//!
//! The scheduler is constructed explicitly and owns nothing global: `start`
//! spawns the loop and hands back a handle whose `stop` shuts it down.

use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{error, info};

use crate::orchestrator::HealthUpdater;

pub struct HealthScheduler {
    updater: HealthUpdater,
    interval: Duration,
}

pub struct SchedulerHandle {
    stop: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl HealthScheduler {
    pub fn new(updater: HealthUpdater, interval: Duration) -> Self {
        Self { updater, interval }
    }

    /// Runs a full recompute immediately, then once per interval.
    pub fn start(self) -> SchedulerHandle {
        let (stop, mut stopped) = watch::channel(false);
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            // A slow run must not be followed by a burst of catch-up runs.
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            info!(interval_secs = self.interval.as_secs(), "health scheduler started");

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        info!("health score update started");
                        self.updater.recompute_all().await;
                    }
                    // Only `stop` ever writes, and a dropped handle also ends the loop.
                    _ = stopped.changed() => break,
                }
            }

            info!("health scheduler stopped");
        });

        SchedulerHandle { stop, task }
    }
}

impl SchedulerHandle {
    pub async fn stop(self) {
        let _ = self.stop.send(true);
        if let Err(err) = self.task.await {
            error!(error = %err, "health scheduler task failed");
        }
    }
}
