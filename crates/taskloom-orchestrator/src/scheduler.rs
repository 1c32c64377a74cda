use crate::manager::TaskManager;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Default polling interval of the scheduler loop.
pub const DEFAULT_TICK: Duration = Duration::from_secs(1);

/// Background loop that starts `scheduled` tasks once their `next_run` is reached.
///
/// Runs are spawned and not awaited, so a slow run never delays the next tick.
pub struct Scheduler {
    manager: Arc<TaskManager>,
    tick: Duration,
}

impl Scheduler {
    /// Scheduler for `manager` with the default tick.
    pub fn new(manager: Arc<TaskManager>) -> Self {
        Self {
            manager,
            tick: DEFAULT_TICK,
        }
    }

    /// Set how often due tasks are checked.
    pub fn with_tick(mut self, tick: Duration) -> Self {
        self.tick = tick.max(Duration::from_millis(10));
        self
    }

    /// Start the loop.
    ///
    /// The loop exits once `shutdown` carries `true` or its sender is dropped.
    /// In-flight runs are left to finish on their own.
    pub fn start(self, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.tick);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            tracing::info!(tick_ms = self.tick.as_millis() as u64, "Scheduler started");

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        let started = self.manager.tick(Utc::now()).await;
                        if !started.is_empty() {
                            tracing::info!(runs = started.len(), "Scheduler: started due tasks");
                        }
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }

            tracing::info!("Scheduler stopped");
        })
    }
}
