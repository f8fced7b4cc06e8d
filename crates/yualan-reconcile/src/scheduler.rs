//! # Reconciliation Schedules
//!
//! Each configured schedule runs in its own task and, on every tick, one
//! batch per enabled provider. Schedules overlap with each other (the wide
//! sweep re-checks what the frequent run checks) but never with themselves:
//! ticks that fire while a run is still going are skipped.
//!
//! ```text
//! ┌──────────────┐  tick  ┌─────────────────────────────┐
//! │ frequent     │───────▶│ run_batch(100, 24h) ipaymu  │
//! │ every 300s   │        │ run_batch(100, 24h) midtrans│
//! └──────────────┘        └─────────────────────────────┘
//! ┌──────────────┐  tick  ┌─────────────────────────────┐
//! │ sweep        │───────▶│ run_batch(200, 72h) ...     │
//! │ every 3600s  │        └─────────────────────────────┘
//! └──────────────┘
//! ```

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::config::ScheduleConfig;
use crate::engine::{BatchSummary, ReconciliationEngine};
use crate::error::{ReconcileError, ReconcileResult};

/// Runs one schedule until told to stop.
pub struct ScheduleRunner {
    schedule: ScheduleConfig,
    engines: Vec<ReconciliationEngine>,
    shutdown_rx: mpsc::Receiver<()>,
}

/// Handle for stopping a [`ScheduleRunner`].
#[derive(Clone)]
pub struct ScheduleHandle {
    name: String,
    shutdown_tx: mpsc::Sender<()>,
}

impl ScheduleHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Stops the runner after its current run, if any.
    pub async fn shutdown(&self) -> ReconcileResult<()> {
        self.shutdown_tx
            .send(())
            .await
            .map_err(|_| ReconcileError::ChannelError(format!("schedule {} already stopped", self.name)))
    }
}

impl ScheduleRunner {
    pub fn new(schedule: ScheduleConfig, engines: Vec<ReconciliationEngine>) -> (Self, ScheduleHandle) {
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

        let handle = ScheduleHandle {
            name: schedule.name.clone(),
            shutdown_tx,
        };
        let runner = ScheduleRunner {
            schedule,
            engines,
            shutdown_rx,
        };

        (runner, handle)
    }

    /// One batch per provider, merged.
    pub async fn run_once(&self) -> BatchSummary {
        let mut total = BatchSummary::default();

        for engine in &self.engines {
            let summary = engine.run_batch(self.schedule.limit, self.schedule.hours).await;
            info!(schedule = %self.schedule.name, "{summary}");
            total.merge(&summary);
        }

        total
    }

    /// Runs the schedule loop. The first run starts immediately.
    ///
    /// This should be spawned as a background task.
    pub async fn run(mut self) {
        info!(
            schedule = %self.schedule.name,
            interval_secs = self.schedule.interval_secs,
            limit = self.schedule.limit,
            hours = self.schedule.hours,
            providers = self.engines.len(),
            "Reconciliation schedule starting"
        );

        let mut interval = tokio::time::interval(self.schedule.interval());
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let summary = self.run_once().await;
                    if let Some(err) = &summary.selection_error {
                        warn!(schedule = %self.schedule.name, error = %err, "Schedule run could not select sales");
                    }
                }

                _ = self.shutdown_rx.recv() => {
                    info!(schedule = %self.schedule.name, "Reconciliation schedule shutting down");
                    break;
                }
            }
        }

        info!(schedule = %self.schedule.name, "Reconciliation schedule stopped");
    }
}

/// Every configured schedule, spawned.
pub struct Scheduler {
    handles: Vec<ScheduleHandle>,
    tasks: Vec<JoinHandle<()>>,
}

impl Scheduler {
    /// Spawns one task per schedule, each reconciling through `engines`.
    pub fn start(schedules: &[ScheduleConfig], engines: &[ReconciliationEngine]) -> Self {
        let mut handles = Vec::with_capacity(schedules.len());
        let mut tasks = Vec::with_capacity(schedules.len());

        for schedule in schedules {
            let (runner, handle) = ScheduleRunner::new(schedule.clone(), engines.to_vec());
            tasks.push(tokio::spawn(runner.run()));
            handles.push(handle);
        }

        Scheduler { handles, tasks }
    }

    pub fn handles(&self) -> &[ScheduleHandle] {
        &self.handles
    }

    /// Stops every schedule and waits for in-flight runs to finish.
    pub async fn shutdown(self) -> ReconcileResult<()> {
        for handle in &self.handles {
            if let Err(e) = handle.shutdown().await {
                warn!(schedule = handle.name(), error = %e, "Schedule did not accept shutdown");
            }
        }

        for task in self.tasks {
            task.await
                .map_err(|e| ReconcileError::ChannelError(format!("schedule task failed: {e}")))?;
        }

        Ok(())
    }
}
