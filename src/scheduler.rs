//! Fixed-interval render loop
//!
//! Every cycle: spawn one task per registered metric, wait for all of them up
//! to the cycle deadline, log failures, abort stragglers, sleep, repeat.
//! A failing or hanging task never affects its siblings or the loop.

use crate::errors::{SourceError, SyncError};
use crate::presentation::{PresentationSync, SyncOutcome};
use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout_at, Instant};

/// Items scanned by the startup cleanup
const CLEANUP_SCAN_LIMIT: usize = 200;

#[derive(Debug)]
pub enum TaskError {
    Source(SourceError),
    Sync(SyncError),
}

impl From<SourceError> for TaskError {
    fn from(err: SourceError) -> Self {
        TaskError::Source(err)
    }
}

impl From<SyncError> for TaskError {
    fn from(err: SyncError) -> Self {
        TaskError::Sync(err)
    }
}

impl std::fmt::Display for TaskError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskError::Source(e) => write!(f, "source: {}", e),
            TaskError::Sync(e) => write!(f, "sync: {}", e),
        }
    }
}

impl std::error::Error for TaskError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    Synced(SyncOutcome),
    /// Nothing to show this cycle
    NoData,
}

/// One fetch + render + sync unit
#[async_trait]
pub trait MetricTask: Send + Sync {
    fn name(&self) -> &'static str;

    /// `cycle` numbers the scheduler cycles from 1; tasks of one cycle share it
    async fn run(&self, cycle: u64) -> Result<TaskStatus, TaskError>;
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CycleReport {
    pub synced: Vec<&'static str>,
    pub skipped: Vec<&'static str>,
    pub failed: Vec<(&'static str, String)>,
    pub timed_out: Vec<&'static str>,
}

impl CycleReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty() && self.timed_out.is_empty()
    }
}

pub struct Scheduler {
    tasks: Vec<Arc<dyn MetricTask>>,
    interval: Duration,
    deadline: Duration,
    cleanup: Option<Arc<PresentationSync>>,
    cycles: AtomicU64,
}

impl Scheduler {
    pub fn new(interval: Duration, deadline: Duration) -> Self {
        Self {
            tasks: Vec::new(),
            interval,
            deadline,
            cleanup: None,
            cycles: AtomicU64::new(0),
        }
    }

    pub fn register(&mut self, task: Arc<dyn MetricTask>) {
        log::info!("   ├─ Registered task: {}", task.name());
        self.tasks.push(task);
    }

    /// Purge our old items before the first cycle
    pub fn with_cleanup(mut self, sync: Arc<PresentationSync>) -> Self {
        self.cleanup = Some(sync);
        self
    }

    /// Run forever
    pub async fn run(self) {
        if let Some(sync) = &self.cleanup {
            sync.cleanup(CLEANUP_SCAN_LIMIT).await;
        }

        log::info!(
            "⏰ Starting scheduler ({} tasks, interval: {:?}, deadline: {:?})",
            self.tasks.len(),
            self.interval,
            self.deadline
        );

        loop {
            let report = self.run_cycle().await;
            if report.is_clean() {
                log::info!(
                    "📊 Cycle complete: {} synced, {} without data",
                    report.synced.len(),
                    report.skipped.len()
                );
            } else {
                log::warn!(
                    "📊 Cycle complete: {} synced, {} without data, {} failed, {} timed out",
                    report.synced.len(),
                    report.skipped.len(),
                    report.failed.len(),
                    report.timed_out.len()
                );
            }
            sleep(self.interval).await;
        }
    }

    /// Dispatch every task and collect the results within the deadline
    pub async fn run_cycle(&self) -> CycleReport {
        let deadline = Instant::now() + self.deadline;
        let cycle = self.cycles.fetch_add(1, Ordering::Relaxed) + 1;
        log::debug!("🔄 Cycle {}", cycle);

        let handles: Vec<(&'static str, JoinHandle<Result<TaskStatus, TaskError>>)> = self
            .tasks
            .iter()
            .map(|task| {
                let task = task.clone();
                (task.name(), tokio::spawn(async move { task.run(cycle).await }))
            })
            .collect();

        let mut report = CycleReport::default();

        for (name, mut handle) in handles {
            match timeout_at(deadline, &mut handle).await {
                Ok(Ok(Ok(TaskStatus::Synced(outcome)))) => {
                    log::debug!("✅ {} synced ({:?})", name, outcome);
                    report.synced.push(name);
                }
                Ok(Ok(Ok(TaskStatus::NoData))) => {
                    log::debug!("⏭️  {} had no data", name);
                    report.skipped.push(name);
                }
                Ok(Ok(Err(e))) => {
                    log::error!("❌ {} threw {}", name, e);
                    report.failed.push((name, e.to_string()));
                }
                Ok(Err(join_err)) => {
                    log::error!("❌ {} crashed: {}", name, join_err);
                    report.failed.push((name, join_err.to_string()));
                }
                Err(_) => {
                    handle.abort();
                    log::warn!("⚠️  {} is pending, cancelled", name);
                    report.timed_out.push(name);
                }
            }
        }

        report
    }
}
