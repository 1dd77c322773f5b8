//! Background jobs run by the server.
//!
//! Each job is spawned in its own tokio task and runs on a fixed interval,
//! independent of any HTTP request.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{TimeDelta, Utc};
use ticketsync_core::{Credential, Orchestrator, SyncRequest, SyncStatus};
use tokio::sync::Semaphore;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

/// A job run periodically against the orchestrator.
#[async_trait]
pub trait PeriodicJob: Send + Sync + 'static {
    /// Name used in logs.
    fn name(&self) -> &'static str;

    /// Time between two runs.
    fn interval(&self) -> Duration;

    /// Runs the job once.
    async fn run_job(&self, orchestrator: &Orchestrator);
}

/// Spawns `job` in a loop. The first run happens immediately.
pub fn spawn_periodic_job<J: PeriodicJob>(orchestrator: Orchestrator, job: J) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(job.interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!("Job {} scheduled every {:?}", job.name(), job.interval());
        loop {
            ticker.tick().await;
            debug!("Running job {}", job.name());
            job.run_job(&orchestrator).await;
        }
    })
}

/// Counts from one auto-sync pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct AutoSyncReport {
    /// Sessions that reached `Completed`.
    pub completed: usize,
    /// Sessions that ended `Failed` or aborted.
    pub failed: usize,
    /// Credentials whose secret could not be decrypted.
    pub skipped: usize,
}

/// Syncs every `auto_sync` credential with bounded concurrency.
#[derive(Debug, Clone, Copy)]
pub struct AutoSync {
    interval: Duration,
    workers: usize,
}

impl AutoSync {
    /// Creates the job; `workers` is at least one.
    #[must_use]
    pub fn new(interval: Duration, workers: usize) -> Self {
        Self {
            interval,
            workers: workers.max(1),
        }
    }

    /// Runs one pass over all auto-sync credentials.
    ///
    /// # Errors
    ///
    /// Returns an error if the credential list cannot be read.
    pub async fn sync_all(&self, orchestrator: &Orchestrator) -> Result<AutoSyncReport> {
        let credentials = orchestrator.credentials().list_auto_sync().await?;
        info!("Auto-sync pass over {} credentials", credentials.len());

        let semaphore = Arc::new(Semaphore::new(self.workers));
        let mut tasks = JoinSet::new();
        for credential in credentials {
            let permit = Arc::clone(&semaphore).acquire_owned().await?;
            let orchestrator = orchestrator.clone();
            tasks.spawn(async move {
                let outcome = sync_one(&orchestrator, &credential).await;
                drop(permit);
                outcome
            });
        }

        let mut report = AutoSyncReport::default();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Outcome::Completed) => report.completed += 1,
                Ok(Outcome::Failed) => report.failed += 1,
                Ok(Outcome::Skipped) => report.skipped += 1,
                Err(e) => {
                    error!("Auto-sync task panicked: {e}");
                    report.failed += 1;
                }
            }
        }
        Ok(report)
    }
}

enum Outcome {
    Completed,
    Failed,
    Skipped,
}

async fn sync_one(orchestrator: &Orchestrator, credential: &Credential) -> Outcome {
    let prepared = match orchestrator
        .prepare(credential, SyncRequest::scheduled(), Utc::now())
        .await
    {
        Ok(prepared) => prepared,
        Err(e) => {
            warn!("Skipping credential {}: {e}", credential.id);
            return Outcome::Skipped;
        }
    };

    match orchestrator.run(prepared).await {
        Ok(session) if session.status == SyncStatus::Completed => {
            info!(
                "Credential {}: {}/{} emails ingested",
                credential.id, session.total_ingested, session.total_found
            );
            Outcome::Completed
        }
        Ok(session) => {
            warn!(
                "Credential {} sync failed: {}",
                credential.id,
                session.last_error.as_deref().unwrap_or("unknown error")
            );
            Outcome::Failed
        }
        Err(e) => {
            error!("Credential {} sync aborted: {e}", credential.id);
            Outcome::Failed
        }
    }
}

#[async_trait]
impl PeriodicJob for AutoSync {
    fn name(&self) -> &'static str {
        "auto-sync"
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    async fn run_job(&self, orchestrator: &Orchestrator) {
        match self.sync_all(orchestrator).await {
            Ok(report) => info!(
                "Auto-sync pass done: {} completed, {} failed, {} skipped",
                report.completed, report.failed, report.skipped
            ),
            Err(e) => error!("Auto-sync pass failed: {e:#}"),
        }
    }
}

/// Evicts sync sessions finished longer ago than the retention window.
#[derive(Debug, Clone, Copy)]
pub struct SweepSessions {
    interval: Duration,
    retention: TimeDelta,
}

impl SweepSessions {
    /// Creates the job.
    #[must_use]
    pub fn new(interval: Duration, retention: Duration) -> Self {
        Self {
            interval,
            retention: TimeDelta::from_std(retention).unwrap_or(TimeDelta::hours(1)),
        }
    }
}

#[async_trait]
impl PeriodicJob for SweepSessions {
    fn name(&self) -> &'static str {
        "sweep-sessions"
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    async fn run_job(&self, orchestrator: &Orchestrator) {
        let removed = orchestrator.sessions().sweep_expired(self.retention).await;
        if removed > 0 {
            info!("Swept {removed} expired sync sessions");
        }
    }
}
