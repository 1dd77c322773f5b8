#![allow(clippy::unwrap_used, missing_docs)]

mod test_utils;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use ticketsync::jobs::{AutoSync, AutoSyncReport, PeriodicJob, SweepSessions, spawn_periodic_job};
use ticketsync_core::{CredentialId, Orchestrator, SessionUpdate};

use test_utils::{FixedSource, OWNER, test_app};

#[tokio::test]
async fn test_auto_sync_covers_auto_sync_credentials_only() {
    let test = test_app(FixedSource::with_orders(2)).await;
    let second = test.add_credential("user-2", true).await;
    let manual_only = test.add_credential("user-3", false).await;

    let report = AutoSync::new(Duration::from_secs(3600), 1)
        .sync_all(&test.orchestrator)
        .await
        .unwrap();
    assert_eq!(
        report,
        AutoSyncReport {
            completed: 2,
            failed: 0,
            skipped: 0
        }
    );
    assert_eq!(test.ingest.count(), 4);

    let credentials = test.orchestrator.credentials();
    for id in [test.credential_id, second] {
        let credential = credentials.get(CredentialId::new(id)).await.unwrap().unwrap();
        assert!(credential.last_sync_at.is_some());
        assert!(credential.last_manual_sync_at.is_none());
        assert_eq!(credentials.recent_audit(credential.id, 5).await.unwrap().len(), 1);
    }
    let untouched = credentials
        .get(CredentialId::new(manual_only))
        .await
        .unwrap()
        .unwrap();
    assert!(untouched.last_sync_at.is_none());
}

#[tokio::test]
async fn test_auto_sync_counts_failures() {
    let test = test_app(FixedSource::unreachable()).await;

    let report = AutoSync::new(Duration::from_secs(3600), 4)
        .sync_all(&test.orchestrator)
        .await
        .unwrap();
    assert_eq!(report.failed, 1);
    assert_eq!(report.completed, 0);

    let audit = test
        .orchestrator
        .credentials()
        .recent_audit(CredentialId::new(test.credential_id), 5)
        .await
        .unwrap();
    assert_eq!(audit.len(), 1);
    assert!(audit[0].error.is_some());
}

#[tokio::test]
async fn test_sweep_removes_finished_sessions_only() {
    let test = test_app(FixedSource::with_orders(1)).await;
    let sessions = test.orchestrator.sessions();
    let finished = sessions.create(OWNER, 1).await;
    sessions.update(finished, SessionUpdate::Completed).await.unwrap();
    let running = sessions.create(OWNER, 1).await;

    SweepSessions::new(Duration::from_secs(60), Duration::from_secs(3600))
        .run_job(&test.orchestrator)
        .await;
    assert!(sessions.get(finished).await.is_some());

    SweepSessions::new(Duration::from_secs(60), Duration::ZERO)
        .run_job(&test.orchestrator)
        .await;
    assert!(sessions.get(finished).await.is_none());
    assert!(sessions.get(running).await.is_some());
}

struct CountingJob(Arc<AtomicUsize>);

#[async_trait]
impl PeriodicJob for CountingJob {
    fn name(&self) -> &'static str {
        "counting"
    }

    fn interval(&self) -> Duration {
        Duration::from_millis(50)
    }

    async fn run_job(&self, _orchestrator: &Orchestrator) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

#[tokio::test]
async fn test_periodic_job_runs_on_interval() {
    let test = test_app(FixedSource::with_orders(1)).await;
    let runs = Arc::new(AtomicUsize::new(0));

    let handle = spawn_periodic_job(test.orchestrator.clone(), CountingJob(Arc::clone(&runs)));
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(runs.load(Ordering::SeqCst), 1);

    tokio::time::sleep(Duration::from_millis(180)).await;
    assert!(runs.load(Ordering::SeqCst) >= 3);
    handle.abort();
}
