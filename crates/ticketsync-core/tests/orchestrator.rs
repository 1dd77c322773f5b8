//! Orchestrator tests against a scripted mailbox.

#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::redundant_clone,
    clippy::similar_names,
    clippy::too_many_lines,
    missing_docs
)]

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::{NaiveDate, Utc};
use ticketsync_core::allowlist::Policy;
use ticketsync_core::{
    AllowList, AuditStatus, ConnectionState, Credential, CredentialRepository, Error,
    IngestOutcome, IngestRecord, IngestSink, IngestStatus, Mailbox, MailSource,
    MemorySessionStore, NewCredential, Orchestrator, PendingLogin, SecretCipher, SessionStore,
    SyncError, SyncMode, SyncRequest, SyncSettings, SyncStatus,
};
use ticketsync_imap::{RawMessage, Uid};
use tokio::time::{Instant, timeout_at};

const SENDER_A: &str = "a@vendor-a.com";
const SENDER_B: &str = "b@vendor-b.com";
const SECRET: &str = "app-password";

// ============================================================================
// Scripted mailbox
// ============================================================================

#[derive(Debug, Clone)]
struct Scripted {
    uid: u32,
    from: String,
    subject: String,
}

#[derive(Default)]
struct Script {
    by_sender: HashMap<String, Vec<Scripted>>,
    failing_senders: Vec<String>,
    connect_error: Option<SyncError>,
    login_error: Option<SyncError>,
    connect_delay: Option<Duration>,
    login_delay: Option<Duration>,
}

#[derive(Default)]
struct Calls {
    logins: Vec<(String, String)>,
    fetched: Vec<Vec<u32>>,
    logouts: usize,
}

#[derive(Clone, Default)]
struct ScriptedSource {
    script: Arc<Script>,
    calls: Arc<Mutex<Calls>>,
}

impl ScriptedSource {
    fn new(script: Script) -> Self {
        Self {
            script: Arc::new(script),
            calls: Arc::default(),
        }
    }
}

#[async_trait]
impl MailSource for ScriptedSource {
    async fn connect(&self, _host: &str, _port: u16) -> Result<Box<dyn PendingLogin>, SyncError> {
        if let Some(delay) = self.script.connect_delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(e) = &self.script.connect_error {
            return Err(e.clone());
        }
        Ok(Box::new(self.clone()))
    }
}

#[async_trait]
impl PendingLogin for ScriptedSource {
    async fn login(
        self: Box<Self>,
        login: &str,
        secret: &str,
        deadline: Instant,
    ) -> Result<Box<dyn Mailbox>, SyncError> {
        self.calls
            .lock()
            .unwrap()
            .logins
            .push((login.to_string(), secret.to_string()));
        if let Some(delay) = self.script.login_delay
            && timeout_at(deadline, tokio::time::sleep(delay)).await.is_err()
        {
            self.calls.lock().unwrap().logouts += 1;
            return Err(SyncError::timed_out());
        }
        if let Some(e) = &self.script.login_error {
            return Err(e.clone());
        }
        Ok(self)
    }
}

#[async_trait]
impl Mailbox for ScriptedSource {
    async fn search(&mut self, from: &str, _since: NaiveDate) -> Result<Vec<Uid>, SyncError> {
        if self.script.failing_senders.iter().any(|s| s == from) {
            return Err(SyncError::Command("SEARCH failed".to_string()));
        }
        Ok(self
            .script
            .by_sender
            .get(from)
            .map(|msgs| msgs.iter().filter_map(|m| Uid::new(m.uid)).collect())
            .unwrap_or_default())
    }

    async fn fetch(&mut self, uids: &[Uid]) -> Result<Vec<RawMessage>, SyncError> {
        let wanted: Vec<u32> = uids.iter().map(|u| u.get()).collect();
        self.calls.lock().unwrap().fetched.push(wanted.clone());
        let matching: BTreeMap<u32, &Scripted> = self
            .script
            .by_sender
            .values()
            .flatten()
            .filter(|m| wanted.contains(&m.uid))
            .map(|m| (m.uid, m))
            .collect();
        Ok(matching
            .into_values()
            .map(|m| RawMessage {
                seq: m.uid,
                uid: Uid::new(m.uid),
                header: format!(
                    "From: {}\r\nSubject: {}\r\nDate: Fri, 5 Jan 2024 10:00:00 +0000\r\n\
                     Message-ID: <{}@vendor>\r\n\r\n",
                    m.from, m.subject, m.uid
                )
                .into_bytes(),
                text: format!("Tickets for {}\r\n", m.subject).into_bytes(),
            })
            .collect())
    }

    async fn logout(self: Box<Self>) {
        self.calls.lock().unwrap().logouts += 1;
    }
}

fn messages(from: &str, uids: std::ops::RangeInclusive<u32>) -> Vec<Scripted> {
    uids.map(|uid| Scripted {
        uid,
        from: format!("Vendor <{from}>"),
        subject: format!("Order {uid}"),
    })
    .collect()
}

// ============================================================================
// Fake ingest
// ============================================================================

#[derive(Default)]
struct FakeIngest {
    reject_subjects: Vec<String>,
    received: Mutex<Vec<IngestRecord>>,
}

#[async_trait]
impl IngestSink for FakeIngest {
    async fn send(&self, record: &IngestRecord) -> IngestOutcome {
        self.received.lock().unwrap().push(record.clone());
        if self.reject_subjects.contains(&record.subject) {
            IngestOutcome::Rejected {
                status: 409,
                body: "duplicate".to_string(),
            }
        } else {
            IngestOutcome::Accepted
        }
    }
}

// ============================================================================
// Harness
// ============================================================================

struct Harness {
    orchestrator: Orchestrator,
    sessions: Arc<MemorySessionStore>,
    ingest: Arc<FakeIngest>,
    source: ScriptedSource,
    repo: CredentialRepository,
    credential: Credential,
}

async fn harness(script: Script, ingest: FakeIngest, settings: SyncSettings) -> Harness {
    let allow_list = AllowList::new(Policy::Exact, &[SENDER_A, SENDER_B]).unwrap();
    harness_with(script, ingest, settings, allow_list).await
}

async fn harness_with(
    script: Script,
    ingest: FakeIngest,
    settings: SyncSettings,
    allow_list: AllowList,
) -> Harness {
    let cipher = SecretCipher::from_base64_key(&BASE64.encode([9u8; 32])).unwrap();
    let (encrypted_secret, iv) = cipher.encrypt(SECRET).unwrap();
    let repo = CredentialRepository::in_memory().await.unwrap();
    let credential = repo
        .insert(&NewCredential {
            owner_id: "user-1".to_string(),
            host: "imap.example.com".to_string(),
            port: 993,
            login: "me@example.com".to_string(),
            encrypted_secret,
            iv,
            auto_sync: true,
        })
        .await
        .unwrap();

    let source = ScriptedSource::new(script);
    let sessions = Arc::new(MemorySessionStore::new());
    let ingest = Arc::new(ingest);
    let orchestrator = Orchestrator::new(
        Arc::new(source.clone()),
        sessions.clone(),
        ingest.clone(),
        Arc::new(allow_list),
        repo.clone(),
        cipher,
        settings,
    );

    Harness {
        orchestrator,
        sessions,
        ingest,
        source,
        repo,
        credential,
    }
}

fn two_senders() -> Script {
    Script {
        by_sender: HashMap::from([(SENDER_A.to_string(), messages(SENDER_A, 1..=3))]),
        ..Script::default()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn test_end_to_end_partial_ingest() {
    let ingest = FakeIngest {
        reject_subjects: vec!["Order 2".to_string()],
        ..FakeIngest::default()
    };
    let h = harness(two_senders(), ingest, SyncSettings::default()).await;

    let prepared = h
        .orchestrator
        .prepare(&h.credential, SyncRequest::scheduled(), Utc::now())
        .await
        .unwrap();
    let session = h.orchestrator.run(prepared).await.unwrap();

    assert_eq!(session.status, SyncStatus::Completed);
    assert_eq!(session.total_found, 3);
    assert_eq!(session.total_ingested, 2);
    assert_eq!(session.senders_total, 2);
    assert_eq!(session.senders_completed, vec![SENDER_A, SENDER_B]);
    assert!(session.current_sender.is_none());
    assert_eq!(session.connection_state, ConnectionState::Connected);
    assert!(session.completed_at.is_some());

    let failed: Vec<_> = session
        .emails
        .iter()
        .filter(|e| e.ingest_status == IngestStatus::Failed)
        .collect();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].email.subject, "Order 2");
    assert_eq!(failed[0].ingest_error.as_deref(), Some("HTTP 409: duplicate"));

    let received = h.ingest.received.lock().unwrap().clone();
    assert_eq!(received.len(), 3);
    assert_eq!(received[0].recipient_email, "me@example.com");
    assert_eq!(received[0].user_id, "user-1");
    assert_eq!(received[0].sender_email, format!("Vendor <{SENDER_A}>"));

    {
        let calls = h.source.calls.lock().unwrap();
        assert_eq!(
            calls.logins,
            vec![("me@example.com".to_string(), SECRET.to_string())]
        );
        assert_eq!(calls.logouts, 1);
    }

    let stored = h.repo.get(h.credential.id).await.unwrap().unwrap();
    assert!(stored.last_sync_at.is_some());
    assert!(stored.last_manual_sync_at.is_none());

    let audit = h.repo.recent_audit(h.credential.id, 5).await.unwrap();
    assert_eq!(audit.len(), 1);
    assert_eq!(audit[0].status, AuditStatus::Partial);
    assert_eq!((audit[0].total_found, audit[0].total_ingested), (3, 2));
}

#[tokio::test]
async fn test_dry_run_has_no_side_effects() {
    let h = harness(two_senders(), FakeIngest::default(), SyncSettings::default()).await;

    let prepared = h
        .orchestrator
        .prepare(
            &h.credential,
            SyncRequest::manual(SyncMode::DryRun, Some(7)),
            Utc::now(),
        )
        .await
        .unwrap();
    let emails = h.orchestrator.run_dry(prepared).await.unwrap();

    assert_eq!(emails.len(), 3);
    assert!(h.sessions.is_empty().await);
    assert!(h.ingest.received.lock().unwrap().is_empty());
    let stored = h.repo.get(h.credential.id).await.unwrap().unwrap();
    assert!(stored.last_sync_at.is_none());
    assert!(h.repo.recent_audit(h.credential.id, 5).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_preview_skips_ingest_and_ledger() {
    let h = harness(two_senders(), FakeIngest::default(), SyncSettings::default()).await;

    let prepared = h
        .orchestrator
        .prepare(
            &h.credential,
            SyncRequest::manual(SyncMode::Preview, None),
            Utc::now(),
        )
        .await
        .unwrap();
    let session = h.orchestrator.run(prepared).await.unwrap();

    assert_eq!(session.status, SyncStatus::Completed);
    assert_eq!(session.total_found, 3);
    assert!(
        session
            .emails
            .iter()
            .all(|e| e.ingest_status == IngestStatus::Pending)
    );
    assert!(h.ingest.received.lock().unwrap().is_empty());
    let stored = h.repo.get(h.credential.id).await.unwrap().unwrap();
    assert!(stored.last_sync_at.is_none());
}

#[tokio::test]
async fn test_manual_sync_rate_limited() {
    let h = harness(two_senders(), FakeIngest::default(), SyncSettings::default()).await;
    let last = Utc::now() - chrono::Duration::hours(1);
    h.repo.record_sync(h.credential.id, last, true).await.unwrap();
    let credential = h.repo.get(h.credential.id).await.unwrap().unwrap();

    let result = h
        .orchestrator
        .prepare(
            &credential,
            SyncRequest::manual(SyncMode::Real, None),
            Utc::now(),
        )
        .await;
    match result {
        Err(Error::RateLimited { retry_after }) => {
            assert_eq!(retry_after, last + chrono::Duration::hours(24));
        }
        other => panic!("expected rate limit, got {other:?}"),
    }

    // Scheduled syncs and dry runs are not limited.
    assert!(
        h.orchestrator
            .prepare(&credential, SyncRequest::scheduled(), Utc::now())
            .await
            .is_ok()
    );
    assert!(
        h.orchestrator
            .prepare(
                &credential,
                SyncRequest::manual(SyncMode::DryRun, None),
                Utc::now()
            )
            .await
            .is_ok()
    );

    // Accepted once the window has passed.
    let later = last + chrono::Duration::hours(25);
    assert!(
        h.orchestrator
            .prepare(&credential, SyncRequest::manual(SyncMode::Real, None), later)
            .await
            .is_ok()
    );
}

#[tokio::test]
async fn test_per_sender_cap_keeps_most_recent() {
    let script = Script {
        by_sender: HashMap::from([(SENDER_A.to_string(), messages(SENDER_A, 1..=15))]),
        ..Script::default()
    };
    let h = harness(script, FakeIngest::default(), SyncSettings::default()).await;

    let prepared = h
        .orchestrator
        .prepare(&h.credential, SyncRequest::scheduled(), Utc::now())
        .await
        .unwrap();
    let session = h.orchestrator.run(prepared).await.unwrap();

    assert_eq!(session.total_found, 10);
    let mut fetched = h.source.calls.lock().unwrap().fetched[0].clone();
    fetched.sort_unstable();
    assert_eq!(fetched, (6..=15).collect::<Vec<u32>>());
}

#[tokio::test]
async fn test_sender_error_does_not_stop_sync() {
    let script = Script {
        by_sender: HashMap::from([(SENDER_B.to_string(), messages(SENDER_B, 1..=2))]),
        failing_senders: vec![SENDER_A.to_string()],
        ..Script::default()
    };
    let h = harness(script, FakeIngest::default(), SyncSettings::default()).await;

    let prepared = h
        .orchestrator
        .prepare(&h.credential, SyncRequest::scheduled(), Utc::now())
        .await
        .unwrap();
    let session = h.orchestrator.run(prepared).await.unwrap();

    assert_eq!(session.status, SyncStatus::Completed);
    assert_eq!(session.senders_completed, vec![SENDER_A, SENDER_B]);
    assert_eq!(session.total_found, 2);
    assert_eq!(session.total_ingested, 2);
}

#[tokio::test]
async fn test_unlisted_sender_filtered_after_fetch() {
    let mut spoofed = messages(SENDER_A, 1..=2);
    spoofed[1].from = "Spoof <a@vendor-a.com.evil.net>".to_string();
    let script = Script {
        by_sender: HashMap::from([(SENDER_A.to_string(), spoofed)]),
        ..Script::default()
    };
    let h = harness(script, FakeIngest::default(), SyncSettings::default()).await;

    let prepared = h
        .orchestrator
        .prepare(&h.credential, SyncRequest::scheduled(), Utc::now())
        .await
        .unwrap();
    let session = h.orchestrator.run(prepared).await.unwrap();

    assert_eq!(session.total_found, 1);
    assert_eq!(session.emails[0].email.subject, "Order 1");
}

#[tokio::test]
async fn test_auth_failure_fails_session() {
    let script = Script {
        login_error: Some(SyncError::Auth("invalid credentials".to_string())),
        ..two_senders()
    };
    let h = harness(script, FakeIngest::default(), SyncSettings::default()).await;

    let prepared = h
        .orchestrator
        .prepare(&h.credential, SyncRequest::scheduled(), Utc::now())
        .await
        .unwrap();
    let session = h.orchestrator.run(prepared).await.unwrap();

    assert_eq!(session.status, SyncStatus::Failed);
    assert_eq!(session.connection_state, ConnectionState::Error);
    assert!(
        session
            .last_error
            .as_deref()
            .unwrap()
            .contains("invalid credentials")
    );
    assert!(h.ingest.received.lock().unwrap().is_empty());

    let stored = h.repo.get(h.credential.id).await.unwrap().unwrap();
    assert!(stored.last_sync_at.is_none());
    let audit = h.repo.recent_audit(h.credential.id, 5).await.unwrap();
    assert_eq!(audit[0].status, AuditStatus::Error);
    assert!(audit[0].error.is_some());
}

#[tokio::test]
async fn test_connect_timeout() {
    let script = Script {
        connect_delay: Some(Duration::from_secs(5)),
        ..two_senders()
    };
    let settings = SyncSettings {
        connect_timeout: Duration::from_millis(50),
        ..SyncSettings::default()
    };
    let h = harness(script, FakeIngest::default(), settings).await;

    let prepared = h
        .orchestrator
        .prepare(&h.credential, SyncRequest::scheduled(), Utc::now())
        .await
        .unwrap();
    let session = h.orchestrator.run(prepared).await.unwrap();

    assert_eq!(session.status, SyncStatus::Failed);
    assert_eq!(session.connection_state, ConnectionState::Error);
    assert_eq!(
        session.connection_error.as_deref(),
        Some("Connection failed: timed out")
    );
}

#[tokio::test]
async fn test_dry_run_reports_fatal_error() {
    let script = Script {
        connect_error: Some(SyncError::Connection("refused".to_string())),
        ..two_senders()
    };
    let h = harness(script, FakeIngest::default(), SyncSettings::default()).await;

    let prepared = h
        .orchestrator
        .prepare(
            &h.credential,
            SyncRequest::manual(SyncMode::DryRun, None),
            Utc::now(),
        )
        .await
        .unwrap();
    let result = h.orchestrator.run_dry(prepared).await;
    assert!(matches!(
        result,
        Err(Error::Sync(SyncError::Connection(_)))
    ));
}

#[tokio::test]
async fn test_start_runs_detached() {
    let h = harness(two_senders(), FakeIngest::default(), SyncSettings::default()).await;

    let prepared = h
        .orchestrator
        .prepare(
            &h.credential,
            SyncRequest::manual(SyncMode::Real, None),
            Utc::now(),
        )
        .await
        .unwrap();
    let id = h.orchestrator.start(prepared).await;

    let mut session = h.sessions.get_for_owner(id, "user-1").await.unwrap();
    for _ in 0..200 {
        if session.status.is_terminal() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
        session = h.sessions.get(id).await.unwrap();
    }

    assert_eq!(session.status, SyncStatus::Completed);
    assert_eq!(session.total_ingested, 3);
    let stored = h.repo.get(h.credential.id).await.unwrap().unwrap();
    assert!(stored.last_manual_sync_at.is_some());
}

#[tokio::test]
async fn test_login_timeout_logs_out() {
    let script = Script {
        login_delay: Some(Duration::from_secs(5)),
        ..two_senders()
    };
    let settings = SyncSettings {
        connect_timeout: Duration::from_millis(50),
        ..SyncSettings::default()
    };
    let h = harness(script, FakeIngest::default(), settings).await;

    let prepared = h
        .orchestrator
        .prepare(&h.credential, SyncRequest::scheduled(), Utc::now())
        .await
        .unwrap();
    let session = h.orchestrator.run(prepared).await.unwrap();

    assert_eq!(session.status, SyncStatus::Failed);
    assert_eq!(
        session.connection_error.as_deref(),
        Some("Connection failed: timed out")
    );
    assert_eq!(h.source.calls.lock().unwrap().logouts, 1);
}

#[tokio::test]
async fn test_overlapping_search_terms_ingest_once() {
    let mut vendor = messages(SENDER_A, 1..=1);
    vendor.extend(messages(SENDER_B, 2..=2));
    let script = Script {
        by_sender: HashMap::from([
            ("vendor-a".to_string(), messages(SENDER_A, 1..=1)),
            ("vendor".to_string(), vendor),
        ]),
        ..Script::default()
    };
    let allow_list = AllowList::new(Policy::Substring, &["vendor-a", "vendor"]).unwrap();
    let h = harness_with(script, FakeIngest::default(), SyncSettings::default(), allow_list).await;

    let prepared = h
        .orchestrator
        .prepare(&h.credential, SyncRequest::scheduled(), Utc::now())
        .await
        .unwrap();
    let session = h.orchestrator.run(prepared).await.unwrap();

    assert_eq!(session.total_found, 2);
    assert_eq!(session.total_ingested, 2);
    assert_eq!(session.senders_completed, vec!["vendor-a", "vendor"]);
    assert_eq!(h.source.calls.lock().unwrap().fetched, vec![vec![1], vec![2]]);

    let mut subjects: Vec<String> = h
        .ingest
        .received
        .lock()
        .unwrap()
        .iter()
        .map(|r| r.subject.clone())
        .collect();
    subjects.sort();
    assert_eq!(subjects, vec!["Order 1", "Order 2"]);
}

#[tokio::test]
async fn test_back_to_back_manual_syncs() {
    let h = harness(two_senders(), FakeIngest::default(), SyncSettings::default()).await;
    let request = SyncRequest::manual(SyncMode::Real, None);

    let first = h
        .orchestrator
        .prepare(&h.credential, request, Utc::now())
        .await
        .unwrap();
    // Same snapshot the first request saw, before any sync has finished.
    let second = h
        .orchestrator
        .prepare(&h.credential, request, Utc::now())
        .await;

    let claimed = h
        .repo
        .get(h.credential.id)
        .await
        .unwrap()
        .unwrap()
        .last_manual_sync_at
        .unwrap();
    match second {
        Err(Error::RateLimited { retry_after }) => {
            assert_eq!(retry_after, claimed + chrono::Duration::hours(24));
        }
        other => panic!("expected rate limit, got {other:?}"),
    }

    h.orchestrator.run(first).await.unwrap();
    assert_eq!(h.ingest.received.lock().unwrap().len(), 3);
}

#[tokio::test]
async fn test_failed_manual_sync_uses_daily_slot() {
    let script = Script {
        connect_error: Some(SyncError::Connection("refused".to_string())),
        ..two_senders()
    };
    let h = harness(script, FakeIngest::default(), SyncSettings::default()).await;
    let request = SyncRequest::manual(SyncMode::Real, None);

    let prepared = h
        .orchestrator
        .prepare(&h.credential, request, Utc::now())
        .await
        .unwrap();
    let session = h.orchestrator.run(prepared).await.unwrap();
    assert_eq!(session.status, SyncStatus::Failed);

    let stored = h.repo.get(h.credential.id).await.unwrap().unwrap();
    assert!(stored.last_manual_sync_at.is_some());
    assert!(stored.last_sync_at.is_none());
    let audit = h.repo.recent_audit(h.credential.id, 5).await.unwrap();
    assert_eq!(audit[0].status, AuditStatus::Error);

    let retry = h.orchestrator.prepare(&stored, request, Utc::now()).await;
    assert!(matches!(retry, Err(Error::RateLimited { .. })));
}
