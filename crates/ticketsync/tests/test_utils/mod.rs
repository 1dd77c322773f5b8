//! Shared fixtures for the API and job tests.

#![allow(
    dead_code,
    clippy::unwrap_used,
    clippy::expect_used,
    missing_docs
)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::http::{Request, Response};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::NaiveDate;
use ticketsync::api::{self, AppState};
use ticketsync::auth::TrustedHeader;
use ticketsync_core::allowlist::Policy;
use ticketsync_core::{
    AllowList, CredentialRepository, IngestOutcome, IngestRecord, IngestSink, Mailbox,
    MailSource, MemorySessionStore, NewCredential, Orchestrator, PendingLogin, SecretCipher,
    SyncError, SyncSettings,
};
use ticketsync_imap::{RawMessage, Uid};
use tokio::time::Instant;
use tower::util::ServiceExt;

pub const OWNER: &str = "user-1";
pub const VENDOR: &str = "orders@vendor-a.com";

/// Mailbox holding a fixed set of messages.
#[derive(Clone, Default)]
pub struct FixedSource {
    messages: Arc<Vec<(u32, String, String)>>,
    refuse_connect: bool,
    connect_delay: Option<Duration>,
}

impl FixedSource {
    /// Mailbox with `count` vendor emails.
    pub fn with_orders(count: u32) -> Self {
        let messages = (1..=count)
            .map(|uid| (uid, format!("Vendor A <{VENDOR}>"), format!("Order {uid}")))
            .collect();
        Self {
            messages: Arc::new(messages),
            refuse_connect: false,
            connect_delay: None,
        }
    }

    /// Same mailbox, but every connection takes `delay` to open.
    pub fn slow(mut self, delay: Duration) -> Self {
        self.connect_delay = Some(delay);
        self
    }

    /// Mailbox whose server cannot be reached.
    pub fn unreachable() -> Self {
        Self {
            messages: Arc::default(),
            refuse_connect: true,
            connect_delay: None,
        }
    }
}

#[async_trait]
impl MailSource for FixedSource {
    async fn connect(&self, host: &str, _port: u16) -> Result<Box<dyn PendingLogin>, SyncError> {
        if let Some(delay) = self.connect_delay {
            tokio::time::sleep(delay).await;
        }
        if self.refuse_connect {
            return Err(SyncError::Connection(format!("{host}: connection refused")));
        }
        Ok(Box::new(self.clone()))
    }
}

#[async_trait]
impl PendingLogin for FixedSource {
    async fn login(
        self: Box<Self>,
        _login: &str,
        _secret: &str,
        _deadline: Instant,
    ) -> Result<Box<dyn Mailbox>, SyncError> {
        Ok(self)
    }
}

#[async_trait]
impl Mailbox for FixedSource {
    async fn search(&mut self, from: &str, _since: NaiveDate) -> Result<Vec<Uid>, SyncError> {
        Ok(self
            .messages
            .iter()
            .filter(|(_, sender, _)| sender.contains(from))
            .filter_map(|(uid, _, _)| Uid::new(*uid))
            .collect())
    }

    async fn fetch(&mut self, uids: &[Uid]) -> Result<Vec<RawMessage>, SyncError> {
        Ok(self
            .messages
            .iter()
            .filter(|(uid, _, _)| uids.iter().any(|u| u.get() == *uid))
            .map(|(uid, sender, subject)| RawMessage {
                seq: *uid,
                uid: Uid::new(*uid),
                header: format!(
                    "From: {sender}\r\nSubject: {subject}\r\n\
                     Date: Fri, 5 Jan 2024 10:00:00 +0000\r\nMessage-ID: <{uid}@vendor-a>\r\n\r\n"
                )
                .into_bytes(),
                text: format!("Your tickets for {subject}\r\n").into_bytes(),
            })
            .collect())
    }

    async fn logout(self: Box<Self>) {}
}

/// Ingest sink that accepts everything and keeps what it got.
#[derive(Default)]
pub struct RecordingIngest {
    pub received: Mutex<Vec<IngestRecord>>,
}

impl RecordingIngest {
    pub fn count(&self) -> usize {
        self.received.lock().unwrap().len()
    }
}

#[async_trait]
impl IngestSink for RecordingIngest {
    async fn send(&self, record: &IngestRecord) -> IngestOutcome {
        self.received.lock().unwrap().push(record.clone());
        IngestOutcome::Accepted
    }
}

pub struct TestApp {
    pub app: Router,
    pub orchestrator: Orchestrator,
    pub ingest: Arc<RecordingIngest>,
    pub credential_id: i64,
}

impl TestApp {
    /// Inserts another credential and returns its id.
    pub async fn add_credential(&self, owner: &str, auto_sync: bool) -> i64 {
        let (encrypted_secret, iv) = cipher().encrypt("app-password").unwrap();
        self.orchestrator
            .credentials()
            .insert(&NewCredential {
                owner_id: owner.to_string(),
                host: "imap.example.com".to_string(),
                port: 993,
                login: format!("{owner}@example.com"),
                encrypted_secret,
                iv,
                auto_sync,
            })
            .await
            .unwrap()
            .id
            .0
    }
}

fn cipher() -> SecretCipher {
    SecretCipher::from_base64_key(&BASE64.encode([7u8; 32])).unwrap()
}

/// App over `source` with one auto-sync credential owned by [`OWNER`].
pub async fn test_app(source: FixedSource) -> TestApp {
    let repo = CredentialRepository::in_memory().await.unwrap();
    let allow_list = AllowList::new(Policy::Exact, &[VENDOR]).unwrap();
    let ingest = Arc::new(RecordingIngest::default());
    let orchestrator = Orchestrator::new(
        Arc::new(source),
        Arc::new(MemorySessionStore::new()),
        ingest.clone(),
        Arc::new(allow_list),
        repo,
        cipher(),
        SyncSettings::default(),
    );

    let state = Arc::new(AppState::new(orchestrator.clone(), Arc::new(TrustedHeader)));
    let mut app = TestApp {
        app: api::app(state),
        orchestrator,
        ingest,
        credential_id: 0,
    };
    app.credential_id = app.add_credential(OWNER, true).await;
    app
}

pub async fn body_to_string(body: Body) -> String {
    let bytes = axum::body::to_bytes(body, usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

pub async fn body_to_json(body: Body) -> serde_json::Value {
    serde_json::from_str(&body_to_string(body).await).unwrap()
}

pub async fn post_sync(app: &Router, owner: Option<&str>, json: serde_json::Value) -> Response<Body> {
    let mut request = Request::builder()
        .uri("/api/sync")
        .method("POST")
        .header("content-type", "application/json");
    if let Some(owner) = owner {
        request = request.header("x-user-id", owner);
    }
    app.clone()
        .oneshot(request.body(Body::from(json.to_string())).unwrap())
        .await
        .unwrap()
}

pub async fn get_status(app: &Router, owner: &str, session_id: &str) -> Response<Body> {
    let request = Request::builder()
        .uri(format!("/api/sync-status?sessionId={session_id}"))
        .method("GET")
        .header("x-user-id", owner)
        .body(Body::empty())
        .unwrap();
    app.clone().oneshot(request).await.unwrap()
}

/// Polls the status endpoint until the session is terminal.
pub async fn wait_for_terminal(app: &Router, owner: &str, session_id: &str) -> serde_json::Value {
    for _ in 0..200 {
        let response = get_status(app, owner, session_id).await;
        let json = body_to_json(response.into_body()).await;
        if json["status"] == "completed" || json["status"] == "failed" {
            return json;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("session {session_id} never finished");
}
