//! Progressive sync orchestration.
//!
//! One [`Orchestrator`] serves every mode:
//!
//! ```text
//! DryRun:  fetch ──────────────────────────────→ Vec<Email>
//! Preview: fetch → session(Completed)
//! Real:    fetch → session(Ingesting) → ingest → ledger → session(Completed)
//! ```
//!
//! The fetch phase streams [`SyncEvent`]s over a channel; the orchestrator
//! republishes them into the session store while the phase runs.

mod error;
mod fetch;

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

pub use error::SyncError;
pub use fetch::SyncEvent;

use crate::allowlist::AllowList;
use crate::credentials::{
    AuditRow, AuditStatus, Credential, CredentialId, CredentialRepository, SecretCipher,
};
use crate::extract::Email;
use crate::ingest::{IngestRecord, IngestSink};
use crate::session::{
    IngestStatus, SessionId, SessionStore, SessionUpdate, SyncSession, SyncStatus,
};
use crate::source::MailSource;
use crate::{Error, Result};
use fetch::FetchJob;

/// Shortest accepted connect/login timeout.
pub const MIN_CONNECT_TIMEOUT: Duration = Duration::from_secs(15);
/// Longest accepted connect/login timeout.
pub const MAX_CONNECT_TIMEOUT: Duration = Duration::from_secs(300);
/// Default connect/login timeout.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

const EVENT_BUFFER: usize = 64;

/// What a sync run does with what it finds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncMode {
    /// Return the extracted emails; no session, ingest or persistence.
    DryRun,
    /// Pollable session, no ingest, no persistence.
    Preview,
    /// Full sync.
    Real,
}

/// Who asked for the sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// A user, over HTTP or the CLI. Rate limited.
    Manual,
    /// The scheduler.
    Scheduled,
}

/// Parameters of one sync request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncRequest {
    /// Explicit lookback in days, overriding the last sync timestamp.
    pub lookback_days: Option<u32>,
    /// Run mode.
    pub mode: SyncMode,
    /// Origin of the request.
    pub trigger: Trigger,
}

impl SyncRequest {
    /// A full scheduled sync.
    #[must_use]
    pub const fn scheduled() -> Self {
        Self {
            lookback_days: None,
            mode: SyncMode::Real,
            trigger: Trigger::Scheduled,
        }
    }

    /// A manual sync in `mode`.
    #[must_use]
    pub const fn manual(mode: SyncMode, lookback_days: Option<u32>) -> Self {
        Self {
            lookback_days,
            mode,
            trigger: Trigger::Manual,
        }
    }
}

/// Tunables shared by every sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncSettings {
    /// Wall-clock bound on connect, greeting, STARTTLS and LOGIN.
    pub connect_timeout: Duration,
    /// Lookback when neither an override nor a last sync exists.
    pub default_lookback_days: u32,
    /// Most recent messages kept per sender.
    pub per_sender_cap: usize,
    /// Minimum time between two manual syncs of one credential.
    pub manual_cooldown: chrono::Duration,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            default_lookback_days: 30,
            per_sender_cap: 10,
            manual_cooldown: chrono::Duration::hours(24),
        }
    }
}

impl SyncSettings {
    /// Sets the connect timeout, clamped to the accepted range.
    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout.clamp(MIN_CONNECT_TIMEOUT, MAX_CONNECT_TIMEOUT);
        self
    }
}

/// Start of the SEARCH window.
///
/// An explicit day count wins over the last successful sync, which wins
/// over the default window.
#[must_use]
pub fn lookback_since(
    override_days: Option<u32>,
    last_sync_at: Option<DateTime<Utc>>,
    default_days: u32,
    now: DateTime<Utc>,
) -> NaiveDate {
    let days_ago = |days: u32| (now - chrono::Duration::days(i64::from(days))).date_naive();
    match (override_days, last_sync_at) {
        (Some(days), _) => days_ago(days),
        (None, Some(last)) => last.date_naive(),
        (None, None) => days_ago(default_days),
    }
}

/// A validated sync, ready to run. Holds the decrypted secret.
pub struct PreparedSync {
    credential_id: CredentialId,
    owner_id: String,
    host: String,
    port: u16,
    login: String,
    secret: String,
    since: NaiveDate,
    request: SyncRequest,
}

impl std::fmt::Debug for PreparedSync {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PreparedSync")
            .field("credential_id", &self.credential_id)
            .field("owner_id", &self.owner_id)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("login", &self.login)
            .field("since", &self.since)
            .field("request", &self.request)
            .finish_non_exhaustive()
    }
}

impl PreparedSync {
    /// Credential being synced.
    #[must_use]
    pub const fn credential_id(&self) -> CredentialId {
        self.credential_id
    }

    /// Owner of the credential.
    #[must_use]
    pub fn owner_id(&self) -> &str {
        &self.owner_id
    }

    /// First day covered by SEARCH.
    #[must_use]
    pub const fn since(&self) -> NaiveDate {
        self.since
    }

    /// Run mode.
    #[must_use]
    pub const fn mode(&self) -> SyncMode {
        self.request.mode
    }
}

/// Drives syncs across the mail source, session store, ingest sink and
/// credential ledger.
#[derive(Clone)]
pub struct Orchestrator {
    source: Arc<dyn MailSource>,
    sessions: Arc<dyn SessionStore>,
    ingest: Arc<dyn IngestSink>,
    allow_list: Arc<AllowList>,
    credentials: CredentialRepository,
    cipher: SecretCipher,
    settings: SyncSettings,
}

impl Orchestrator {
    /// Creates an orchestrator.
    #[must_use]
    pub fn new(
        source: Arc<dyn MailSource>,
        sessions: Arc<dyn SessionStore>,
        ingest: Arc<dyn IngestSink>,
        allow_list: Arc<AllowList>,
        credentials: CredentialRepository,
        cipher: SecretCipher,
        settings: SyncSettings,
    ) -> Self {
        Self {
            source,
            sessions,
            ingest,
            allow_list,
            credentials,
            cipher,
            settings,
        }
    }

    /// Session store the orchestrator writes to.
    #[must_use]
    pub fn sessions(&self) -> &Arc<dyn SessionStore> {
        &self.sessions
    }

    /// Credential ledger.
    #[must_use]
    pub const fn credentials(&self) -> &CredentialRepository {
        &self.credentials
    }

    /// Settings in effect.
    #[must_use]
    pub const fn settings(&self) -> &SyncSettings {
        &self.settings
    }

    /// Validates a request against `credential` and decrypts its secret.
    ///
    /// A manual real sync claims the credential's manual slot before this
    /// returns; a concurrent request for the same credential is rejected.
    ///
    /// # Errors
    ///
    /// [`Error::RateLimited`] for a manual real sync inside the cool-down
    /// window, [`Error::Cipher`] when the secret cannot be decrypted.
    pub async fn prepare(
        &self,
        credential: &Credential,
        request: SyncRequest,
        now: DateTime<Utc>,
    ) -> Result<PreparedSync> {
        let rate_limited = request.trigger == Trigger::Manual && request.mode == SyncMode::Real;
        if rate_limited && let Some(last) = credential.last_manual_sync_at {
            let retry_after = last + self.settings.manual_cooldown;
            if now < retry_after {
                return Err(Error::RateLimited { retry_after });
            }
        }

        let secret = self
            .cipher
            .decrypt(&credential.encrypted_secret, &credential.iv)?;
        let since = lookback_since(
            request.lookback_days,
            credential.last_sync_at,
            self.settings.default_lookback_days,
            now,
        );

        if rate_limited
            && !self
                .credentials
                .claim_manual_sync(credential.id, credential.last_manual_sync_at, now)
                .await?
        {
            let last = self
                .credentials
                .get(credential.id)
                .await?
                .and_then(|c| c.last_manual_sync_at)
                .unwrap_or(now);
            return Err(Error::RateLimited {
                retry_after: last + self.settings.manual_cooldown,
            });
        }

        Ok(PreparedSync {
            credential_id: credential.id,
            owner_id: credential.owner_id.clone(),
            host: credential.host.clone(),
            port: credential.port,
            login: credential.login.clone(),
            secret,
            since,
            request,
        })
    }

    /// Runs the fetch phase only and returns what it found.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Sync`] when the fetch phase hits a fatal error.
    pub async fn run_dry(&self, prepared: PreparedSync) -> Result<Vec<Email>> {
        let (tx, mut rx) = mpsc::channel(EVENT_BUFFER);
        let fetch = self.fetch_job(&prepared).run(tx);
        let collect = async {
            let mut emails = Vec::new();
            while let Some(event) = rx.recv().await {
                if let SyncEvent::EmailFound(email) = event {
                    emails.push(email);
                }
            }
            emails
        };

        let (result, emails) = tokio::join!(fetch, collect);
        drop(prepared);
        result?;
        info!("Dry run found {} emails", emails.len());
        Ok(emails)
    }

    /// Creates a session and runs the sync in a detached task.
    pub async fn start(&self, prepared: PreparedSync) -> SessionId {
        let id = self.create_session(&prepared).await;
        let this = self.clone();
        tokio::spawn(async move {
            if let Err(e) = this.execute(prepared, id).await {
                error!("Sync session {id} aborted: {e}");
            }
        });
        id
    }

    /// Creates a session, runs the sync to completion and returns the
    /// final snapshot.
    ///
    /// # Errors
    ///
    /// Returns an error if the session store rejects an update.
    pub async fn run(&self, prepared: PreparedSync) -> Result<SyncSession> {
        let id = self.create_session(&prepared).await;
        self.execute(prepared, id).await?;
        self.sessions.get(id).await.ok_or(Error::SessionNotFound(id))
    }

    async fn create_session(&self, prepared: &PreparedSync) -> SessionId {
        let senders = self.allow_list.search_terms().len();
        let id = self.sessions.create(&prepared.owner_id, senders).await;
        info!(
            "Sync session {id} created for credential {} ({:?})",
            prepared.credential_id,
            prepared.mode()
        );
        id
    }

    fn fetch_job<'a>(&'a self, prepared: &'a PreparedSync) -> FetchJob<'a> {
        FetchJob {
            source: self.source.as_ref(),
            allow_list: &self.allow_list,
            host: &prepared.host,
            port: prepared.port,
            login: &prepared.login,
            secret: &prepared.secret,
            since: prepared.since,
            connect_timeout: self.settings.connect_timeout,
            per_sender_cap: self.settings.per_sender_cap,
        }
    }

    async fn execute(&self, prepared: PreparedSync, id: SessionId) -> Result<()> {
        let started_at = Utc::now();
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let (result, ()) = tokio::join!(
            self.fetch_job(&prepared).run(tx),
            self.republish(id, rx)
        );

        let PreparedSync {
            credential_id,
            owner_id,
            login,
            request,
            secret,
            ..
        } = prepared;
        drop(secret);

        if let Err(e) = result {
            error!("Sync session {id} failed: {e}");
            if request.mode == SyncMode::Real {
                let found = self.sessions.get(id).await.map_or(0, |s| s.total_found);
                self.audit(credential_id, started_at, found, 0, Some(e.to_string()))
                    .await;
            }
            self.sessions
                .update(id, SessionUpdate::Failed(e.to_string()))
                .await?;
            return Ok(());
        }

        if request.mode == SyncMode::Preview {
            self.sessions.update(id, SessionUpdate::Completed).await?;
            return Ok(());
        }

        self.sessions
            .update(id, SessionUpdate::Status(SyncStatus::Ingesting))
            .await?;
        let emails = self
            .sessions
            .get(id)
            .await
            .ok_or(Error::SessionNotFound(id))?
            .emails;

        let mut ingested = 0;
        for (index, progress) in emails.iter().enumerate() {
            self.sessions
                .set_email_status(id, index, IngestStatus::Sending, None)
                .await?;
            let record = IngestRecord::new(&progress.email, &login, &owner_id);
            let outcome = self.ingest.send(&record).await;
            if outcome.is_accepted() {
                ingested += 1;
                self.sessions
                    .set_email_status(id, index, IngestStatus::Success, None)
                    .await?;
            } else {
                warn!("Ingest of {} failed", progress.email.message_id);
                self.sessions
                    .set_email_status(id, index, IngestStatus::Failed, outcome.error_message())
                    .await?;
            }
        }

        let finished_at = Utc::now();
        if let Err(e) = self
            .credentials
            .record_sync(credential_id, finished_at, request.trigger == Trigger::Manual)
            .await
        {
            error!("Failed to record sync for credential {credential_id}: {e}");
        }
        self.audit(credential_id, started_at, emails.len(), ingested, None)
            .await;

        self.sessions.update(id, SessionUpdate::Completed).await?;
        info!(
            "Sync session {id} completed: {ingested}/{} ingested",
            emails.len()
        );
        Ok(())
    }

    async fn republish(&self, id: SessionId, mut events: mpsc::Receiver<SyncEvent>) {
        while let Some(event) = events.recv().await {
            let result = match event {
                SyncEvent::Connection(state) => {
                    self.sessions.update(id, SessionUpdate::Connection(state)).await
                }
                SyncEvent::ConnectionFailed(message) => {
                    self.sessions
                        .update(id, SessionUpdate::ConnectionFailed(message))
                        .await
                }
                SyncEvent::SenderStarted(sender) => {
                    self.sessions
                        .update(id, SessionUpdate::CurrentSender(Some(sender)))
                        .await
                }
                SyncEvent::EmailFound(email) => self.sessions.append_email(id, email).await.map(drop),
                SyncEvent::SenderCompleted { sender, .. } => {
                    match self
                        .sessions
                        .update(id, SessionUpdate::SenderCompleted(sender))
                        .await
                    {
                        Ok(()) => self.sessions.update(id, SessionUpdate::CurrentSender(None)).await,
                        Err(e) => Err(e),
                    }
                }
            };
            if let Err(e) = result {
                warn!("Dropping progress for session {id}: {e}");
            }
        }
    }

    async fn audit(
        &self,
        credential_id: CredentialId,
        started_at: DateTime<Utc>,
        found: usize,
        ingested: usize,
        error: Option<String>,
    ) {
        let status = if error.is_some() {
            AuditStatus::Error
        } else {
            AuditStatus::from_totals(found, ingested)
        };
        let row = AuditRow {
            credential_id,
            started_at,
            finished_at: Utc::now(),
            total_found: found,
            total_ingested: ingested,
            status,
            error,
        };
        if let Err(e) = self.credentials.append_audit(&row).await {
            error!("Failed to append audit row for credential {credential_id}: {e}");
        }
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::manual_string_new,
    clippy::needless_collect,
    clippy::unreadable_literal,
    clippy::used_underscore_items,
    clippy::similar_names
)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_lookback_override_wins() {
        let last = Utc.with_ymd_and_hms(2024, 2, 28, 8, 0, 0).unwrap();
        assert_eq!(lookback_since(Some(7), Some(last), 30, now()), date(2024, 2, 23));
    }

    #[test]
    fn test_lookback_last_sync() {
        let last = Utc.with_ymd_and_hms(2024, 2, 28, 8, 0, 0).unwrap();
        assert_eq!(lookback_since(None, Some(last), 30, now()), date(2024, 2, 28));
    }

    #[test]
    fn test_lookback_default() {
        assert_eq!(lookback_since(None, None, 30, now()), date(2024, 1, 31));
    }

    #[test]
    fn test_connect_timeout_clamped() {
        let s = SyncSettings::default().with_connect_timeout(Duration::from_secs(1));
        assert_eq!(s.connect_timeout, MIN_CONNECT_TIMEOUT);
        let s = SyncSettings::default().with_connect_timeout(Duration::from_secs(3600));
        assert_eq!(s.connect_timeout, MAX_CONNECT_TIMEOUT);
        let s = SyncSettings::default().with_connect_timeout(Duration::from_secs(45));
        assert_eq!(s.connect_timeout, Duration::from_secs(45));
        assert_eq!(SyncSettings::default().connect_timeout, DEFAULT_CONNECT_TIMEOUT);
    }
}
