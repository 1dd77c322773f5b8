//! Fetch phase: connect, walk the allow-list, extract.
//!
//! Progress is reported as [`SyncEvent`]s on a channel; the caller decides
//! whether to republish them into a session or just collect the emails.

use std::collections::HashSet;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use ticketsync_imap::Uid;
use tokio::sync::mpsc;
use tokio::time::{Instant, timeout_at};
use tracing::{debug, info, warn};

use super::SyncError;
use crate::allowlist::AllowList;
use crate::extract::{Email, extract};
use crate::session::ConnectionState;
use crate::source::{MailSource, Mailbox};

/// Extra time a source gets past the login deadline to send LOGOUT.
const LOGOUT_GRACE: Duration = Duration::from_secs(5);

/// Progress reported by the fetch phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    /// Connection state changed.
    Connection(ConnectionState),
    /// Connecting or logging in failed, or the connection was lost.
    ConnectionFailed(String),
    /// A sender is about to be searched.
    SenderStarted(String),
    /// An allow-listed email was extracted.
    EmailFound(Email),
    /// A sender was processed.
    SenderCompleted {
        /// Search term.
        sender: String,
        /// Emails kept for this sender.
        found: usize,
        /// Search/fetch error, if the sender was skipped.
        error: Option<String>,
    },
}

/// Everything the fetch phase needs for one mailbox.
pub(crate) struct FetchJob<'a> {
    pub source: &'a dyn MailSource,
    pub allow_list: &'a AllowList,
    pub host: &'a str,
    pub port: u16,
    pub login: &'a str,
    pub secret: &'a str,
    pub since: NaiveDate,
    pub connect_timeout: Duration,
    pub per_sender_cap: usize,
}

impl FetchJob<'_> {
    /// Runs the fetch phase, consuming `events`.
    ///
    /// Returns the fatal error that ended the phase early, if any. Per-sender
    /// command failures are reported as events and do not stop the walk.
    pub(crate) async fn run(self, events: mpsc::Sender<SyncEvent>) -> Result<(), SyncError> {
        let deadline = Instant::now() + self.connect_timeout;

        emit(&events, SyncEvent::Connection(ConnectionState::Connecting)).await;
        let pending = match timeout_at(deadline, self.source.connect(self.host, self.port)).await {
            Ok(Ok(pending)) => pending,
            Ok(Err(e)) => return fail_connection(&events, e).await,
            Err(_) => return fail_connection(&events, SyncError::timed_out()).await,
        };

        emit(&events, SyncEvent::Connection(ConnectionState::Authenticating)).await;
        let login = pending.login(self.login, self.secret, deadline);
        let mut mailbox = match timeout_at(deadline + LOGOUT_GRACE, login).await {
            Ok(Ok(mailbox)) => mailbox,
            Ok(Err(e)) => return fail_connection(&events, e).await,
            Err(_) => return fail_connection(&events, SyncError::timed_out()).await,
        };
        emit(&events, SyncEvent::Connection(ConnectionState::Connected)).await;
        info!("Connected to {}:{} as {}", self.host, self.port, self.login);

        // Search terms can overlap, so one message may match several senders.
        let mut seen = HashSet::new();
        for sender in self.allow_list.search_terms() {
            emit(&events, SyncEvent::SenderStarted(sender.clone())).await;

            match self
                .fetch_sender(mailbox.as_mut(), &sender, &mut seen, Utc::now())
                .await
            {
                Ok(emails) => {
                    let found = emails.len();
                    for email in emails {
                        emit(&events, SyncEvent::EmailFound(email)).await;
                    }
                    debug!("Sender {sender}: {found} emails");
                    emit(&events, SyncEvent::SenderCompleted { sender, found, error: None }).await;
                }
                Err(e) if !e.is_fatal() => {
                    warn!("Sender {sender} skipped: {e}");
                    let error = Some(e.to_string());
                    emit(&events, SyncEvent::SenderCompleted { sender, found: 0, error }).await;
                }
                Err(e) => {
                    mailbox.logout().await;
                    if matches!(e, SyncError::Connection(_)) {
                        emit(&events, SyncEvent::ConnectionFailed(e.to_string())).await;
                    }
                    return Err(e);
                }
            }
        }

        mailbox.logout().await;
        Ok(())
    }

    async fn fetch_sender(
        &self,
        mailbox: &mut dyn Mailbox,
        sender: &str,
        seen: &mut HashSet<Uid>,
        now: DateTime<Utc>,
    ) -> Result<Vec<Email>, SyncError> {
        let mut uids = mailbox.search(sender, self.since).await?;
        uids.retain(|uid| !seen.contains(uid));
        if uids.is_empty() {
            return Ok(Vec::new());
        }
        uids.sort_unstable_by(|a, b| b.cmp(a));
        uids.truncate(self.per_sender_cap);

        let messages = mailbox.fetch(&uids).await?;
        seen.extend(uids);
        Ok(messages
            .iter()
            .filter_map(|raw| extract(raw, now))
            .filter(|email| self.allow_list.is_approved(&email.sender))
            .collect())
    }
}

async fn fail_connection(events: &mpsc::Sender<SyncEvent>, error: SyncError) -> Result<(), SyncError> {
    emit(events, SyncEvent::ConnectionFailed(error.to_string())).await;
    Err(error)
}

async fn emit(events: &mpsc::Sender<SyncEvent>, event: SyncEvent) {
    if events.send(event).await.is_err() {
        debug!("Sync event receiver dropped");
    }
}
