//! Session model types.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::extract::Email;
use crate::{Error, Result};

/// Unique identifier for a sync session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub Uuid);

impl SessionId {
    /// Generates a fresh random session ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for SessionId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Uuid::parse_str(s.trim()).map(Self)
    }
}

/// Overall progress of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    /// Searching and fetching from the mailbox.
    Fetching,
    /// Forwarding extracted emails to the ingest endpoint.
    Ingesting,
    /// Finished; individual emails may still have failed.
    Completed,
    /// Aborted by a fatal error.
    Failed,
}

impl SyncStatus {
    /// Returns true for `Completed` and `Failed`.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    const fn rank(self) -> u8 {
        match self {
            Self::Fetching => 0,
            Self::Ingesting => 1,
            Self::Completed | Self::Failed => 2,
        }
    }

    /// Returns true when moving to `next` keeps the status moving forward.
    ///
    /// Re-asserting a non-terminal status is allowed and changes nothing.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        if self.is_terminal() {
            return false;
        }
        next.rank() >= self.rank()
    }
}

/// Connection progress reported while fetching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    /// Opening TCP/TLS.
    Connecting,
    /// Sending LOGIN.
    Authenticating,
    /// Mailbox selected.
    Connected,
    /// Connection or login failed.
    Error,
}

/// Per-email ingest progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IngestStatus {
    /// Extracted, not yet sent.
    Pending,
    /// Ingest request in flight.
    Sending,
    /// Accepted by the ingest endpoint.
    Success,
    /// Rejected or not delivered.
    Failed,
}

/// An extracted email with its ingest outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailProgress {
    /// The extracted email.
    #[serde(flatten)]
    pub email: Email,
    /// Ingest state.
    pub ingest_status: IngestStatus,
    /// Diagnostic for a failed ingest.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ingest_error: Option<String>,
}

impl EmailProgress {
    /// Wraps a freshly extracted email as `Pending`.
    #[must_use]
    pub const fn pending(email: Email) -> Self {
        Self {
            email,
            ingest_status: IngestStatus::Pending,
            ingest_error: None,
        }
    }
}

/// A change applied to a session by its orchestrator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionUpdate {
    /// Move to a new status.
    Status(SyncStatus),
    /// New connection state.
    Connection(ConnectionState),
    /// Connection failed with a message.
    ConnectionFailed(String),
    /// Sender currently being searched, or `None` when done.
    CurrentSender(Option<String>),
    /// A sender finished (with or without results).
    SenderCompleted(String),
    /// Fatal error; the session ends `Failed`.
    Failed(String),
    /// The session ends `Completed`.
    Completed,
}

/// Snapshot of one sync run, as served to pollers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncSession {
    /// Session ID.
    pub session_id: SessionId,
    /// Owner allowed to read the session.
    pub owner_id: String,
    /// Overall status.
    pub status: SyncStatus,
    /// Emails in discovery order.
    pub emails: Vec<EmailProgress>,
    /// Always `emails.len()`.
    pub total_found: usize,
    /// Number of emails with `Success` ingest status.
    pub total_ingested: usize,
    /// When the session was created.
    pub started_at: DateTime<Utc>,
    /// When the session reached a terminal status.
    pub completed_at: Option<DateTime<Utc>>,
    /// Last fatal error message.
    pub last_error: Option<String>,
    /// Sender currently being searched.
    pub current_sender: Option<String>,
    /// Senders already processed, in completion order.
    pub senders_completed: Vec<String>,
    /// Number of senders the run will walk.
    pub senders_total: usize,
    /// Connection progress.
    pub connection_state: ConnectionState,
    /// Connection failure message.
    pub connection_error: Option<String>,
}

impl SyncSession {
    /// Creates a session in `Fetching` / `Connecting`.
    #[must_use]
    pub fn new(
        session_id: SessionId,
        owner_id: impl Into<String>,
        senders_total: usize,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            session_id,
            owner_id: owner_id.into(),
            status: SyncStatus::Fetching,
            emails: Vec::new(),
            total_found: 0,
            total_ingested: 0,
            started_at,
            completed_at: None,
            last_error: None,
            current_sender: None,
            senders_completed: Vec::new(),
            senders_total,
            connection_state: ConnectionState::Connecting,
            connection_error: None,
        }
    }

    /// Applies an update at time `now`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidTransition`] if the update would move the
    /// status backwards or out of a terminal state.
    pub fn apply(&mut self, update: SessionUpdate, now: DateTime<Utc>) -> Result<()> {
        match update {
            SessionUpdate::Status(status) => self.transition(status, now)?,
            SessionUpdate::Connection(state) => self.connection_state = state,
            SessionUpdate::ConnectionFailed(message) => {
                self.connection_state = ConnectionState::Error;
                self.connection_error = Some(message);
            }
            SessionUpdate::CurrentSender(sender) => self.current_sender = sender,
            SessionUpdate::SenderCompleted(sender) => {
                if !self.senders_completed.contains(&sender) {
                    self.senders_completed.push(sender);
                }
            }
            SessionUpdate::Failed(message) => {
                self.transition(SyncStatus::Failed, now)?;
                self.last_error = Some(message);
                self.current_sender = None;
            }
            SessionUpdate::Completed => {
                self.transition(SyncStatus::Completed, now)?;
                self.current_sender = None;
            }
        }
        Ok(())
    }

    fn transition(&mut self, next: SyncStatus, now: DateTime<Utc>) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(Error::InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        if next.is_terminal() {
            self.completed_at = Some(now);
        }
        Ok(())
    }

    /// Appends an email as `Pending` and returns its index.
    pub fn push_email(&mut self, email: Email) -> usize {
        self.emails.push(EmailProgress::pending(email));
        self.total_found = self.emails.len();
        self.total_found - 1
    }

    /// Sets the ingest status of the email at `index`.
    ///
    /// Returns `false` if `index` is out of range.
    pub fn set_email_status(
        &mut self,
        index: usize,
        status: IngestStatus,
        error: Option<String>,
    ) -> bool {
        let Some(progress) = self.emails.get_mut(index) else {
            return false;
        };
        progress.ingest_status = status;
        progress.ingest_error = error;
        self.total_ingested = self
            .emails
            .iter()
            .filter(|e| e.ingest_status == IngestStatus::Success)
            .count();
        true
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
    use proptest::prelude::*;

    fn email(n: usize) -> Email {
        Email {
            message_id: format!("<{n}@example.com>"),
            sender: "Tickets <orders@tickets.com>".to_string(),
            subject: format!("Order {n}"),
            sent_at: Utc::now(),
            body: "Your order".to_string(),
        }
    }

    fn session() -> SyncSession {
        SyncSession::new(SessionId::new(), "user-1", 2, Utc::now())
    }

    #[test]
    fn test_session_id_roundtrip() {
        let id = SessionId::new();
        assert_eq!(id.to_string().parse::<SessionId>().unwrap(), id);
        assert!("not-a-uuid".parse::<SessionId>().is_err());
    }

    #[test]
    fn test_status_forward_only() {
        use SyncStatus::{Completed, Failed, Fetching, Ingesting};
        assert!(Fetching.can_transition_to(Ingesting));
        assert!(Fetching.can_transition_to(Failed));
        assert!(Fetching.can_transition_to(Completed));
        assert!(Ingesting.can_transition_to(Completed));
        assert!(Ingesting.can_transition_to(Failed));
        assert!(!Ingesting.can_transition_to(Fetching));
        assert!(!Completed.can_transition_to(Failed));
        assert!(!Failed.can_transition_to(Ingesting));
    }

    #[test]
    fn test_backward_transition_rejected() {
        let mut s = session();
        s.apply(SessionUpdate::Status(SyncStatus::Ingesting), Utc::now())
            .unwrap();
        let err = s
            .apply(SessionUpdate::Status(SyncStatus::Fetching), Utc::now())
            .unwrap_err();
        assert!(matches!(err, Error::InvalidTransition { .. }));
        assert_eq!(s.status, SyncStatus::Ingesting);
    }

    #[test]
    fn test_failed_sets_error_and_clears_sender() {
        let mut s = session();
        s.apply(SessionUpdate::CurrentSender(Some("a".into())), Utc::now())
            .unwrap();
        s.apply(SessionUpdate::Failed("timed out".into()), Utc::now())
            .unwrap();
        assert_eq!(s.status, SyncStatus::Failed);
        assert_eq!(s.last_error.as_deref(), Some("timed out"));
        assert!(s.current_sender.is_none());
        assert!(s.completed_at.is_some());
    }

    #[test]
    fn test_connection_failed() {
        let mut s = session();
        s.apply(SessionUpdate::ConnectionFailed("refused".into()), Utc::now())
            .unwrap();
        assert_eq!(s.connection_state, ConnectionState::Error);
        assert_eq!(s.connection_error.as_deref(), Some("refused"));
    }

    #[test]
    fn test_sender_completed_is_idempotent() {
        let mut s = session();
        for _ in 0..3 {
            s.apply(SessionUpdate::SenderCompleted("a".into()), Utc::now())
                .unwrap();
        }
        assert_eq!(s.senders_completed, vec!["a".to_string()]);
    }

    #[test]
    fn test_set_status_out_of_range() {
        let mut s = session();
        assert!(!s.set_email_status(0, IngestStatus::Success, None));
    }

    #[test]
    fn test_serialized_shape() {
        let mut s = session();
        s.push_email(email(1));
        let json = serde_json::to_value(&s).unwrap();
        assert_eq!(json["status"], "fetching");
        assert_eq!(json["connectionState"], "connecting");
        assert_eq!(json["totalFound"], 1);
        assert_eq!(json["emails"][0]["ingestStatus"], "pending");
        assert_eq!(json["emails"][0]["subject"], "Order 1");
        assert!(json["emails"][0].get("ingestError").is_none());
    }

    proptest! {
        #[test]
        fn totals_match_emails(ops in proptest::collection::vec((0usize..8, 0u8..4), 0..40)) {
            let mut s = session();
            for (n, (index, status)) in ops.into_iter().enumerate() {
                if status == 0 {
                    s.push_email(email(n));
                } else {
                    let status = match status {
                        1 => IngestStatus::Sending,
                        2 => IngestStatus::Success,
                        _ => IngestStatus::Failed,
                    };
                    s.set_email_status(index, status, None);
                }
                prop_assert_eq!(s.total_found, s.emails.len());
                let successes = s
                    .emails
                    .iter()
                    .filter(|e| e.ingest_status == IngestStatus::Success)
                    .count();
                prop_assert_eq!(s.total_ingested, successes);
            }
        }
    }
}
