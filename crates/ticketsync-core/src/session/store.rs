//! Session storage.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use tokio::sync::RwLock;
use tracing::debug;

use super::model::{IngestStatus, SessionId, SessionUpdate, SyncSession};
use crate::extract::Email;
use crate::{Error, Result};

/// Keyed container for sync sessions.
///
/// Implementations are passive: they never change a session on their own
/// except to evict it once it has been finished for long enough.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Creates a session for `owner` and returns its ID.
    async fn create(&self, owner: &str, senders_total: usize) -> SessionId;

    /// Returns a snapshot of the session.
    async fn get(&self, id: SessionId) -> Option<SyncSession>;

    /// Returns a snapshot of the session if `owner` owns it.
    ///
    /// # Errors
    ///
    /// [`Error::SessionNotFound`] when unknown or expired,
    /// [`Error::SessionForbidden`] when owned by someone else.
    async fn get_for_owner(&self, id: SessionId, owner: &str) -> Result<SyncSession>;

    /// Applies an update to the session.
    ///
    /// # Errors
    ///
    /// [`Error::SessionNotFound`] or [`Error::InvalidTransition`].
    async fn update(&self, id: SessionId, update: SessionUpdate) -> Result<()>;

    /// Appends an email as `Pending` and returns its index.
    ///
    /// # Errors
    ///
    /// [`Error::SessionNotFound`].
    async fn append_email(&self, id: SessionId, email: Email) -> Result<usize>;

    /// Sets the ingest status of one email.
    ///
    /// # Errors
    ///
    /// [`Error::SessionNotFound`] or [`Error::EmailNotFound`].
    async fn set_email_status(
        &self,
        id: SessionId,
        index: usize,
        status: IngestStatus,
        error: Option<String>,
    ) -> Result<()>;

    /// Removes sessions that reached a terminal status at least `max_age`
    /// ago; returns how many. Running sessions are never removed.
    async fn sweep_expired(&self, max_age: Duration) -> usize;
}

/// In-process session store.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    sessions: RwLock<HashMap<SessionId, SyncSession>>,
}

impl MemorySessionStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live sessions.
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Returns true when no session is stored.
    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn create(&self, owner: &str, senders_total: usize) -> SessionId {
        let id = SessionId::new();
        let session = SyncSession::new(id, owner, senders_total, Utc::now());
        self.sessions.write().await.insert(id, session);
        debug!("Created sync session {id}");
        id
    }

    async fn get(&self, id: SessionId) -> Option<SyncSession> {
        self.sessions.read().await.get(&id).cloned()
    }

    async fn get_for_owner(&self, id: SessionId, owner: &str) -> Result<SyncSession> {
        let sessions = self.sessions.read().await;
        let session = sessions.get(&id).ok_or(Error::SessionNotFound(id))?;
        if session.owner_id != owner {
            return Err(Error::SessionForbidden(id));
        }
        Ok(session.clone())
    }

    async fn update(&self, id: SessionId, update: SessionUpdate) -> Result<()> {
        let mut sessions = self.sessions.write().await;
        let session = sessions.get_mut(&id).ok_or(Error::SessionNotFound(id))?;
        session.apply(update, Utc::now())
    }

    async fn append_email(&self, id: SessionId, email: Email) -> Result<usize> {
        let mut sessions = self.sessions.write().await;
        let session = sessions.get_mut(&id).ok_or(Error::SessionNotFound(id))?;
        Ok(session.push_email(email))
    }

    async fn set_email_status(
        &self,
        id: SessionId,
        index: usize,
        status: IngestStatus,
        error: Option<String>,
    ) -> Result<()> {
        let mut sessions = self.sessions.write().await;
        let session = sessions.get_mut(&id).ok_or(Error::SessionNotFound(id))?;
        if session.set_email_status(index, status, error) {
            Ok(())
        } else {
            Err(Error::EmailNotFound { session: id, index })
        }
    }

    async fn sweep_expired(&self, max_age: Duration) -> usize {
        let now = Utc::now();
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, s| s.completed_at.is_none_or(|done| now - done < max_age));
        let removed = before - sessions.len();
        if removed > 0 {
            debug!("Swept {removed} expired sync sessions");
        }
        removed
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
    use crate::session::{ConnectionState, SyncStatus};

    fn email(subject: &str) -> Email {
        Email {
            message_id: format!("<{subject}@example.com>"),
            sender: "orders@tickets.com".to_string(),
            subject: subject.to_string(),
            sent_at: Utc::now(),
            body: String::new(),
        }
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let store = MemorySessionStore::new();
        let id = store.create("user-1", 3).await;
        let session = store.get(id).await.unwrap();
        assert_eq!(session.owner_id, "user-1");
        assert_eq!(session.senders_total, 3);
        assert_eq!(session.status, SyncStatus::Fetching);
        assert_eq!(session.connection_state, ConnectionState::Connecting);
    }

    #[tokio::test]
    async fn test_get_for_owner() {
        let store = MemorySessionStore::new();
        let id = store.create("user-1", 1).await;
        assert!(store.get_for_owner(id, "user-1").await.is_ok());
        assert!(matches!(
            store.get_for_owner(id, "user-2").await,
            Err(Error::SessionForbidden(_))
        ));
        assert!(matches!(
            store.get_for_owner(SessionId::new(), "user-1").await,
            Err(Error::SessionNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_append_and_set_status() {
        let store = MemorySessionStore::new();
        let id = store.create("user-1", 1).await;
        let first = store.append_email(id, email("a")).await.unwrap();
        let second = store.append_email(id, email("b")).await.unwrap();
        assert_eq!((first, second), (0, 1));

        store
            .set_email_status(id, 1, IngestStatus::Success, None)
            .await
            .unwrap();
        store
            .set_email_status(id, 0, IngestStatus::Failed, Some("HTTP 500".into()))
            .await
            .unwrap();

        let session = store.get(id).await.unwrap();
        assert_eq!(session.total_found, 2);
        assert_eq!(session.total_ingested, 1);
        assert_eq!(session.emails[0].ingest_error.as_deref(), Some("HTTP 500"));

        assert!(matches!(
            store
                .set_email_status(id, 5, IngestStatus::Success, None)
                .await,
            Err(Error::EmailNotFound { index: 5, .. })
        ));
    }

    #[tokio::test]
    async fn test_update_unknown_session() {
        let store = MemorySessionStore::new();
        let result = store.update(SessionId::new(), SessionUpdate::Completed).await;
        assert!(matches!(result, Err(Error::SessionNotFound(_))));
    }

    #[tokio::test]
    async fn test_sweep_expired() {
        let store = MemorySessionStore::new();
        let done = store.create("user-1", 1).await;
        let failed = store.create("user-2", 1).await;
        store.update(done, SessionUpdate::Completed).await.unwrap();
        store
            .update(failed, SessionUpdate::Failed("refused".into()))
            .await
            .unwrap();

        assert_eq!(store.sweep_expired(Duration::hours(1)).await, 0);
        assert_eq!(store.len().await, 2);

        assert_eq!(store.sweep_expired(Duration::zero()).await, 2);
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_sweep_keeps_running_sessions() {
        let store = MemorySessionStore::new();
        let running = store.create("user-1", 1).await;
        store
            .update(running, SessionUpdate::Status(SyncStatus::Ingesting))
            .await
            .unwrap();
        store.append_email(running, email("a")).await.unwrap();

        assert_eq!(store.sweep_expired(Duration::zero()).await, 0);
        store
            .set_email_status(running, 0, IngestStatus::Success, None)
            .await
            .unwrap();

        store.update(running, SessionUpdate::Completed).await.unwrap();
        assert_eq!(store.sweep_expired(Duration::zero()).await, 1);
    }
}
