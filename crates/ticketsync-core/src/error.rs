//! Error types for the core library.

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::session::{SessionId, SyncStatus};
use crate::sync::SyncError;

/// Errors that can occur in core operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Mail retrieval failed.
    #[error(transparent)]
    Sync(#[from] SyncError),

    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// HTTP client could not be built or a request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Secret could not be decrypted or encrypted.
    #[error("Secret cipher error: {0}")]
    Cipher(String),

    /// Configuration or request validation error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Credential not found.
    #[error("Credential not found: {0}")]
    CredentialNotFound(i64),

    /// Sync session not found (unknown or expired).
    #[error("Sync session not found: {0}")]
    SessionNotFound(SessionId),

    /// Sync session belongs to another owner.
    #[error("Sync session {0} belongs to another user")]
    SessionForbidden(SessionId),

    /// Email index outside the session's email list.
    #[error("Email index {index} out of range for session {session}")]
    EmailNotFound {
        /// Session the lookup was made against.
        session: SessionId,
        /// Requested index.
        index: usize,
    },

    /// A session status change would move backwards.
    #[error("Invalid status transition from {from:?} to {to:?}")]
    InvalidTransition {
        /// Current status.
        from: SyncStatus,
        /// Requested status.
        to: SyncStatus,
    },

    /// Manual sync requested again within the cool-down window.
    #[error("Manual sync rate limited until {retry_after}")]
    RateLimited {
        /// Earliest time a manual sync is accepted again.
        retry_after: DateTime<Utc>,
    },
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;
