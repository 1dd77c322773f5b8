//! Sync failure classification.

use thiserror::Error;

/// A mail retrieval failure, classified by how the sync must react.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncError {
    /// DNS, TCP, TLS, timeout or server BYE.
    #[error("Connection failed: {0}")]
    Connection(String),

    /// LOGIN rejected. Never retried.
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// Malformed reply, bad greeting or tag desync.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// A single command was refused with NO or BAD.
    #[error("Command failed: {0}")]
    Command(String),
}

impl SyncError {
    /// Returns true when the sync for this account must stop.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        !matches!(self, Self::Command(_))
    }

    /// Connection error reported when the connect/login deadline passes.
    #[must_use]
    pub fn timed_out() -> Self {
        Self::Connection("timed out".to_string())
    }
}

impl From<ticketsync_imap::Error> for SyncError {
    fn from(err: ticketsync_imap::Error) -> Self {
        use ticketsync_imap::Error as Imap;
        match err {
            Imap::Timeout(_) => Self::timed_out(),
            Imap::Io(_) | Imap::Tls(_) | Imap::InvalidDnsName(_) | Imap::Bye(_) => {
                Self::Connection(err.to_string())
            }
            Imap::Auth(message) => Self::Auth(message),
            Imap::Parse { .. } | Imap::Protocol(_) => Self::Protocol(err.to_string()),
            Imap::No(message) | Imap::Bad(message) => Self::Command(message),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn test_imap_error_classification() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        assert!(matches!(
            SyncError::from(ticketsync_imap::Error::Io(io)),
            SyncError::Connection(_)
        ));
        assert_eq!(
            SyncError::from(ticketsync_imap::Error::Timeout(Duration::from_secs(30))),
            SyncError::timed_out()
        );
        assert_eq!(
            SyncError::from(ticketsync_imap::Error::Auth("bad password".into())),
            SyncError::Auth("bad password".into())
        );
        assert!(matches!(
            SyncError::from(ticketsync_imap::Error::Protocol("tag desync".into())),
            SyncError::Protocol(_)
        ));
        assert!(matches!(
            SyncError::from(ticketsync_imap::Error::Bye("shutting down".into())),
            SyncError::Connection(_)
        ));
    }

    #[test]
    fn test_only_command_errors_are_recoverable() {
        assert!(!SyncError::Command("NO".into()).is_fatal());
        assert!(SyncError::Auth("x".into()).is_fatal());
        assert!(SyncError::Connection("x".into()).is_fatal());
        assert!(SyncError::Protocol("x".into()).is_fatal());
    }
}
