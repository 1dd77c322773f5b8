//! Mail sources.
//!
//! The orchestrator talks to a mailbox through these traits so the IMAP
//! driver can be replaced by a scripted source in tests. Each step consumes
//! the previous handle, mirroring the IMAP connection states.

mod imap;

use async_trait::async_trait;
use chrono::NaiveDate;
use ticketsync_imap::{RawMessage, Uid};
use tokio::time::Instant;

use crate::sync::SyncError;

pub use imap::ImapMailSource;

/// Opens connections to a mail server.
#[async_trait]
pub trait MailSource: Send + Sync {
    /// Connects (TLS or STARTTLS) and reads the greeting.
    async fn connect(&self, host: &str, port: u16) -> Result<Box<dyn PendingLogin>, SyncError>;
}

/// A connected, not yet authenticated session.
#[async_trait]
pub trait PendingLogin: Send {
    /// Authenticates and opens the inbox.
    ///
    /// Gives up at `deadline` with [`SyncError::timed_out`], attempting a
    /// LOGOUT first.
    async fn login(
        self: Box<Self>,
        login: &str,
        secret: &str,
        deadline: Instant,
    ) -> Result<Box<dyn Mailbox>, SyncError>;
}

/// An authenticated session with the inbox selected.
#[async_trait]
pub trait Mailbox: Send {
    /// UIDs of messages from `from` received on or after `since`.
    async fn search(&mut self, from: &str, since: NaiveDate) -> Result<Vec<Uid>, SyncError>;

    /// Headers and bounded bodies for `uids`.
    async fn fetch(&mut self, uids: &[Uid]) -> Result<Vec<RawMessage>, SyncError>;

    /// Ends the session. Failures are logged, not returned.
    async fn logout(self: Box<Self>);
}
