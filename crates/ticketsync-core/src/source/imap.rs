//! IMAP-backed mail source.

use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use ticketsync_imap::connection::{self, Client, Config, ImapStream, NotAuthenticated, Selected};
use ticketsync_imap::{FetchRequest, RawMessage, SearchCriteria, Uid};
use tokio::time::Instant;
use tracing::{debug, info};

use super::{MailSource, Mailbox, PendingLogin};
use crate::sync::SyncError;

const INBOX: &str = "INBOX";

/// Mail source speaking IMAP over TLS.
#[derive(Debug, Clone)]
pub struct ImapMailSource {
    io_timeout: Duration,
    fetch: FetchRequest,
}

impl ImapMailSource {
    /// Creates a source with a per-read timeout and a body byte bound.
    #[must_use]
    pub fn new(io_timeout: Duration, text_limit: u32) -> Self {
        Self {
            io_timeout,
            fetch: FetchRequest::with_text_limit(text_limit),
        }
    }
}

#[async_trait]
impl MailSource for ImapMailSource {
    async fn connect(&self, host: &str, port: u16) -> Result<Box<dyn PendingLogin>, SyncError> {
        let config = Config::new(host, port).with_io_timeout(self.io_timeout);
        let client = connection::connect(&config).await?;
        Ok(Box::new(ImapPendingLogin {
            client,
            fetch: self.fetch.clone(),
            io_timeout: self.io_timeout,
        }))
    }
}

struct ImapPendingLogin {
    client: Client<ImapStream, NotAuthenticated>,
    fetch: FetchRequest,
    io_timeout: Duration,
}

#[async_trait]
impl PendingLogin for ImapPendingLogin {
    async fn login(
        self: Box<Self>,
        login: &str,
        secret: &str,
        deadline: Instant,
    ) -> Result<Box<dyn Mailbox>, SyncError> {
        let Self {
            client,
            fetch,
            io_timeout,
        } = *self;

        let client = client
            .with_io_timeout(read_bound(deadline, io_timeout))
            .login(login, secret)
            .await?;
        let (client, info) = client
            .with_io_timeout(read_bound(deadline, io_timeout))
            .select(INBOX)
            .await?;
        info!("Selected {INBOX}: {} messages", info.exists);
        Ok(Box::new(ImapMailbox {
            client: client.with_io_timeout(io_timeout),
            fetch,
        }))
    }
}

/// Per-read timeout that expires no later than `deadline`.
fn read_bound(deadline: Instant, io_timeout: Duration) -> Duration {
    deadline
        .saturating_duration_since(Instant::now())
        .min(io_timeout)
}

struct ImapMailbox {
    client: Client<ImapStream, Selected>,
    fetch: FetchRequest,
}

#[async_trait]
impl Mailbox for ImapMailbox {
    async fn search(&mut self, from: &str, since: NaiveDate) -> Result<Vec<Uid>, SyncError> {
        let criteria = SearchCriteria::from_since(from, since);
        Ok(self.client.uid_search(&criteria).await?)
    }

    async fn fetch(&mut self, uids: &[Uid]) -> Result<Vec<RawMessage>, SyncError> {
        Ok(self.client.uid_fetch(uids, &self.fetch).await?)
    }

    async fn logout(self: Box<Self>) {
        if let Err(e) = self.client.logout().await {
            debug!("Logout failed: {e}");
        }
    }
}
