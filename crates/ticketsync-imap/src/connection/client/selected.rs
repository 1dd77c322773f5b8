//! Implementation for the selected state.

use tokio::io::{AsyncRead, AsyncWrite};
use tracing::debug;

use super::Client;
use super::states::Selected;
use crate::Result;
use crate::command::{Command, FetchRequest, SearchCriteria};
use crate::parser::{self, Response, Untagged};
use crate::types::{MailboxInfo, RawMessage, Uid, uid_set};

impl<S> Client<S, Selected>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Returns the name of the selected mailbox.
    #[must_use]
    pub fn mailbox(&self) -> &str {
        self.state.mailbox()
    }

    /// Returns the snapshot reported when the mailbox was selected.
    #[must_use]
    pub const fn mailbox_info(&self) -> MailboxInfo {
        self.state.info()
    }

    /// Searches the mailbox and returns matching UIDs in server order.
    ///
    /// An empty `* SEARCH` line is a valid empty result.
    pub async fn uid_search(&mut self, criteria: &SearchCriteria) -> Result<Vec<Uid>> {
        let responses = self
            .run(&Command::UidSearch {
                criteria: criteria.clone(),
            })
            .await?;

        let mut uids = Vec::new();
        for bytes in &responses {
            if let Ok(Response::Untagged(Untagged::Search(found))) = parser::parse(bytes) {
                uids.extend(found);
            }
        }
        debug!(count = uids.len(), "search complete");
        Ok(uids)
    }

    /// Fetches header fields and a leading body slice for `uids`.
    ///
    /// Returns nothing without contacting the server when `uids` is empty.
    /// Messages come back in the order the server sent them.
    pub async fn uid_fetch(
        &mut self,
        uids: &[Uid],
        request: &FetchRequest,
    ) -> Result<Vec<RawMessage>> {
        if uids.is_empty() {
            return Ok(Vec::new());
        }

        let responses = self
            .run(&Command::UidFetch {
                uids: uid_set(uids),
                request: request.clone(),
            })
            .await?;

        let mut messages = Vec::new();
        for bytes in &responses {
            if let Response::Untagged(Untagged::Fetch { seq, data }) = parser::parse(bytes)? {
                messages.push(RawMessage {
                    seq,
                    uid: data.uid,
                    header: data.section("HEADER").unwrap_or_default().to_vec(),
                    text: data.section("TEXT").unwrap_or_default().to_vec(),
                });
            }
        }
        debug!(count = messages.len(), "fetch complete");
        Ok(messages)
    }
}
