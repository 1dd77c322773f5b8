//! Type-state IMAP client connection.
//!
//! Uses the type-state pattern to enforce valid state transitions at compile time.
//! The IMAP connection states are:
//!
//! - `NotAuthenticated`: Initial state after the greeting
//! - `Authenticated`: After a successful LOGIN
//! - `Selected`: After a successful SELECT
//!
//! Each state only exposes methods that are valid for that state.

#![allow(clippy::missing_errors_doc)]

mod authenticated;
mod not_authenticated;
mod selected;
mod states;

use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tracing::debug;

pub use self::states::{Authenticated, NotAuthenticated, Selected};
use super::framed::FramedStream;
use crate::command::{Command, TagGenerator};
use crate::parser::{self, Response};
use crate::types::Status;
use crate::{Error, Result};

/// IMAP client connection with type-state.
///
/// The type parameter `State` tracks the connection state at compile time.
pub struct Client<S, State> {
    pub(crate) stream: FramedStream<S>,
    pub(crate) tag_gen: TagGenerator,
    pub(crate) capabilities: Vec<String>,
    pub(crate) io_timeout: Option<Duration>,
    pub(crate) state: State,
}

// Manual Debug implementation since FramedStream doesn't implement Debug
impl<S, State: std::fmt::Debug> std::fmt::Debug for Client<S, State> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("tag_gen", &self.tag_gen)
            .field("capabilities", &self.capabilities)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

/// Shared implementation for all states.
impl<S, State> Client<S, State>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Returns the capabilities the server advertised most recently.
    #[must_use]
    pub fn capabilities(&self) -> &[String] {
        &self.capabilities
    }

    /// Checks if the server advertised a capability (case-insensitive).
    #[must_use]
    pub fn has_capability(&self, name: &str) -> bool {
        self.capabilities.iter().any(|c| c.eq_ignore_ascii_case(name))
    }

    /// Bounds every later read by `timeout`.
    #[must_use]
    pub fn with_io_timeout(mut self, timeout: Duration) -> Self {
        self.stream = self.stream.with_io_timeout(timeout);
        self.io_timeout = Some(timeout);
        self
    }

    /// Consumes the client and returns the underlying stream.
    pub fn into_inner(self) -> S {
        self.stream.into_inner()
    }

    /// Gracefully disconnects from the server.
    ///
    /// The server may close the stream right after its BYE, so only a
    /// failure to send the command is reported.
    pub async fn logout(mut self) -> Result<()> {
        let tag = self.tag_gen.next_tag();
        debug!(command = %Command::Logout.redacted(&tag), "imap >");
        self.stream
            .write_command(&Command::Logout.serialize(&tag))
            .await?;

        if let Err(e) = self.stream.read_until_tagged(&tag).await {
            debug!(error = %e, "logout completion not received");
        }
        Ok(())
    }

    /// Issues `command` and returns every response up to its completion.
    ///
    /// A `NO`/`BAD` completion becomes [`Error::No`]/[`Error::Bad`]; the
    /// stream is left positioned after the completion, so the connection
    /// stays usable.
    pub(crate) async fn run(&mut self, command: &Command) -> Result<Vec<Vec<u8>>> {
        let tag = self.tag_gen.next_tag();
        debug!(command = %command.redacted(&tag), "imap >");
        self.stream.write_command(&command.serialize(&tag)).await?;

        let responses = self.stream.read_until_tagged(&tag).await?;
        Self::check_tagged_ok(&responses, &tag)?;
        Ok(responses)
    }

    /// Checks that the tagged response is OK.
    pub(crate) fn check_tagged_ok(responses: &[Vec<u8>], tag: &str) -> Result<()> {
        let last = responses
            .last()
            .ok_or_else(|| Error::Protocol("missing tagged response".to_string()))?;
        match parser::parse(last)? {
            Response::Tagged {
                tag: resp_tag,
                status,
                text,
            } if resp_tag == tag => match status {
                Status::Ok | Status::PreAuth => Ok(()),
                Status::No => Err(Error::No(text)),
                Status::Bad => Err(Error::Bad(text)),
                Status::Bye => Err(Error::Bye(text)),
            },
            _ => Err(Error::Protocol("missing tagged response".to_string())),
        }
    }

    /// Moves the connection into another state.
    pub(crate) fn transition<Next>(self, state: Next) -> Client<S, Next> {
        Client {
            stream: self.stream,
            tag_gen: self.tag_gen,
            capabilities: self.capabilities,
            io_timeout: self.io_timeout,
            state,
        }
    }
}
