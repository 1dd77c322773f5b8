//! Implementation for the not-authenticated state.

use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, warn};

use super::Client;
use super::states::{Authenticated, NotAuthenticated};
use crate::command::{Command, TagGenerator};
use crate::connection::framed::FramedStream;
use crate::connection::stream::ImapStream;
use crate::parser::{self, Response, Untagged};
use crate::types::Status;
use crate::{Error, Result};

impl<S> Client<S, NotAuthenticated>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Creates a new client from a connected stream.
    ///
    /// Reads the server greeting, which must be `* OK`. A `* BYE` greeting
    /// yields [`Error::Bye`]; anything else is a protocol error.
    pub async fn from_stream(stream: S, io_timeout: Option<Duration>) -> Result<Self> {
        let mut framed = FramedStream::new(stream);
        if let Some(limit) = io_timeout {
            framed = framed.with_io_timeout(limit);
        }

        let greeting = framed.read_response().await?;
        let capabilities = match parser::parse(&greeting)? {
            Response::Untagged(Untagged::Condition {
                status: Status::Ok,
                code,
                ..
            }) => code
                .as_deref()
                .and_then(|code| code.strip_prefix("CAPABILITY "))
                .map(|caps| caps.split_ascii_whitespace().map(str::to_string).collect())
                .unwrap_or_default(),
            Response::Untagged(Untagged::Condition {
                status: Status::Bye,
                text,
                ..
            }) => return Err(Error::Bye(text)),
            other => {
                return Err(Error::Protocol(format!("unexpected greeting: {other:?}")));
            }
        };

        Ok(Self {
            stream: framed,
            tag_gen: TagGenerator::default(),
            capabilities,
            io_timeout,
            state: NotAuthenticated,
        })
    }

    /// Authenticates with the server using LOGIN.
    ///
    /// Consumes self and returns an authenticated client on success. A
    /// `NO`/`BAD` completion becomes [`Error::Auth`]. A LOGOUT is attempted
    /// before the connection is dropped when the server refuses the login or
    /// does not answer in time.
    pub async fn login(
        mut self,
        username: &str,
        password: &str,
    ) -> Result<Client<S, Authenticated>> {
        let cmd = Command::Login {
            username: username.to_string(),
            password: password.to_string(),
        };

        match self.run(&cmd).await {
            Ok(responses) => {
                for bytes in &responses {
                    if let Ok(Response::Untagged(Untagged::Capability(caps))) =
                        parser::parse(bytes)
                    {
                        self.capabilities = caps;
                    }
                }
                debug!(username, "logged in");
                Ok(self.transition(Authenticated))
            }
            Err(Error::No(text) | Error::Bad(text)) => {
                warn!(username, reason = %text, "login rejected");
                let _ = self.logout().await;
                Err(Error::Auth(text))
            }
            Err(e @ Error::Timeout(_)) => {
                warn!(username, "login timed out");
                let _ = self.logout().await;
                Err(e)
            }
            Err(e) => Err(e),
        }
    }
}

impl Client<ImapStream, NotAuthenticated> {
    /// Upgrades a plaintext connection with STARTTLS.
    ///
    /// Capabilities learned before the upgrade are discarded, since a
    /// man-in-the-middle could have altered them.
    pub async fn starttls(mut self, host: &str) -> Result<Self> {
        if self.stream_is_tls() {
            return Ok(self);
        }
        self.run(&Command::StartTls).await?;

        let tls = self.stream.into_inner().into_tls(host).await?;
        let mut framed = FramedStream::new(tls);
        if let Some(limit) = self.io_timeout {
            framed = framed.with_io_timeout(limit);
        }
        debug!(host, "connection upgraded to TLS");

        Ok(Self {
            stream: framed,
            tag_gen: self.tag_gen,
            capabilities: Vec::new(),
            io_timeout: self.io_timeout,
            state: NotAuthenticated,
        })
    }

    fn stream_is_tls(&self) -> bool {
        self.stream.get_ref().is_tls()
    }
}
