//! Implementation for the authenticated state.

use tokio::io::{AsyncRead, AsyncWrite};

use super::Client;
use super::states::{Authenticated, Selected};
use crate::command::Command;
use crate::parser::{self, Response, Untagged};
use crate::types::MailboxInfo;
use crate::{Error, Result};

impl<S> Client<S, Authenticated>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Selects a mailbox.
    ///
    /// Consumes self and returns a selected client on success. When the
    /// server refuses the mailbox or does not answer in time a LOGOUT is
    /// attempted before the error is returned.
    pub async fn select(mut self, mailbox: &str) -> Result<(Client<S, Selected>, MailboxInfo)> {
        let cmd = Command::Select {
            mailbox: mailbox.to_string(),
        };

        let responses = match self.run(&cmd).await {
            Ok(responses) => responses,
            Err(e @ (Error::No(_) | Error::Bad(_) | Error::Timeout(_))) => {
                let _ = self.logout().await;
                return Err(e);
            }
            Err(e) => return Err(e),
        };
        let info = Self::parse_mailbox_info(&responses);

        let state = Selected {
            mailbox: mailbox.to_string(),
            info,
        };
        Ok((self.transition(state), info))
    }

    /// Collects EXISTS and the UIDVALIDITY response code from SELECT output.
    pub(crate) fn parse_mailbox_info(responses: &[Vec<u8>]) -> MailboxInfo {
        let mut info = MailboxInfo::default();
        for bytes in responses {
            match parser::parse(bytes) {
                Ok(Response::Untagged(Untagged::Exists(n))) => info.exists = n,
                Ok(Response::Untagged(Untagged::Condition {
                    code: Some(code), ..
                })) => {
                    if let Some(value) = code.strip_prefix("UIDVALIDITY ") {
                        info.uid_validity = value.trim().parse().ok();
                    }
                }
                _ => {}
            }
        }
        info
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use tokio_test::io::Builder;

    use super::*;

    #[test]
    fn test_parse_mailbox_info() {
        let responses = vec![
            b"* FLAGS (\\Answered \\Seen)\r\n".to_vec(),
            b"* 172 EXISTS\r\n".to_vec(),
            b"* OK [UIDVALIDITY 3857529045] UIDs valid\r\n".to_vec(),
            b"T0002 OK [READ-WRITE] SELECT completed\r\n".to_vec(),
        ];
        let info = Client::<tokio_test::io::Mock, Authenticated>::parse_mailbox_info(&responses);
        assert_eq!(info.exists, 172);
        assert_eq!(info.uid_validity, Some(3_857_529_045));
    }

    #[tokio::test]
    async fn test_select_failure_logs_out() {
        let mock = Builder::new()
            .read(b"* OK ready\r\n")
            .write(b"T0001 LOGIN user pass\r\n")
            .read(b"T0001 OK done\r\n")
            .write(b"T0002 SELECT Missing\r\n")
            .read(b"T0002 NO no such mailbox\r\n")
            .write(b"T0003 LOGOUT\r\n")
            .read(b"* BYE bye\r\nT0003 OK done\r\n")
            .build();

        let client = Client::from_stream(mock, None).await.unwrap();
        let client = client.login("user", "pass").await.unwrap();
        let err = client.select("Missing").await.unwrap_err();
        assert!(matches!(err, Error::No(text) if text == "no such mailbox"));
    }
}
