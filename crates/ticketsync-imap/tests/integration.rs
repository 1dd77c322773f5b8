//! Integration tests for the IMAP client.
//!
//! These tests use a mock stream to simulate IMAP server responses
//! without requiring a real server connection.

use std::io::{self, Cursor};
use std::pin::Pin;
use std::task::{Context, Poll};

use chrono::NaiveDate;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

use ticketsync_imap::{Client, Error, FetchRequest, SearchCriteria, Uid};

/// Mock stream that returns predefined responses.
struct MockStream {
    /// Responses to return (in order).
    responses: Cursor<Vec<u8>>,
    /// Captured commands sent by the client.
    sent: Vec<u8>,
}

impl MockStream {
    fn new(responses: &[u8]) -> Self {
        Self {
            responses: Cursor::new(responses.to_vec()),
            sent: Vec::new(),
        }
    }
}

impl AsyncRead for MockStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let data = self.responses.get_ref();
        let pos = self.responses.position() as usize;

        if pos >= data.len() {
            return Poll::Ready(Ok(()));
        }

        let remaining = &data[pos..];
        let to_read = remaining.len().min(buf.remaining());
        buf.put_slice(&remaining[..to_read]);
        self.responses.set_position((pos + to_read) as u64);

        Poll::Ready(Ok(()))
    }
}

impl AsyncWrite for MockStream {
    fn poll_write(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        self.sent.extend_from_slice(buf);
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

fn uid(n: u32) -> Uid {
    Uid::new(n).unwrap()
}

fn since() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, 5).unwrap()
}

#[tokio::test]
async fn test_full_session() {
    let script = concat!(
        "* OK [CAPABILITY IMAP4rev1 AUTH=PLAIN] ready\r\n",
        "T0001 OK [CAPABILITY IMAP4rev1 IDLE] logged in\r\n",
        "* FLAGS (\\Seen)\r\n",
        "* 4 EXISTS\r\n",
        "* OK [UIDVALIDITY 77] ok\r\n",
        "T0002 OK [READ-WRITE] selected\r\n",
        "* SEARCH 3 9\r\n",
        "T0003 OK search done\r\n",
        "* 1 FETCH (UID 3 BODY[HEADER.FIELDS (FROM SUBJECT)] {36}\r\n",
        "From: a@tickets.com\r\nSubject: Hi\r\n\r\n",
        " BODY[TEXT]<0> {5}\r\nhello)\r\n",
        "* 2 FETCH (UID 9 BODY[HEADER.FIELDS (FROM SUBJECT)] NIL BODY[TEXT]<0> \"\")\r\n",
        "T0004 OK fetch done\r\n",
        "* BYE logging out\r\n",
        "T0005 OK bye\r\n",
    );

    let client = Client::from_stream(MockStream::new(script.as_bytes()), None)
        .await
        .unwrap();
    assert!(client.has_capability("auth=plain"));

    let client = client.login("user@example.com", "secret").await.unwrap();
    let (mut client, info) = client.select("INBOX").await.unwrap();
    assert_eq!(info.exists, 4);
    assert_eq!(info.uid_validity, Some(77));
    assert_eq!(client.mailbox(), "INBOX");

    let uids = client
        .uid_search(&SearchCriteria::from_since("a@tickets.com", since()))
        .await
        .unwrap();
    assert_eq!(uids, vec![uid(3), uid(9)]);

    let messages = client
        .uid_fetch(&uids, &FetchRequest::default())
        .await
        .unwrap();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].uid, Some(uid(3)));
    assert_eq!(
        messages[0].header,
        b"From: a@tickets.com\r\nSubject: Hi\r\n\r\n"
    );
    assert_eq!(messages[0].text, b"hello");
    assert!(messages[1].header.is_empty());

    client.logout().await.unwrap();
}

#[tokio::test]
async fn test_commands_are_tagged_sequentially() {
    let script = concat!(
        "* OK ready\r\n",
        "T0001 OK logged in\r\n",
        "T0002 OK selected\r\n",
        "* SEARCH\r\n",
        "T0003 OK done\r\n",
    );
    let client = Client::from_stream(MockStream::new(script.as_bytes()), None)
        .await
        .unwrap();
    let client = client.login("user", "pw").await.unwrap();
    let (mut client, _) = client.select("INBOX").await.unwrap();
    client
        .uid_search(&SearchCriteria::from_since("tickets@example.com", since()))
        .await
        .unwrap();

    let sent = String::from_utf8(client.into_inner().sent).unwrap();
    assert_eq!(
        sent,
        concat!(
            "T0001 LOGIN user pw\r\n",
            "T0002 SELECT INBOX\r\n",
            "T0003 UID SEARCH FROM \"tickets@example.com\" SINCE 5-Jan-2024\r\n",
        )
    );
}

#[tokio::test]
async fn test_empty_search_is_empty_result() {
    let script = "* OK ready\r\nT0001 OK in\r\nT0002 OK sel\r\n* SEARCH\r\nT0003 OK done\r\n";
    let client = Client::from_stream(MockStream::new(script.as_bytes()), None)
        .await
        .unwrap();
    let (mut client, _) = client
        .login("u", "p")
        .await
        .unwrap()
        .select("INBOX")
        .await
        .unwrap();

    let uids = client
        .uid_search(&SearchCriteria::from_since("x@y.com", since()))
        .await
        .unwrap();
    assert!(uids.is_empty());
}

#[tokio::test]
async fn test_fetch_with_no_uids_sends_nothing() {
    let script = "* OK ready\r\nT0001 OK in\r\nT0002 OK sel\r\n";
    let client = Client::from_stream(MockStream::new(script.as_bytes()), None)
        .await
        .unwrap();
    let (mut client, _) = client
        .login("u", "p")
        .await
        .unwrap()
        .select("INBOX")
        .await
        .unwrap();

    let messages = client.uid_fetch(&[], &FetchRequest::default()).await.unwrap();
    assert!(messages.is_empty());
}

#[tokio::test]
async fn test_search_no_keeps_connection_usable() {
    let script = concat!(
        "* OK ready\r\n",
        "T0001 OK in\r\n",
        "T0002 OK sel\r\n",
        "T0003 NO [CANNOT] search failed\r\n",
        "* SEARCH 5\r\n",
        "T0004 OK done\r\n",
    );
    let client = Client::from_stream(MockStream::new(script.as_bytes()), None)
        .await
        .unwrap();
    let (mut client, _) = client
        .login("u", "p")
        .await
        .unwrap()
        .select("INBOX")
        .await
        .unwrap();

    let err = client
        .uid_search(&SearchCriteria::from_since("x@y.com", since()))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::No(_)));
    assert!(!err.is_fatal());

    let uids = client
        .uid_search(&SearchCriteria::from_since("z@y.com", since()))
        .await
        .unwrap();
    assert_eq!(uids, vec![uid(5)]);
}

#[tokio::test]
async fn test_bye_greeting() {
    let result = Client::from_stream(MockStream::new(b"* BYE too busy\r\n"), None).await;
    assert!(matches!(result, Err(Error::Bye(text)) if text == "too busy"));
}

#[tokio::test]
async fn test_unexpected_greeting() {
    let result = Client::from_stream(MockStream::new(b"* NO go away\r\n"), None).await;
    assert!(matches!(result, Err(Error::Protocol(_))));
}

#[tokio::test]
async fn test_login_rejected_is_auth_error() {
    let script = concat!(
        "* OK ready\r\n",
        "T0001 NO [AUTHENTICATIONFAILED] Invalid credentials\r\n",
        "* BYE\r\n",
        "T0002 OK bye\r\n",
    );
    let client = Client::from_stream(MockStream::new(script.as_bytes()), None)
        .await
        .unwrap();
    let err = client.login("u", "wrong").await.unwrap_err();
    assert!(matches!(err, Error::Auth(text) if text.contains("Invalid credentials")));
}

#[tokio::test]
async fn test_connection_closed_mid_command() {
    let script = "* OK ready\r\n* CAPABILITY IMAP4rev1\r\n";
    let client = Client::from_stream(MockStream::new(script.as_bytes()), None)
        .await
        .unwrap();
    let err = client.login("u", "p").await.unwrap_err();
    assert!(err.is_fatal());
}

#[tokio::test]
async fn test_login_timeout_sends_logout() {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    let (client_io, mut server_io) = tokio::io::duplex(4096);
    server_io.write_all(b"* OK ready\r\n").await.unwrap();

    let client = Client::from_stream(client_io, None)
        .await
        .unwrap()
        .with_io_timeout(std::time::Duration::from_millis(50));
    let err = client.login("u", "p").await.unwrap_err();
    assert!(matches!(err, Error::Timeout(_)));

    let mut sent = Vec::new();
    server_io.read_to_end(&mut sent).await.unwrap();
    let sent = String::from_utf8(sent).unwrap();
    assert!(sent.starts_with("T0001 LOGIN u p\r\n"));
    assert!(sent.ends_with("T0002 LOGOUT\r\n"));
}
