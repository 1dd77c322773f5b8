//! Framed I/O for IMAP protocol.
//!
//! IMAP uses CRLF-terminated lines with embedded `{n}` literals. This module
//! provides buffered reading and writing with proper handling of that
//! framing, and the tagged-completion read loop every command relies on.

#![allow(clippy::missing_errors_doc)]

use std::io;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::trace;

use crate::{Error, Result};

/// Default buffer size for reading.
const DEFAULT_BUFFER_SIZE: usize = 8192;

/// Maximum line length to prevent memory exhaustion.
const MAX_LINE_LENGTH: usize = 1024 * 1024; // 1 MB

/// Maximum literal size to prevent memory exhaustion.
const MAX_LITERAL_SIZE: usize = 16 * 1024 * 1024; // 16 MB

/// Framed connection for IMAP protocol.
pub struct FramedStream<S> {
    reader: BufReader<S>,
    io_timeout: Option<Duration>,
}

impl<S> FramedStream<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Creates a new framed stream.
    pub fn new(stream: S) -> Self {
        Self {
            reader: BufReader::with_capacity(DEFAULT_BUFFER_SIZE, stream),
            io_timeout: None,
        }
    }

    /// Bounds every individual read by `timeout`.
    #[must_use]
    pub const fn with_io_timeout(mut self, timeout: Duration) -> Self {
        self.io_timeout = Some(timeout);
        self
    }

    /// Reads a complete IMAP response, including any embedded literals.
    ///
    /// A line ending in `{n}` is followed by exactly `n` raw bytes and then
    /// the rest of the response; all of it is returned as one buffer.
    pub async fn read_response(&mut self) -> Result<Vec<u8>> {
        let mut response = Vec::new();

        loop {
            let line = self.read_line().await?;
            response.extend_from_slice(&line);

            let Some(literal_len) = parse_literal_length(&line) else {
                break;
            };
            if literal_len > MAX_LITERAL_SIZE {
                return Err(Error::Protocol(format!(
                    "literal too large: {literal_len} bytes (max {MAX_LITERAL_SIZE})"
                )));
            }
            let mut literal = vec![0u8; literal_len];
            timed(self.io_timeout, self.reader.read_exact(&mut literal)).await?;
            response.extend_from_slice(&literal);
        }

        Ok(response)
    }

    /// Reads responses until the tagged completion for `tag`.
    ///
    /// Returns every response read, the tagged line last. Fails with
    /// [`Error::Protocol`] when a completion for a different tag or an
    /// unexpected continuation request arrives, and with [`Error::Bye`]
    /// when the server says BYE and then closes the stream.
    pub async fn read_until_tagged(&mut self, tag: &str) -> Result<Vec<Vec<u8>>> {
        let mut responses = Vec::new();
        let mut bye: Option<String> = None;

        loop {
            let response = match self.read_response().await {
                Ok(response) => response,
                Err(Error::Io(e)) if e.kind() == io::ErrorKind::UnexpectedEof => {
                    return Err(bye.map_or(Error::Io(e), Error::Bye));
                }
                Err(e) => return Err(e),
            };

            match classify(&response, tag) {
                Line::Untagged => {
                    if response.get(2..6).is_some_and(|w| w.eq_ignore_ascii_case(b"BYE ")) {
                        bye = Some(first_line(&response[6..]));
                    }
                    responses.push(response);
                }
                Line::Tagged => {
                    trace!(tag, "tagged completion");
                    responses.push(response);
                    return Ok(responses);
                }
                Line::Continuation => {
                    return Err(Error::Protocol(format!(
                        "unexpected continuation request while waiting for {tag}"
                    )));
                }
                Line::ForeignTag => {
                    return Err(Error::Protocol(format!(
                        "tag desync: expected {tag}, got {:?}",
                        first_line(&response)
                    )));
                }
            }
        }
    }

    /// Reads a single CRLF-terminated line.
    async fn read_line(&mut self) -> Result<Vec<u8>> {
        let mut line = Vec::new();

        loop {
            let buf = timed(self.io_timeout, self.reader.fill_buf()).await?;
            if buf.is_empty() {
                return Err(Error::Io(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "connection closed",
                )));
            }

            if let Some(pos) = find_crlf(buf) {
                line.extend_from_slice(&buf[..pos + 2]);
                self.reader.consume(pos + 2);
                break;
            }

            // No CRLF yet; a trailing '\r' may pair with the next chunk.
            let keep = usize::from(buf.ends_with(b"\r"));
            let take = buf.len() - keep;
            if take == 0 {
                // Only a lone '\r' is buffered; pull it in and keep reading.
                line.push(b'\r');
                self.reader.consume(1);
                if timed(self.io_timeout, self.reader.fill_buf()).await?.first() == Some(&b'\n') {
                    line.push(b'\n');
                    self.reader.consume(1);
                    break;
                }
                continue;
            }
            line.extend_from_slice(&buf[..take]);
            self.reader.consume(take);

            if line.len() > MAX_LINE_LENGTH {
                return Err(Error::Protocol("line too long".to_string()));
            }
        }

        Ok(line)
    }

    /// Writes a command to the stream.
    pub async fn write_command(&mut self, data: &[u8]) -> Result<()> {
        let stream = self.reader.get_mut();
        stream.write_all(data).await?;
        stream.flush().await?;
        Ok(())
    }

    /// Returns a reference to the inner stream.
    pub fn get_ref(&self) -> &S {
        self.reader.get_ref()
    }

    /// Consumes the framed stream and returns the inner stream.
    ///
    /// Any buffered, unread data is lost; only call this when the server
    /// is known to be waiting (right after a STARTTLS completion).
    pub fn into_inner(self) -> S {
        self.reader.into_inner()
    }
}

async fn timed<T, F>(limit: Option<Duration>, fut: F) -> Result<T>
where
    F: std::future::Future<Output = io::Result<T>>,
{
    match limit {
        Some(limit) => tokio::time::timeout(limit, fut)
            .await
            .map_err(|_| Error::Timeout(limit))?
            .map_err(Error::from),
        None => fut.await.map_err(Error::from),
    }
}

enum Line {
    Untagged,
    Tagged,
    Continuation,
    ForeignTag,
}

fn classify(response: &[u8], tag: &str) -> Line {
    if response.starts_with(b"* ") {
        Line::Untagged
    } else if response.starts_with(b"+") {
        Line::Continuation
    } else if response
        .get(..tag.len())
        .is_some_and(|prefix| prefix == tag.as_bytes())
        && response.get(tag.len()) == Some(&b' ')
    {
        Line::Tagged
    } else {
        Line::ForeignTag
    }
}

fn first_line(bytes: &[u8]) -> String {
    let end = find_crlf(bytes).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).trim().to_string()
}

/// Finds the position of CRLF in a buffer.
fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == b"\r\n")
}

/// Parses a literal length from the end of a line.
///
/// Matches patterns like `{123}\r\n` or `{123+}\r\n` (non-synchronizing).
fn parse_literal_length(line: &[u8]) -> Option<usize> {
    let line = line.strip_suffix(b"\r\n")?;
    let line = line.strip_suffix(b"}")?;
    let line = line.strip_suffix(b"+").unwrap_or(line);
    let open = line.iter().rposition(|&b| b == b'{')?;
    let digits = &line[open + 1..];
    if digits.is_empty() || !digits.iter().all(u8::is_ascii_digit) {
        return None;
    }
    std::str::from_utf8(digits).ok()?.parse().ok()
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
    use tokio_test::io::Builder;

    #[test]
    fn test_find_crlf() {
        assert_eq!(find_crlf(b"hello\r\n"), Some(5));
        assert_eq!(find_crlf(b"\r\n"), Some(0));
        assert_eq!(find_crlf(b"no newline"), None);
        assert_eq!(find_crlf(b"just\n"), None);
    }

    #[test]
    fn test_parse_literal_length() {
        assert_eq!(parse_literal_length(b"BODY {123}\r\n"), Some(123));
        assert_eq!(parse_literal_length(b"BODY {123+}\r\n"), Some(123));
        assert_eq!(parse_literal_length(b"{0}\r\n"), Some(0));
        assert_eq!(parse_literal_length(b"no literal\r\n"), None);
        assert_eq!(parse_literal_length(b"incomplete {123"), None);
        assert_eq!(parse_literal_length(b"wrong {abc}\r\n"), None);
        assert_eq!(parse_literal_length(b"empty {}\r\n"), None);
    }

    #[tokio::test]
    async fn test_read_simple_line() {
        let mock = Builder::new().read(b"* OK ready\r\n").build();
        let mut framed = FramedStream::new(mock);

        assert_eq!(framed.read_response().await.unwrap(), b"* OK ready\r\n");
    }

    #[tokio::test]
    async fn test_crlf_split_across_reads() {
        let mock = Builder::new().read(b"* OK ready\r").read(b"\n").build();
        let mut framed = FramedStream::new(mock);

        assert_eq!(framed.read_response().await.unwrap(), b"* OK ready\r\n");
    }

    #[tokio::test]
    async fn test_read_with_literal() {
        let mock = Builder::new()
            .read(b"* 1 FETCH (BODY[TEXT] {7}\r\n")
            .read(b"a\r\nb)\r\n)\r\n")
            .build();
        let mut framed = FramedStream::new(mock);

        let response = framed.read_response().await.unwrap();
        assert_eq!(response, b"* 1 FETCH (BODY[TEXT] {7}\r\na\r\nb)\r\n)\r\n");
    }

    #[tokio::test]
    async fn test_read_until_tagged_collects_untagged() {
        let mock = Builder::new()
            .read(b"* 3 EXISTS\r\n")
            .read(b"* OK [UIDVALIDITY 1] ok\r\n")
            .read(b"T0001 OK done\r\n")
            .build();
        let mut framed = FramedStream::new(mock);

        let responses = framed.read_until_tagged("T0001").await.unwrap();
        assert_eq!(responses.len(), 3);
        assert_eq!(responses[2], b"T0001 OK done\r\n");
    }

    #[tokio::test]
    async fn test_similar_tag_prefix_is_not_completion() {
        let mock = Builder::new().read(b"T00011 OK other\r\n").build();
        let mut framed = FramedStream::new(mock);

        let err = framed.read_until_tagged("T0001").await.unwrap_err();
        assert!(err.to_string().contains("tag desync"));
    }

    #[tokio::test]
    async fn test_unexpected_continuation() {
        let mock = Builder::new().read(b"+ go ahead\r\n").build();
        let mut framed = FramedStream::new(mock);

        assert!(matches!(
            framed.read_until_tagged("T0001").await,
            Err(Error::Protocol(_))
        ));
    }

    #[tokio::test]
    async fn test_bye_then_close() {
        let mock = Builder::new().read(b"* BYE server shutting down\r\n").build();
        let mut framed = FramedStream::new(mock);

        match framed.read_until_tagged("T0001").await {
            Err(Error::Bye(text)) => assert_eq!(text, "server shutting down"),
            other => panic!("expected BYE, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_literal_size_validation() {
        let header = format!("* 1 FETCH (BODY {{{}}}\r\n", MAX_LITERAL_SIZE + 1);
        let mock = Builder::new().read(header.as_bytes()).build();
        let mut framed = FramedStream::new(mock);

        let err = framed.read_response().await.unwrap_err();
        assert!(err.to_string().contains("literal too large"));
    }

    #[tokio::test]
    async fn test_line_length_limit() {
        let long_line = "A".repeat(MAX_LINE_LENGTH + 100);
        let mock = Builder::new().read(long_line.as_bytes()).build();
        let mut framed = FramedStream::new(mock);

        let err = framed.read_response().await.unwrap_err();
        assert!(err.to_string().contains("line too long"));
    }

    #[tokio::test]
    async fn test_write_command() {
        let mock = Builder::new().write(b"T0001 LOGOUT\r\n").build();
        let mut framed = FramedStream::new(mock);

        framed.write_command(b"T0001 LOGOUT\r\n").await.unwrap();
    }
}
