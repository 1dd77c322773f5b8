//! IMAP response parser.
//!
//! Classifies one complete server response (as returned by
//! [`FramedStream::read_response`](crate::FramedStream::read_response)) into
//! tagged completions, untagged data and continuation requests. Only the
//! untagged forms the client acts on are decoded; everything else is kept
//! as [`Untagged::Other`].

mod fetch;

pub use fetch::FetchData;

use crate::types::{Status, Uid};
use crate::{Error, Result};

/// A parsed IMAP response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// Tagged response (command completion).
    Tagged {
        /// The command tag.
        tag: String,
        /// Completion status.
        status: Status,
        /// Human-readable text (including any response code).
        text: String,
    },
    /// Untagged response (server data).
    Untagged(Untagged),
    /// Continuation request.
    Continuation(String),
}

/// Untagged server data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Untagged {
    /// `* OK|NO|BAD|PREAUTH|BYE [code] text`.
    Condition {
        /// Condition status.
        status: Status,
        /// Bracketed response code, without brackets.
        code: Option<String>,
        /// Remaining text.
        text: String,
    },
    /// `* CAPABILITY ...`.
    Capability(Vec<String>),
    /// `* n EXISTS`.
    Exists(u32),
    /// `* SEARCH n n n` (may be empty).
    Search(Vec<Uid>),
    /// `* n FETCH (...)`.
    Fetch {
        /// Message sequence number.
        seq: u32,
        /// Decoded data items.
        data: FetchData,
    },
    /// Any other untagged line.
    Other(String),
}

/// Parses a complete response.
pub fn parse(input: &[u8]) -> Result<Response> {
    if let Some(rest) = input.strip_prefix(b"+") {
        return Ok(Response::Continuation(line_text(rest).trim().to_string()));
    }

    if let Some(rest) = input.strip_prefix(b"* ") {
        return parse_untagged(input, rest).map(Response::Untagged);
    }

    let line = line_text(input);
    let mut words = line.splitn(3, ' ');
    let tag = words.next().unwrap_or_default();
    let status_word = words.next().unwrap_or_default();
    if tag.is_empty() {
        return Err(Error::Parse {
            position: 0,
            message: "empty response line".to_string(),
        });
    }
    let status = Status::parse(status_word).ok_or_else(|| Error::Parse {
        position: tag.len() + 1,
        message: format!("expected completion status after tag {tag}, got {status_word:?}"),
    })?;

    Ok(Response::Tagged {
        tag: tag.to_string(),
        status,
        text: words.next().unwrap_or_default().to_string(),
    })
}

fn parse_untagged(full: &[u8], rest: &[u8]) -> Result<Untagged> {
    let offset = full.len() - rest.len();
    let first_len = rest
        .iter()
        .position(|&b| b == b' ' || b == b'\r')
        .unwrap_or(rest.len());
    let first = String::from_utf8_lossy(&rest[..first_len]).to_ascii_uppercase();
    let after_first = rest.get(first_len + 1..).unwrap_or_default();

    if let Ok(n) = first.parse::<u32>() {
        let kw_len = after_first
            .iter()
            .position(|&b| b == b' ' || b == b'\r')
            .unwrap_or(after_first.len());
        let keyword = String::from_utf8_lossy(&after_first[..kw_len]).to_ascii_uppercase();
        return match keyword.as_str() {
            "EXISTS" => Ok(Untagged::Exists(n)),
            "FETCH" => {
                let start = offset + first_len + 1 + kw_len + 1;
                let data = fetch::Cursor::new(full, start).fetch_items()?;
                Ok(Untagged::Fetch { seq: n, data })
            }
            _ => Ok(Untagged::Other(line_text(full).to_string())),
        };
    }

    if let Some(status) = Status::parse(&first) {
        let (code, text) = split_response_code(line_text(after_first));
        return Ok(Untagged::Condition { status, code, text });
    }

    match first.as_str() {
        "SEARCH" => Ok(Untagged::Search(
            line_text(after_first)
                .split_ascii_whitespace()
                .filter_map(|word| word.parse().ok().and_then(Uid::new))
                .collect(),
        )),
        "CAPABILITY" => Ok(Untagged::Capability(
            line_text(after_first)
                .split_ascii_whitespace()
                .map(str::to_string)
                .collect(),
        )),
        _ => Ok(Untagged::Other(line_text(full).to_string())),
    }
}

/// Returns the first line of `input` as text, without its CRLF.
fn line_text(input: &[u8]) -> std::borrow::Cow<'_, str> {
    let end = input
        .windows(2)
        .position(|w| w == b"\r\n")
        .unwrap_or(input.len());
    String::from_utf8_lossy(&input[..end])
}

fn split_response_code(text: std::borrow::Cow<'_, str>) -> (Option<String>, String) {
    let trimmed = text.trim();
    if let Some(inner) = trimmed.strip_prefix('[')
        && let Some(close) = inner.find(']')
    {
        return (
            Some(inner[..close].to_string()),
            inner[close + 1..].trim().to_string(),
        );
    }
    (None, trimmed.to_string())
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

    #[test]
    fn test_tagged_ok() {
        let resp = parse(b"T0001 OK LOGIN completed\r\n").unwrap();
        assert_eq!(
            resp,
            Response::Tagged {
                tag: "T0001".to_string(),
                status: Status::Ok,
                text: "LOGIN completed".to_string(),
            }
        );
    }

    #[test]
    fn test_tagged_garbage_is_parse_error() {
        assert!(parse(b"T0001 MAYBE whatever\r\n").is_err());
    }

    #[test]
    fn test_greeting_with_code() {
        let resp = parse(b"* OK [CAPABILITY IMAP4rev1 STARTTLS] Dovecot ready.\r\n").unwrap();
        assert_eq!(
            resp,
            Response::Untagged(Untagged::Condition {
                status: Status::Ok,
                code: Some("CAPABILITY IMAP4rev1 STARTTLS".to_string()),
                text: "Dovecot ready.".to_string(),
            })
        );
    }

    #[test]
    fn test_exists() {
        assert_eq!(
            parse(b"* 172 EXISTS\r\n").unwrap(),
            Response::Untagged(Untagged::Exists(172))
        );
    }

    #[test]
    fn test_search_results() {
        let resp = parse(b"* SEARCH 2 84 882\r\n").unwrap();
        let Response::Untagged(Untagged::Search(ids)) = resp else {
            panic!("expected search response");
        };
        let ids: Vec<u32> = ids.into_iter().map(Uid::get).collect();
        assert_eq!(ids, vec![2, 84, 882]);
    }

    #[test]
    fn test_empty_search() {
        assert_eq!(
            parse(b"* SEARCH\r\n").unwrap(),
            Response::Untagged(Untagged::Search(Vec::new()))
        );
        assert_eq!(
            parse(b"* SEARCH \r\n").unwrap(),
            Response::Untagged(Untagged::Search(Vec::new()))
        );
    }

    #[test]
    fn test_fetch_with_literal() {
        let resp = parse(b"* 3 FETCH (UID 9 BODY[TEXT]<0> {5}\r\nhello)\r\n").unwrap();
        let Response::Untagged(Untagged::Fetch { seq, data }) = resp else {
            panic!("expected fetch response");
        };
        assert_eq!(seq, 3);
        assert_eq!(data.uid, Uid::new(9));
        assert_eq!(data.section("TEXT").unwrap(), b"hello");
    }

    #[test]
    fn test_unhandled_untagged_is_other() {
        let resp = parse(b"* FLAGS (\\Answered \\Seen)\r\n").unwrap();
        assert!(matches!(resp, Response::Untagged(Untagged::Other(_))));
        let resp = parse(b"* 1 RECENT\r\n").unwrap();
        assert!(matches!(resp, Response::Untagged(Untagged::Other(_))));
    }

    #[test]
    fn test_continuation() {
        assert_eq!(
            parse(b"+ Ready for literal\r\n").unwrap(),
            Response::Continuation("Ready for literal".to_string())
        );
    }
}
