//! MIME message structure and handling.

use std::fmt;

use chrono::{DateTime, FixedOffset};

use crate::content_type::ContentType;
use crate::encoding::{decode_base64, decode_charset, decode_quoted_printable};
use crate::error::{Error, Result};
use crate::header::Headers;

/// Nesting limit for multipart bodies.
const MAX_DEPTH: usize = 8;

/// Fallback Date header layouts tried after RFC 2822.
const DATE_FORMATS: [&str; 4] = [
    "%a, %d %b %Y %H:%M:%S %z",
    "%d %b %Y %H:%M:%S %z",
    "%a, %d %b %Y %H:%M %z",
    "%a %b %d %H:%M:%S %Y %z",
];

/// Transfer encoding types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferEncoding {
    /// 7-bit ASCII.
    SevenBit,
    /// 8-bit binary.
    EightBit,
    /// Base64 encoding.
    Base64,
    /// Quoted-Printable encoding.
    QuotedPrintable,
    /// Binary (no encoding).
    Binary,
}

impl TransferEncoding {
    /// Parses transfer encoding from string.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "8bit" => Self::EightBit,
            "base64" => Self::Base64,
            "quoted-printable" => Self::QuotedPrintable,
            "binary" => Self::Binary,
            _ => Self::SevenBit, // Default (includes "7bit")
        }
    }
}

impl fmt::Display for TransferEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SevenBit => write!(f, "7bit"),
            Self::EightBit => write!(f, "8bit"),
            Self::Base64 => write!(f, "base64"),
            Self::QuotedPrintable => write!(f, "quoted-printable"),
            Self::Binary => write!(f, "binary"),
        }
    }
}

/// A MIME entity: a whole message or one part of a multipart body.
///
/// Multipart entities keep their raw body and also carry the split parts,
/// each of which is itself a `Message`.
#[derive(Debug, Clone, Default)]
pub struct Message {
    /// Entity headers.
    pub headers: Headers,
    /// Raw (still transfer-encoded) body.
    pub body: Vec<u8>,
    /// Child entities for multipart bodies.
    pub parts: Vec<Message>,
}

impl Message {
    /// Parses a complete entity: headers, blank line, body.
    ///
    /// Never fails; malformed structure degrades to fewer parts.
    #[must_use]
    pub fn parse(raw: &[u8]) -> Self {
        Self::parse_at_depth(raw, 0)
    }

    /// Builds a message from a header block and a body fetched separately.
    ///
    /// This is the shape IMAP returns for `BODY[HEADER.FIELDS (...)]` plus
    /// `BODY[TEXT]`. The body may be truncated.
    #[must_use]
    pub fn from_parts(header: &[u8], body: &[u8]) -> Self {
        Self::build(Headers::parse(header), body, 0)
    }

    fn parse_at_depth(raw: &[u8], depth: usize) -> Self {
        let (header, body) = split_header_body(raw);
        Self::build(Headers::parse(header), body, depth)
    }

    fn build(headers: Headers, body: &[u8], depth: usize) -> Self {
        let mut message = Self {
            headers,
            body: body.to_vec(),
            parts: Vec::new(),
        };
        if depth < MAX_DEPTH && message.is_multipart() {
            message.parts = message
                .child_parts()
                .map(|parts| {
                    parts
                        .into_iter()
                        .map(|part| Self::parse_at_depth(part, depth + 1))
                        .collect()
                })
                .unwrap_or_default();
        }
        message
    }

    fn child_parts(&self) -> Result<Vec<&[u8]>> {
        let content_type = self.content_type();
        let boundary = content_type.boundary().ok_or(Error::MissingBoundary)?;
        Ok(split_multipart(&self.body, boundary))
    }

    /// Gets the content type, falling back to `text/plain` when the header
    /// is missing or malformed.
    #[must_use]
    pub fn content_type(&self) -> ContentType {
        self.headers
            .get("content-type")
            .and_then(|value| ContentType::parse(value).ok())
            .unwrap_or_default()
    }

    /// Checks if this is a multipart entity.
    #[must_use]
    pub fn is_multipart(&self) -> bool {
        self.content_type().is_multipart()
    }

    /// Gets the transfer encoding.
    #[must_use]
    pub fn transfer_encoding(&self) -> TransferEncoding {
        self.headers
            .get("content-transfer-encoding")
            .map_or(TransferEncoding::SevenBit, TransferEncoding::parse)
    }

    /// Returns true if the entity is marked as an attachment.
    #[must_use]
    pub fn is_attachment(&self) -> bool {
        self.headers
            .get("content-disposition")
            .is_some_and(|d| d.trim_start().to_ascii_lowercase().starts_with("attachment"))
    }

    /// Gets the From header with encoded words decoded.
    #[must_use]
    pub fn from(&self) -> Option<String> {
        self.headers.get_decoded("from")
    }

    /// Gets the Subject header with encoded words decoded.
    #[must_use]
    pub fn subject(&self) -> Option<String> {
        self.headers.get_decoded("subject")
    }

    /// Gets the Message-ID header.
    #[must_use]
    pub fn message_id(&self) -> Option<&str> {
        self.headers.get("message-id").filter(|id| !id.is_empty())
    }

    /// Parses the Date header.
    ///
    /// Accepts RFC 2822 dates plus the common deviations: a trailing
    /// comment such as `(UTC)`, a missing weekday, zone names `GMT`/`UTC`
    /// and RFC 3339 timestamps.
    #[must_use]
    pub fn date(&self) -> Option<DateTime<FixedOffset>> {
        self.headers.get("date").and_then(parse_date)
    }

    /// Decodes the body according to the transfer encoding.
    ///
    /// # Errors
    ///
    /// Returns an error if a Base64 body contains invalid characters.
    pub fn decode_body(&self) -> Result<Vec<u8>> {
        match self.transfer_encoding() {
            TransferEncoding::Base64 => decode_base64(&self.body),
            TransferEncoding::QuotedPrintable => Ok(decode_quoted_printable(&self.body)),
            _ => Ok(self.body.clone()),
        }
    }

    /// Gets the decoded body as text in the declared charset.
    ///
    /// # Errors
    ///
    /// Returns an error if transfer decoding fails.
    pub fn body_text(&self) -> Result<String> {
        let decoded = self.decode_body()?;
        Ok(decode_charset(&decoded, self.content_type().charset()))
    }

    /// Finds the first inline text/plain entity, depth-first.
    #[must_use]
    pub fn text_part(&self) -> Option<String> {
        self.find_text("plain")
    }

    /// Finds the first inline text/html entity, depth-first.
    #[must_use]
    pub fn html_part(&self) -> Option<String> {
        self.find_text("html")
    }

    fn find_text(&self, sub_type: &str) -> Option<String> {
        if self.is_multipart() {
            return self.parts.iter().find_map(|part| part.find_text(sub_type));
        }
        if self.is_attachment() || !self.content_type().is("text", sub_type) {
            return None;
        }
        self.body_text().ok()
    }
}

/// Splits a raw entity at the first empty line.
fn split_header_body(raw: &[u8]) -> (&[u8], &[u8]) {
    if raw.starts_with(b"\r\n") {
        return (&[], &raw[2..]);
    }
    if raw.starts_with(b"\n") {
        return (&[], &raw[1..]);
    }
    let crlf = raw.windows(4).position(|w| w == b"\r\n\r\n").map(|i| (i, 4));
    let lf = raw.windows(2).position(|w| w == b"\n\n").map(|i| (i, 2));
    let split = match (crlf, lf) {
        (Some(a), Some(b)) => Some(if a.0 <= b.0 { a } else { b }),
        (a, b) => a.or(b),
    };
    match split {
        Some((at, len)) => (&raw[..at], &raw[at + len..]),
        None => (raw, &[]),
    }
}

/// Splits a multipart body on `--boundary` delimiter lines.
///
/// The preamble and epilogue are dropped. A body cut off before the closing
/// delimiter keeps its last, partial part.
fn split_multipart<'a>(body: &'a [u8], boundary: &str) -> Vec<&'a [u8]> {
    let delimiter = format!("--{boundary}");
    let mut parts = Vec::new();
    let mut start: Option<usize> = None;
    let mut pos = 0;

    while pos < body.len() {
        let line_end = body[pos..]
            .iter()
            .position(|&b| b == b'\n')
            .map_or(body.len(), |i| pos + i + 1);
        let line = body[pos..line_end].trim_ascii_end();

        if let Some(rest) = line.strip_prefix(delimiter.as_bytes()) {
            let closing = rest.starts_with(b"--");
            if closing || rest.is_empty() {
                if let Some(s) = start {
                    parts.push(strip_line_break(&body[s..pos]));
                }
                if closing {
                    return parts;
                }
                start = Some(line_end);
            }
        }
        pos = line_end;
    }

    if let Some(s) = start
        && s < body.len()
    {
        parts.push(&body[s..]);
    }
    parts
}

/// Removes the line break that belongs to the following delimiter.
fn strip_line_break(part: &[u8]) -> &[u8] {
    part.strip_suffix(b"\r\n")
        .or_else(|| part.strip_suffix(b"\n"))
        .unwrap_or(part)
}

fn parse_date(value: &str) -> Option<DateTime<FixedOffset>> {
    let mut cleaned = value.trim().to_string();
    if cleaned.ends_with(')')
        && let Some(open) = cleaned.rfind('(')
    {
        cleaned.truncate(open);
    }
    let cleaned = cleaned.trim();

    if let Ok(date) = DateTime::parse_from_rfc2822(cleaned) {
        return Some(date);
    }

    let normalized = cleaned
        .strip_suffix(" GMT")
        .or_else(|| cleaned.strip_suffix(" UTC"))
        .or_else(|| cleaned.strip_suffix(" UT"))
        .map_or_else(|| cleaned.to_string(), |rest| format!("{rest} +0000"));

    DATE_FORMATS
        .iter()
        .find_map(|fmt| DateTime::parse_from_str(&normalized, fmt).ok())
        .or_else(|| DateTime::parse_from_rfc3339(cleaned).ok())
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
    use chrono::{Datelike, Timelike};

    use super::*;

    #[test]
    fn test_transfer_encoding_parse() {
        assert_eq!(TransferEncoding::parse("7bit"), TransferEncoding::SevenBit);
        assert_eq!(TransferEncoding::parse("BASE64"), TransferEncoding::Base64);
        assert_eq!(
            TransferEncoding::parse("quoted-printable"),
            TransferEncoding::QuotedPrintable
        );
        assert_eq!(TransferEncoding::parse("x-unknown"), TransferEncoding::SevenBit);
    }

    #[test]
    fn test_single_part_plain() {
        let raw = concat!(
            "From: Tickets <orders@tickets.example>\r\n",
            "Subject: Your order\r\n",
            "\r\n",
            "Hello!"
        );
        let message = Message::parse(raw.as_bytes());
        assert_eq!(message.from().as_deref(), Some("Tickets <orders@tickets.example>"));
        assert_eq!(message.subject().as_deref(), Some("Your order"));
        assert_eq!(message.text_part().as_deref(), Some("Hello!"));
        assert!(message.html_part().is_none());
    }

    #[test]
    fn test_from_parts_quoted_printable_latin1() {
        let header = b"Content-Type: text/plain; charset=iso-8859-1\r\nContent-Transfer-Encoding: quoted-printable\r\n\r\n";
        let message = Message::from_parts(header, b"caf=E9 =\r\nnight");
        assert_eq!(message.text_part().as_deref(), Some("café night"));
    }

    #[test]
    fn test_multipart_alternative() {
        let header = b"Content-Type: multipart/alternative; boundary=\"b1\"\r\n";
        let body = concat!(
            "preamble\r\n",
            "--b1\r\n",
            "Content-Type: text/plain; charset=utf-8\r\n",
            "\r\n",
            "plain body\r\n",
            "--b1\r\n",
            "Content-Type: text/html; charset=utf-8\r\n",
            "Content-Transfer-Encoding: base64\r\n",
            "\r\n",
            "PGI+aHRtbDwvYj4=\r\n",
            "--b1--\r\n",
            "epilogue\r\n",
        );
        let message = Message::from_parts(header, body.as_bytes());
        assert_eq!(message.parts.len(), 2);
        assert_eq!(message.text_part().as_deref(), Some("plain body"));
        assert_eq!(message.html_part().as_deref(), Some("<b>html</b>"));
    }

    #[test]
    fn test_nested_multipart_and_attachment_skipped() {
        let header = b"Content-Type: multipart/mixed; boundary=outer\r\n";
        let body = concat!(
            "--outer\r\n",
            "Content-Type: text/plain\r\n",
            "Content-Disposition: attachment; filename=a.txt\r\n",
            "\r\n",
            "attached\r\n",
            "--outer\r\n",
            "Content-Type: multipart/alternative; boundary=inner\r\n",
            "\r\n",
            "--inner\r\n",
            "Content-Type: text/plain\r\n",
            "\r\n",
            "inline text\r\n",
            "--inner--\r\n",
            "--outer--\r\n",
        );
        let message = Message::from_parts(header, body.as_bytes());
        assert_eq!(message.text_part().as_deref(), Some("inline text"));
    }

    #[test]
    fn test_truncated_multipart_keeps_partial_part() {
        let header = b"Content-Type: multipart/alternative; boundary=b\r\n";
        let body = "--b\r\nContent-Type: text/html\r\n\r\n<p>cut off here";
        let message = Message::from_parts(header, body.as_bytes());
        assert_eq!(message.html_part().as_deref(), Some("<p>cut off here"));
    }

    #[test]
    fn test_multipart_without_boundary_has_no_parts() {
        let message = Message::from_parts(b"Content-Type: multipart/mixed\r\n", b"--x\r\n\r\nhi");
        assert!(message.parts.is_empty());
        assert!(matches!(message.child_parts(), Err(Error::MissingBoundary)));
        assert!(message.text_part().is_none());
    }

    #[test]
    fn test_lf_only_line_endings() {
        let raw = "Subject: unix\nContent-Type: text/plain\n\nbody line\n";
        let message = Message::parse(raw.as_bytes());
        assert_eq!(message.subject().as_deref(), Some("unix"));
        assert_eq!(message.text_part().as_deref(), Some("body line\n"));
    }

    #[test]
    fn test_date_rfc2822() {
        let headers = Headers::parse(b"Date: Fri, 05 Jan 2024 10:30:00 +0100\r\n");
        let message = Message {
            headers,
            ..Message::default()
        };
        let date = message.date().unwrap();
        assert_eq!(date.day(), 5);
        assert_eq!(date.hour(), 10);
    }

    #[test]
    fn test_date_lenient_forms() {
        assert!(parse_date("Fri, 5 Jan 2024 10:30:00 +0000 (UTC)").is_some());
        assert!(parse_date("5 Jan 2024 10:30:00 +0000").is_some());
        assert!(parse_date("Fri, 05 Jan 2024 10:30:00 GMT").is_some());
        assert!(parse_date("2024-01-05T10:30:00Z").is_some());
        assert!(parse_date("yesterday").is_none());
    }

    #[test]
    fn test_message_id_missing_or_empty() {
        assert!(Message::parse(b"Subject: x\r\n\r\n").message_id().is_none());
        assert!(Message::parse(b"Message-ID:\r\n\r\n").message_id().is_none());
        assert_eq!(
            Message::parse(b"Message-ID: <a@b>\r\n\r\n").message_id(),
            Some("<a@b>")
        );
    }
}
