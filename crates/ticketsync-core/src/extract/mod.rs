//! Message extraction.
//!
//! Turns a partial UID FETCH result (selected header fields plus a bounded
//! slice of the body) into an [`Email`] with a plaintext body.

mod html;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ticketsync_imap::RawMessage;
use ticketsync_mime::Message;

pub use html::{WRAP_COLUMN, html_to_text, wrap};

/// Maximum body length, in characters.
pub const BODY_LIMIT: usize = 10_000;

/// Plaintext bodies shorter than this (trimmed) yield to an HTML part.
pub const MIN_PLAIN_LEN: usize = 100;

/// An email extracted from the mailbox. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Email {
    /// Message-ID header, or `<uid>@unknown`.
    pub message_id: String,
    /// Decoded `From:` value in its original `Name <addr>` form.
    pub sender: String,
    /// Decoded subject.
    pub subject: String,
    /// Date header, or the extraction time when absent or unparsable.
    pub sent_at: DateTime<Utc>,
    /// Plaintext body, at most [`BODY_LIMIT`] characters.
    pub body: String,
}

/// Extracts an email from a fetched message.
///
/// Returns `None` when the From or Subject header is missing.
#[must_use]
pub fn extract(raw: &RawMessage, now: DateTime<Utc>) -> Option<Email> {
    let message = Message::from_parts(&raw.header, &raw.text);
    let sender = message.from().filter(|s| !s.trim().is_empty())?;
    let subject = message.subject()?;

    let message_id = message.message_id().map_or_else(
        || {
            let id = raw.uid.map_or(raw.seq, |uid| uid.get());
            format!("{id}@unknown")
        },
        str::to_string,
    );
    let sent_at = message.date().map_or(now, |d| d.with_timezone(&Utc));

    Some(Email {
        message_id,
        sender: sender.trim().to_string(),
        subject: subject.trim().to_string(),
        sent_at,
        body: truncate_chars(&body_text(&message), BODY_LIMIT),
    })
}

fn body_text(message: &Message) -> String {
    let plain = message.text_part();
    let html = message.html_part();
    match (plain, html) {
        (Some(plain), Some(html)) if plain.trim().chars().count() < MIN_PLAIN_LEN => {
            html_to_text(&html)
        }
        (Some(plain), _) => plain.trim().to_string(),
        (None, Some(html)) => html_to_text(&html),
        (None, None) => String::new(),
    }
}

/// Truncates `text` to at most `limit` characters.
#[must_use]
pub fn truncate_chars(text: &str, limit: usize) -> String {
    match text.char_indices().nth(limit) {
        Some((at, _)) => text[..at].to_string(),
        None => text.to_string(),
    }
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
    use chrono::TimeZone;
    use ticketsync_imap::Uid;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    fn raw(header: &str, text: &str) -> RawMessage {
        RawMessage {
            seq: 7,
            uid: Uid::new(4242),
            header: header.replace('\n', "\r\n").into_bytes(),
            text: text.replace('\n', "\r\n").into_bytes(),
        }
    }

    #[test]
    fn test_missing_from_is_none() {
        let msg = raw("Subject: Your tickets\n\n", "body");
        assert!(extract(&msg, now()).is_none());
    }

    #[test]
    fn test_missing_subject_is_none() {
        let msg = raw("From: orders@tickets.com\n\n", "body");
        assert!(extract(&msg, now()).is_none());
    }

    #[test]
    fn test_plain_message() {
        let msg = raw(
            "From: Tickets <orders@tickets.com>\nSubject: Order 123\n\
             Date: Fri, 5 Jan 2024 10:00:00 +0100\nMessage-ID: <abc@tickets.com>\n\n",
            "Thanks for your order.\n",
        );
        let email = extract(&msg, now()).unwrap();
        assert_eq!(email.sender, "Tickets <orders@tickets.com>");
        assert_eq!(email.subject, "Order 123");
        assert_eq!(email.message_id, "<abc@tickets.com>");
        assert_eq!(
            email.sent_at,
            Utc.with_ymd_and_hms(2024, 1, 5, 9, 0, 0).unwrap()
        );
        assert_eq!(email.body, "Thanks for your order.");
    }

    #[test]
    fn test_defaults_for_missing_date_and_id() {
        let msg = raw("From: a@b.com\nSubject: Hi\nDate: not a date\n\n", "x");
        let email = extract(&msg, now()).unwrap();
        assert_eq!(email.sent_at, now());
        assert_eq!(email.message_id, "4242@unknown");
    }

    #[test]
    fn test_encoded_words_decoded() {
        let msg = raw(
            "From: =?utf-8?Q?Caf=C3=A9_Tickets?= <hi@cafe.com>\n\
             Subject: =?utf-8?B?WW91ciB0aWNrZXRz?=\n\n",
            "",
        );
        let email = extract(&msg, now()).unwrap();
        assert_eq!(email.sender, "Café Tickets <hi@cafe.com>");
        assert_eq!(email.subject, "Your tickets");
    }

    #[test]
    fn test_short_plain_prefers_html() {
        let plain = "View this email in your browser, please.";
        assert_eq!(plain.len(), 40);
        let msg = raw(
            "From: a@tickets.com\nSubject: S\nContent-Type: multipart/alternative; boundary=\"b\"\n\n",
            &format!(
                "--b\nContent-Type: text/plain\n\n{plain}\n\
                 --b\nContent-Type: text/html\n\n<p>Section 101, Row F</p>\n--b--\n"
            ),
        );
        let email = extract(&msg, now()).unwrap();
        assert_eq!(email.body, "Section 101, Row F");
    }

    #[test]
    fn test_long_plain_kept() {
        let plain = "Seat details follow. ".repeat(10);
        let msg = raw(
            "From: a@tickets.com\nSubject: S\nContent-Type: multipart/alternative; boundary=\"b\"\n\n",
            &format!(
                "--b\nContent-Type: text/plain\n\n{plain}\n\
                 --b\nContent-Type: text/html\n\n<p>HTML version</p>\n--b--\n"
            ),
        );
        let email = extract(&msg, now()).unwrap();
        assert_eq!(email.body, plain.trim());
    }

    #[test]
    fn test_single_part_html_converted() {
        let msg = raw(
            "From: a@tickets.com\nSubject: S\nContent-Type: text/html; charset=utf-8\n\n",
            "<html><body><h1>Confirmed</h1></body></html>",
        );
        let email = extract(&msg, now()).unwrap();
        assert_eq!(email.body, "Confirmed");
    }

    #[test]
    fn test_quoted_printable_body() {
        let msg = raw(
            "From: a@tickets.com\nSubject: S\nContent-Transfer-Encoding: quoted-printable\n\n",
            "Caf=C3=A9 =\nopen",
        );
        let email = extract(&msg, now()).unwrap();
        assert_eq!(email.body, "Café open");
    }

    #[test]
    fn test_body_truncated_on_char_boundary() {
        let body = "é".repeat(BODY_LIMIT + 50);
        let msg = raw("From: a@tickets.com\nSubject: S\n\n", &body);
        let email = extract(&msg, now()).unwrap();
        assert_eq!(email.body.chars().count(), BODY_LIMIT);
    }

    #[test]
    fn test_truncate_chars_short_input() {
        assert_eq!(truncate_chars("abc", 10), "abc");
        assert_eq!(truncate_chars("abcdef", 3), "abc");
    }
}
