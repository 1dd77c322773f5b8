//! IMAP command builder.
//!
//! This module provides types and serialization for the handful of IMAP
//! commands the client issues.

mod serialize;
mod tag_generator;
mod types;

pub use tag_generator::TagGenerator;
pub use types::{DEFAULT_HEADER_FIELDS, DEFAULT_TEXT_LIMIT, FetchRequest, SearchCriteria};

use serialize::{write_astring, write_fetch_request, write_search_criteria};

/// IMAP command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// LOGOUT command.
    Logout,
    /// STARTTLS command.
    StartTls,
    /// LOGIN command.
    Login {
        /// Username.
        username: String,
        /// Password.
        password: String,
    },
    /// SELECT command.
    Select {
        /// Mailbox to select.
        mailbox: String,
    },
    /// UID SEARCH command.
    UidSearch {
        /// Search criteria.
        criteria: SearchCriteria,
    },
    /// UID FETCH command.
    UidFetch {
        /// Sequence set of UIDs (`1,4:6`).
        uids: String,
        /// Items to fetch.
        request: FetchRequest,
    },
}

impl Command {
    /// Serializes the command with the given tag, CRLF-terminated.
    #[must_use]
    pub fn serialize(&self, tag: &str) -> Vec<u8> {
        let mut buf = Vec::with_capacity(64);
        buf.extend_from_slice(tag.as_bytes());
        buf.push(b' ');

        match self {
            Self::Logout => buf.extend_from_slice(b"LOGOUT"),
            Self::StartTls => buf.extend_from_slice(b"STARTTLS"),
            Self::Login { username, password } => {
                buf.extend_from_slice(b"LOGIN ");
                write_astring(&mut buf, username);
                buf.push(b' ');
                write_astring(&mut buf, password);
            }
            Self::Select { mailbox } => {
                buf.extend_from_slice(b"SELECT ");
                write_astring(&mut buf, mailbox);
            }
            Self::UidSearch { criteria } => {
                buf.extend_from_slice(b"UID SEARCH ");
                write_search_criteria(&mut buf, criteria);
            }
            Self::UidFetch { uids, request } => {
                buf.extend_from_slice(b"UID FETCH ");
                buf.extend_from_slice(uids.as_bytes());
                buf.push(b' ');
                write_fetch_request(&mut buf, request);
            }
        }

        buf.extend_from_slice(b"\r\n");
        buf
    }

    /// Returns a log-safe rendering of the command (credentials elided).
    #[must_use]
    pub fn redacted(&self, tag: &str) -> String {
        match self {
            Self::Login { username, .. } => format!("{tag} LOGIN {username} ****"),
            other => String::from_utf8_lossy(&other.serialize(tag))
                .trim_end()
                .to_string(),
        }
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
    use chrono::NaiveDate;

    use super::*;

    #[test]
    fn test_login_command() {
        let cmd = Command::Login {
            username: "user".to_string(),
            password: "pass".to_string(),
        };
        assert_eq!(cmd.serialize("T0001"), b"T0001 LOGIN user pass\r\n");
    }

    #[test]
    fn test_login_quoted() {
        let cmd = Command::Login {
            username: "user@example.com".to_string(),
            password: "pa\"ss word".to_string(),
        };
        assert_eq!(
            cmd.serialize("T0001"),
            b"T0001 LOGIN user@example.com \"pa\\\"ss word\"\r\n"
        );
    }

    #[test]
    fn test_login_redacted() {
        let cmd = Command::Login {
            username: "user@example.com".to_string(),
            password: "hunter2".to_string(),
        };
        let rendered = cmd.redacted("T0001");
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("user@example.com"));
    }

    #[test]
    fn test_select_command() {
        let cmd = Command::Select {
            mailbox: "INBOX".to_string(),
        };
        assert_eq!(cmd.serialize("T0002"), b"T0002 SELECT INBOX\r\n");
    }

    #[test]
    fn test_uid_search_from_since() {
        let since = NaiveDate::from_ymd_opt(2024, 1, 5).unwrap();
        let cmd = Command::UidSearch {
            criteria: SearchCriteria::from_since("tickets@example.com", since),
        };
        assert_eq!(
            cmd.serialize("T0003"),
            b"T0003 UID SEARCH FROM \"tickets@example.com\" SINCE 5-Jan-2024\r\n"
        );
    }

    #[test]
    fn test_uid_fetch_command() {
        let cmd = Command::UidFetch {
            uids: "4:6,9".to_string(),
            request: FetchRequest {
                header_fields: vec!["FROM".to_string(), "SUBJECT".to_string()],
                text_limit: 2048,
            },
        };
        assert_eq!(
            cmd.serialize("T0004"),
            b"T0004 UID FETCH 4:6,9 (UID BODY.PEEK[HEADER.FIELDS (FROM SUBJECT)] BODY.PEEK[TEXT]<0.2048>)\r\n"
        );
    }

    #[test]
    fn test_starttls_and_logout() {
        assert_eq!(Command::StartTls.serialize("T0001"), b"T0001 STARTTLS\r\n");
        assert_eq!(Command::Logout.serialize("T0009"), b"T0009 LOGOUT\r\n");
    }
}
