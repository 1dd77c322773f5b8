//! Core IMAP types used by the client.

use std::num::NonZeroU32;

/// Unique identifier for a message.
///
/// UIDs are persistent identifiers that don't change when messages are
/// expunged, which makes them suitable as a fallback message identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Uid(pub NonZeroU32);

impl Uid {
    /// Creates a new UID.
    ///
    /// Returns `None` if the value is 0.
    #[must_use]
    pub fn new(n: u32) -> Option<Self> {
        NonZeroU32::new(n).map(Self)
    }

    /// Returns the underlying value.
    #[must_use]
    pub const fn get(self) -> u32 {
        self.0.get()
    }
}

impl std::fmt::Display for Uid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Formats UIDs as an IMAP sequence set (`4,7,9`).
///
/// Consecutive runs are collapsed into ranges (`4:6`).
#[must_use]
pub fn uid_set(uids: &[Uid]) -> String {
    let mut sorted: Vec<u32> = uids.iter().map(|u| u.get()).collect();
    sorted.sort_unstable();
    sorted.dedup();

    let mut parts = Vec::new();
    let mut iter = sorted.into_iter().peekable();
    while let Some(start) = iter.next() {
        let mut end = start;
        while iter.peek() == Some(&(end + 1)) {
            end += 1;
            iter.next();
        }
        if start == end {
            parts.push(start.to_string());
        } else {
            parts.push(format!("{start}:{end}"));
        }
    }
    parts.join(",")
}

/// Response status of a tagged completion or untagged condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// Command completed successfully.
    Ok,
    /// Command failed (operational error).
    No,
    /// Command failed (protocol/syntax error).
    Bad,
    /// Server greeting (pre-authenticated).
    PreAuth,
    /// Server is closing connection.
    Bye,
}

impl Status {
    /// Parses a status keyword, case-insensitively.
    #[must_use]
    pub fn parse(word: &str) -> Option<Self> {
        match word.to_ascii_uppercase().as_str() {
            "OK" => Some(Self::Ok),
            "NO" => Some(Self::No),
            "BAD" => Some(Self::Bad),
            "PREAUTH" => Some(Self::PreAuth),
            "BYE" => Some(Self::Bye),
            _ => None,
        }
    }
}

/// Mailbox information returned by SELECT.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MailboxInfo {
    /// Number of messages in the mailbox.
    pub exists: u32,
    /// UIDVALIDITY value, if the server reported it.
    pub uid_validity: Option<u32>,
}

/// One message as returned by UID FETCH.
///
/// The header block and the body slice are kept as raw bytes; decoding
/// them is the caller's concern.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawMessage {
    /// Message sequence number at fetch time.
    pub seq: u32,
    /// Message UID, when the server included it.
    pub uid: Option<Uid>,
    /// Requested header fields (`Name: value` lines).
    pub header: Vec<u8>,
    /// Leading slice of the message text (everything after the header).
    pub text: Vec<u8>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn uids(values: &[u32]) -> Vec<Uid> {
        values.iter().map(|v| Uid::new(*v).unwrap()).collect()
    }

    #[test]
    fn test_uid_zero_is_rejected() {
        assert!(Uid::new(0).is_none());
        assert_eq!(Uid::new(42).unwrap().get(), 42);
    }

    #[test]
    fn test_uid_set_single() {
        assert_eq!(uid_set(&uids(&[7])), "7");
    }

    #[test]
    fn test_uid_set_collapses_runs() {
        assert_eq!(uid_set(&uids(&[9, 4, 5, 6, 12])), "4:6,9,12");
    }

    #[test]
    fn test_uid_set_dedups() {
        assert_eq!(uid_set(&uids(&[3, 3, 1])), "1,3");
    }

    #[test]
    fn test_status_parse() {
        assert_eq!(Status::parse("ok"), Some(Status::Ok));
        assert_eq!(Status::parse("BYE"), Some(Status::Bye));
        assert_eq!(Status::parse("FETCH"), None);
    }
}
