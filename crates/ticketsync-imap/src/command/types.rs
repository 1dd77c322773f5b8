//! Command-related type definitions.

use chrono::NaiveDate;

/// SEARCH criteria.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchCriteria {
    /// FROM header contains text.
    From(String),
    /// Internal date on or after the given day.
    Since(NaiveDate),
    /// AND of criteria (IMAP juxtaposition).
    And(Vec<Self>),
}

impl SearchCriteria {
    /// `FROM "<from>" SINCE <date>`, the query issued once per sender.
    #[must_use]
    pub fn from_since(from: impl Into<String>, since: NaiveDate) -> Self {
        Self::And(vec![Self::From(from.into()), Self::Since(since)])
    }
}

/// Header fields requested when the caller does not override them.
pub const DEFAULT_HEADER_FIELDS: [&str; 6] = [
    "FROM",
    "SUBJECT",
    "DATE",
    "MESSAGE-ID",
    "CONTENT-TYPE",
    "CONTENT-TRANSFER-ENCODING",
];

/// Default number of body bytes requested per message.
pub const DEFAULT_TEXT_LIMIT: u32 = 100_000;

/// What to fetch for every message in a UID FETCH.
///
/// Serialized as
/// `(UID BODY.PEEK[HEADER.FIELDS (...)] BODY.PEEK[TEXT]<0.limit>)`; PEEK
/// keeps the `\Seen` flag untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    /// Header fields to return.
    pub header_fields: Vec<String>,
    /// Maximum number of body bytes to return.
    pub text_limit: u32,
}

impl FetchRequest {
    /// Creates a request with the default header fields and a custom body bound.
    #[must_use]
    pub fn with_text_limit(text_limit: u32) -> Self {
        Self {
            text_limit,
            ..Self::default()
        }
    }
}

impl Default for FetchRequest {
    fn default() -> Self {
        Self {
            header_fields: DEFAULT_HEADER_FIELDS
                .iter()
                .map(ToString::to_string)
                .collect(),
            text_limit: DEFAULT_TEXT_LIMIT,
        }
    }
}
