//! Header block of a fetched message.

use crate::encoding::decode_rfc2047;

/// Unfolded header fields in arrival order.
///
/// Names are stored lower-cased and looked up case-insensitively; when a
/// field repeats, lookups return the first occurrence.
#[derive(Debug, Clone, Default)]
pub struct Headers {
    fields: Vec<(String, String)>,
}

impl Headers {
    /// Parses a header block.
    ///
    /// Folded lines (leading space or tab) are joined with a single space.
    /// Parsing stops at the first empty line. Invalid UTF-8 is replaced and
    /// lines without a colon are skipped.
    #[must_use]
    pub fn parse(raw: &[u8]) -> Self {
        let text = String::from_utf8_lossy(raw);
        let mut fields: Vec<(String, String)> = Vec::new();

        for line in text.lines() {
            if line.is_empty() {
                break;
            }
            if line.starts_with([' ', '\t']) {
                if let Some((_, value)) = fields.last_mut() {
                    value.push(' ');
                    value.push_str(line.trim());
                }
                continue;
            }
            if let Some((name, value)) = line.split_once(':') {
                fields.push((name.trim().to_ascii_lowercase(), value.trim().to_string()));
            }
        }

        Self { fields }
    }

    /// Raw value of the first `name` field.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(field, _)| field.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Value of the first `name` field with RFC 2047 words decoded.
    #[must_use]
    pub fn get_decoded(&self, name: &str) -> Option<String> {
        self.get(name).map(decode_rfc2047)
    }

    /// Number of fields, counting repeats.
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Returns true if no field was parsed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_is_case_insensitive() {
        let headers = Headers::parse(b"Content-Type: text/plain\r\n");
        assert_eq!(headers.get("content-type"), Some("text/plain"));
        assert_eq!(headers.get("CONTENT-TYPE"), Some("text/plain"));
    }

    #[test]
    fn test_repeated_field_returns_first() {
        let headers = Headers::parse(b"Received: one\r\nreceived: two\r\n");
        assert_eq!(headers.get("Received"), Some("one"));
        assert_eq!(headers.len(), 2);
    }

    #[test]
    fn test_folding_and_end_of_block() {
        let raw = concat!(
            "From: sender@example.com\r\n",
            "Subject: Test Message\r\n",
            "Content-Type: text/plain;\r\n",
            "\tcharset=utf-8\r\n",
            "\r\n",
            "Ignored: body line\r\n",
        );

        let headers = Headers::parse(raw.as_bytes());
        assert_eq!(headers.get("From"), Some("sender@example.com"));
        assert_eq!(headers.get("Subject"), Some("Test Message"));
        assert_eq!(
            headers.get("Content-Type"),
            Some("text/plain; charset=utf-8")
        );
        assert!(headers.get("Ignored").is_none());
    }

    #[test]
    fn test_parse_without_trailing_blank_line() {
        let headers = Headers::parse(b"Subject: last");
        assert_eq!(headers.get("subject"), Some("last"));
    }

    #[test]
    fn test_continuation_before_any_field_is_dropped() {
        let headers = Headers::parse(b"  stray\r\nSubject: ok\r\n");
        assert_eq!(headers.len(), 1);
        assert_eq!(headers.get("subject"), Some("ok"));
    }

    #[test]
    fn test_get_decoded() {
        let headers = Headers::parse(b"Subject: =?utf-8?B?SMOpbGxv?= there\r\n");
        assert_eq!(headers.get_decoded("subject").as_deref(), Some("Héllo there"));
    }

    #[test]
    fn test_empty_input() {
        assert!(Headers::parse(b"").is_empty());
    }
}
