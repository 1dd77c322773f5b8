//! Mailbox address extraction.

/// Extracts the bare address from a `From`-style header value.
///
/// Takes the text between the last `<` and the following `>` when both are
/// present, otherwise the whole value. The result is trimmed and
/// lower-cased; it is not validated.
#[must_use]
pub fn extract_address(value: &str) -> String {
    let candidate = value
        .rfind('<')
        .and_then(|open| {
            let inner = &value[open + 1..];
            inner.find('>').map(|close| &inner[..close])
        })
        .unwrap_or(value);

    candidate.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_angle_brackets() {
        assert_eq!(
            extract_address("Ticketmaster <Orders@TicketMaster.com>"),
            "orders@ticketmaster.com"
        );
    }

    #[test]
    fn test_quoted_display_name_with_brackets() {
        assert_eq!(
            extract_address("\"Box <Office>\" <box@venue.org>"),
            "box@venue.org"
        );
    }

    #[test]
    fn test_bare_address_is_trimmed() {
        assert_eq!(extract_address("  A@B.com "), "a@b.com");
    }

    #[test]
    fn test_unclosed_bracket_uses_whole_value() {
        assert_eq!(extract_address("Name <a@b.com"), "name <a@b.com");
    }
}
