//! Command serialization helpers.

use crate::date::format_imap_date;

use super::types::{FetchRequest, SearchCriteria};

/// Writes an astring (atom or quoted string).
pub fn write_astring(buf: &mut Vec<u8>, s: &str) {
    if s.is_empty() || s.bytes().any(needs_quoting) {
        write_quoted(buf, s);
    } else {
        buf.extend_from_slice(s.as_bytes());
    }
}

/// Writes a quoted string, escaping `"` and `\`.
pub fn write_quoted(buf: &mut Vec<u8>, s: &str) {
    buf.push(b'"');
    for b in s.bytes() {
        if b == b'"' || b == b'\\' {
            buf.push(b'\\');
        }
        buf.push(b);
    }
    buf.push(b'"');
}

/// Returns true if the byte needs quoting.
const fn needs_quoting(b: u8) -> bool {
    matches!(
        b,
        b' ' | b'"' | b'\\' | b'(' | b')' | b'{' | b'%' | b'*' | b']'
    ) || b < 0x20
        || b >= 0x7F
}

/// Writes SEARCH criteria.
pub fn write_search_criteria(buf: &mut Vec<u8>, criteria: &SearchCriteria) {
    match criteria {
        SearchCriteria::From(s) => {
            buf.extend_from_slice(b"FROM ");
            write_quoted(buf, s);
        }
        SearchCriteria::Since(date) => {
            buf.extend_from_slice(b"SINCE ");
            buf.extend_from_slice(format_imap_date(*date).as_bytes());
        }
        SearchCriteria::And(items) => {
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    buf.push(b' ');
                }
                write_search_criteria(buf, item);
            }
        }
    }
}

/// Writes the FETCH item list for a [`FetchRequest`].
pub fn write_fetch_request(buf: &mut Vec<u8>, request: &FetchRequest) {
    buf.extend_from_slice(b"(UID BODY.PEEK[HEADER.FIELDS (");
    buf.extend_from_slice(request.header_fields.join(" ").as_bytes());
    buf.extend_from_slice(b")] BODY.PEEK[TEXT]<0.");
    buf.extend_from_slice(request.text_limit.to_string().as_bytes());
    buf.extend_from_slice(b">)");
}
