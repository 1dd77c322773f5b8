//! MIME decoding utilities.
//!
//! Supports Base64, Quoted-Printable, RFC 2047 header words and the handful
//! of charsets ticketing mail actually uses.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use crate::error::Result;

/// Decodes Base64 data, ignoring embedded whitespace.
///
/// A trailing partial quantum (left by a truncated fetch) is dropped
/// rather than reported.
///
/// # Errors
///
/// Returns an error if the input contains non-Base64 characters.
pub fn decode_base64(data: &[u8]) -> Result<Vec<u8>> {
    let cleaned: Vec<u8> = data
        .iter()
        .copied()
        .filter(|b| !b.is_ascii_whitespace())
        .collect();
    let usable = if cleaned.len() % 4 == 0 {
        cleaned.len()
    } else {
        cleaned.len() / 4 * 4
    };
    STANDARD.decode(&cleaned[..usable]).map_err(Into::into)
}

/// Decodes Quoted-Printable data (RFC 2045).
///
/// Soft line breaks are removed. An `=` that does not start a valid escape
/// is kept literally, matching what mail clients display.
#[must_use]
pub fn decode_quoted_printable(data: &[u8]) -> Vec<u8> {
    let mut result = Vec::with_capacity(data.len());
    let mut i = 0;

    while i < data.len() {
        let byte = data[i];
        if byte != b'=' {
            result.push(byte);
            i += 1;
            continue;
        }

        match data.get(i + 1..) {
            Some([b'\r', b'\n', ..]) => i += 3,
            Some([b'\n', ..]) => i += 2,
            Some([hi, lo, ..]) if hi.is_ascii_hexdigit() && lo.is_ascii_hexdigit() => {
                result.push((hex_value(*hi) << 4) | hex_value(*lo));
                i += 3;
            }
            _ => {
                result.push(b'=');
                i += 1;
            }
        }
    }

    result
}

const fn hex_value(b: u8) -> u8 {
    match b {
        b'0'..=b'9' => b - b'0',
        b'a'..=b'f' => b - b'a' + 10,
        b'A'..=b'F' => b - b'A' + 10,
        _ => 0,
    }
}

/// Converts bytes in `charset` to a string.
///
/// UTF-8 and ASCII are decoded lossily; ISO-8859-1 and Windows-1252 map
/// each byte to the code point of the same value. Unknown charsets are
/// treated as UTF-8.
#[must_use]
pub fn decode_charset(bytes: &[u8], charset: Option<&str>) -> String {
    let charset = charset.map(str::to_ascii_lowercase);
    match charset.as_deref() {
        Some("iso-8859-1" | "latin1" | "latin-1" | "windows-1252" | "cp1252") => {
            bytes.iter().map(|&b| char::from(b)).collect()
        }
        _ => String::from_utf8_lossy(bytes).into_owned(),
    }
}

/// Decodes every RFC 2047 encoded word in a header value.
///
/// Format: `=?charset?encoding?encoded-text?=`. Whitespace between two
/// adjacent encoded words is dropped; other text passes through unchanged.
/// A word that fails to decode is left as it appeared.
#[must_use]
pub fn decode_rfc2047(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    let mut pending_space = String::new();
    let mut last_was_word = false;

    while !rest.is_empty() {
        let Some(start) = rest.find("=?") else {
            out.push_str(&pending_space);
            out.push_str(rest);
            return out;
        };

        let (before, candidate) = rest.split_at(start);
        if !before.is_empty() {
            if last_was_word && before.chars().all(char::is_whitespace) {
                pending_space = before.to_string();
            } else {
                out.push_str(&pending_space);
                out.push_str(before);
                pending_space.clear();
                last_was_word = false;
            }
        }

        match decode_encoded_word(candidate) {
            Some((decoded, consumed)) => {
                if !last_was_word {
                    out.push_str(&pending_space);
                }
                pending_space.clear();
                out.push_str(&decoded);
                rest = &candidate[consumed..];
                last_was_word = true;
            }
            None => {
                out.push_str(&pending_space);
                pending_space.clear();
                out.push_str("=?");
                rest = &candidate[2..];
                last_was_word = false;
            }
        }
    }

    out
}

/// Decodes one encoded word at the start of `input`.
///
/// Returns the decoded text and the number of bytes consumed.
fn decode_encoded_word(input: &str) -> Option<(String, usize)> {
    let inner = input.strip_prefix("=?")?;
    let (charset, inner) = inner.split_once('?')?;
    let (encoding, inner) = inner.split_once('?')?;
    let end = inner.find("?=")?;
    let payload = &inner[..end];
    if payload.contains(char::is_whitespace) {
        return None;
    }
    let consumed = 2 + charset.len() + 1 + encoding.len() + 1 + end + 2;

    // RFC 2231 language suffix: charset*lang
    let charset = charset.split('*').next().unwrap_or(charset);
    let bytes = match encoding {
        "B" | "b" => decode_base64(payload.as_bytes()).ok()?,
        "Q" | "q" => decode_quoted_printable(payload.replace('_', " ").as_bytes()),
        _ => return None,
    };
    Some((decode_charset(&bytes, Some(charset)), consumed))
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
    use proptest::prelude::*;

    #[test]
    fn test_base64_with_line_breaks() {
        let decoded = decode_base64(b"SGVsbG8s\r\nIFdvcmxkIQ==").unwrap();
        assert_eq!(decoded, b"Hello, World!");
    }

    #[test]
    fn test_base64_truncated_tail_is_dropped() {
        let decoded = decode_base64(b"SGVsbG8sIFdvcmxkIQ").unwrap();
        assert_eq!(decoded, b"Hello, World");
    }

    #[test]
    fn test_base64_garbage_is_error() {
        assert!(decode_base64(b"!!!!").is_err());
    }

    #[test]
    fn test_quoted_printable_decode() {
        assert_eq!(decode_quoted_printable(b"H=C3=A9llo"), "Héllo".as_bytes());
        assert_eq!(decode_quoted_printable(b"Hello=\r\nWorld"), b"HelloWorld");
        assert_eq!(decode_quoted_printable(b"Hello=\nWorld"), b"HelloWorld");
    }

    #[test]
    fn test_quoted_printable_invalid_escape_kept() {
        assert_eq!(decode_quoted_printable(b"a=ZZb"), b"a=ZZb");
        assert_eq!(decode_quoted_printable(b"trailing="), b"trailing=");
    }

    #[test]
    fn test_decode_charset_latin1() {
        assert_eq!(decode_charset(&[0x63, 0x61, 0x66, 0xE9], Some("ISO-8859-1")), "café");
        assert_eq!(decode_charset("café".as_bytes(), None), "café");
    }

    #[test]
    fn test_rfc2047_plain_passthrough() {
        assert_eq!(decode_rfc2047("Hello"), "Hello");
    }

    #[test]
    fn test_rfc2047_base64_word() {
        assert_eq!(decode_rfc2047("=?utf-8?B?SMOpbGxv?="), "Héllo");
    }

    #[test]
    fn test_rfc2047_q_word_with_underscores() {
        assert_eq!(
            decode_rfc2047("=?UTF-8?Q?Your_tickets_for_Caf=C3=A9?="),
            "Your tickets for Café"
        );
    }

    #[test]
    fn test_rfc2047_adjacent_words_join() {
        assert_eq!(
            decode_rfc2047("=?utf-8?Q?Order_?= =?utf-8?Q?confirmed?="),
            "Order confirmed"
        );
    }

    #[test]
    fn test_rfc2047_mixed_with_text() {
        assert_eq!(
            decode_rfc2047("Re: =?iso-8859-1?Q?caf=E9?= tonight"),
            "Re: café tonight"
        );
    }

    #[test]
    fn test_rfc2047_malformed_left_alone() {
        assert_eq!(decode_rfc2047("=?broken"), "=?broken");
        assert_eq!(decode_rfc2047("a =?x?Z?abc?= b"), "a =?x?Z?abc?= b");
    }

    proptest! {
        #[test]
        fn quoted_printable_without_equals_is_identity(s in "[a-zA-Z0-9 .,!?\r\n]{0,200}") {
            prop_assert_eq!(decode_quoted_printable(s.as_bytes()), s.as_bytes().to_vec());
        }

        #[test]
        fn rfc2047_never_panics(s in "\\PC{0,100}") {
            let _ = decode_rfc2047(&s);
        }
    }
}
