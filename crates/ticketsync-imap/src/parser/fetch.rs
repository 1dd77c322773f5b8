//! FETCH response parsing.
//!
//! Works on a complete response as produced by the framed reader, i.e. with
//! every `{n}\r\n` literal already followed by its `n` bytes.

use crate::types::Uid;
use crate::{Error, Result};

/// Data items of one `* n FETCH (...)` response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchData {
    /// The UID item, if present.
    pub uid: Option<Uid>,
    /// `BODY[section]` items in response order, keyed by upper-cased section.
    pub sections: Vec<(String, Vec<u8>)>,
}

impl FetchData {
    /// Returns the first body section whose name starts with `prefix`.
    #[must_use]
    pub fn section(&self, prefix: &str) -> Option<&[u8]> {
        let prefix = prefix.to_ascii_uppercase();
        self.sections
            .iter()
            .find(|(name, _)| name.starts_with(&prefix))
            .map(|(_, data)| data.as_slice())
    }
}

/// Byte cursor over a FETCH item list.
pub(super) struct Cursor<'a> {
    input: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    pub(super) const fn new(input: &'a [u8], pos: usize) -> Self {
        Self { input, pos }
    }

    fn peek(&self) -> Option<u8> {
        self.input.get(self.pos).copied()
    }

    fn error(&self, message: impl Into<String>) -> Error {
        Error::Parse {
            position: self.pos,
            message: message.into(),
        }
    }

    fn expect(&mut self, byte: u8) -> Result<()> {
        if self.peek() == Some(byte) {
            self.pos += 1;
            Ok(())
        } else {
            Err(self.error(format!("expected '{}'", byte as char)))
        }
    }

    fn skip_spaces(&mut self) {
        while self.peek() == Some(b' ') {
            self.pos += 1;
        }
    }

    fn atom(&mut self) -> &'a str {
        let start = self.pos;
        while let Some(b) = self.peek() {
            if matches!(b, b' ' | b'(' | b')' | b'[' | b']' | b'<' | b'{' | b'"' | b'\r' | b'\n') {
                break;
            }
            self.pos += 1;
        }
        std::str::from_utf8(&self.input[start..self.pos]).unwrap_or("")
    }

    fn number(&mut self) -> Result<u32> {
        let atom = self.atom();
        atom.parse()
            .map_err(|_| self.error(format!("expected number, got {atom:?}")))
    }

    /// Reads `[section]`, allowing nested parenthesized field lists.
    fn section(&mut self) -> Result<String> {
        self.expect(b'[')?;
        let start = self.pos;
        let mut depth = 0usize;
        loop {
            match self.peek() {
                Some(b'(') => depth += 1,
                Some(b')') => depth = depth.saturating_sub(1),
                Some(b']') if depth == 0 => break,
                Some(_) => {}
                None => return Err(self.error("unterminated section")),
            }
            self.pos += 1;
        }
        let section = String::from_utf8_lossy(&self.input[start..self.pos]).to_ascii_uppercase();
        self.pos += 1;
        Ok(section)
    }

    fn skip_origin(&mut self) -> Result<()> {
        if self.peek() == Some(b'<') {
            while let Some(b) = self.peek() {
                self.pos += 1;
                if b == b'>' {
                    return Ok(());
                }
            }
            return Err(self.error("unterminated origin"));
        }
        Ok(())
    }

    fn literal(&mut self) -> Result<&'a [u8]> {
        self.expect(b'{')?;
        let start = self.pos;
        while self.peek().is_some_and(|b| b.is_ascii_digit()) {
            self.pos += 1;
        }
        let len: usize = std::str::from_utf8(&self.input[start..self.pos])
            .ok()
            .and_then(|digits| digits.parse().ok())
            .ok_or_else(|| self.error("invalid literal length"))?;
        if self.peek() == Some(b'+') {
            self.pos += 1;
        }
        self.expect(b'}')?;
        self.expect(b'\r')?;
        self.expect(b'\n')?;
        let end = self.pos + len;
        let data = self
            .input
            .get(self.pos..end)
            .ok_or_else(|| self.error(format!("literal of {len} bytes is truncated")))?;
        self.pos = end;
        Ok(data)
    }

    fn quoted(&mut self) -> Result<Vec<u8>> {
        self.expect(b'"')?;
        let mut out = Vec::new();
        loop {
            match self.peek() {
                Some(b'\\') => {
                    self.pos += 1;
                    if let Some(b) = self.peek() {
                        out.push(b);
                        self.pos += 1;
                    }
                }
                Some(b'"') => {
                    self.pos += 1;
                    return Ok(out);
                }
                Some(b) => {
                    out.push(b);
                    self.pos += 1;
                }
                None => return Err(self.error("unterminated quoted string")),
            }
        }
    }

    /// Reads an nstring: literal, quoted string or NIL (empty).
    fn nstring(&mut self) -> Result<Vec<u8>> {
        match self.peek() {
            Some(b'{') => Ok(self.literal()?.to_vec()),
            Some(b'"') => self.quoted(),
            _ => {
                let atom = self.atom();
                if atom.eq_ignore_ascii_case("NIL") {
                    Ok(Vec::new())
                } else {
                    Err(self.error(format!("expected nstring, got {atom:?}")))
                }
            }
        }
    }

    /// Skips any value: list, string, literal or atom.
    fn skip_value(&mut self) -> Result<()> {
        match self.peek() {
            Some(b'(') => {
                self.pos += 1;
                loop {
                    self.skip_spaces();
                    match self.peek() {
                        Some(b')') => {
                            self.pos += 1;
                            return Ok(());
                        }
                        Some(_) => self.skip_value()?,
                        None => return Err(self.error("unterminated list")),
                    }
                }
            }
            Some(b'"') => self.quoted().map(|_| ()),
            Some(b'{') => self.literal().map(|_| ()),
            Some(b'[') => self.section().map(|_| ()),
            _ => {
                if self.atom().is_empty() {
                    // Stray byte; step over it so the loop always advances.
                    self.pos += 1;
                }
                Ok(())
            }
        }
    }

    /// Parses `(item value item value ...)`.
    pub(super) fn fetch_items(&mut self) -> Result<FetchData> {
        self.expect(b'(')?;
        let mut data = FetchData::default();

        loop {
            self.skip_spaces();
            match self.peek() {
                Some(b')') => {
                    self.pos += 1;
                    break;
                }
                None => return Err(self.error("unterminated FETCH item list")),
                Some(_) => {}
            }

            let name = self.atom().to_ascii_uppercase();
            match name.as_str() {
                "UID" => {
                    self.skip_spaces();
                    data.uid = Uid::new(self.number()?);
                }
                "BODY" | "BODY.PEEK" | "RFC822.HEADER" | "RFC822.TEXT" | "RFC822" => {
                    let section = if self.peek() == Some(b'[') {
                        self.section()?
                    } else {
                        name.trim_start_matches("RFC822.").to_string()
                    };
                    self.skip_origin()?;
                    self.skip_spaces();
                    let value = self.nstring()?;
                    data.sections.push((section, value));
                }
                "" => return Err(self.error("expected FETCH item name")),
                _ => {
                    self.skip_spaces();
                    self.skip_value()?;
                }
            }
        }

        Ok(data)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn parse(input: &[u8]) -> Result<FetchData> {
        Cursor::new(input, 0).fetch_items()
    }

    #[test]
    fn test_uid_and_literal_sections() {
        let input = b"(UID 42 BODY[HEADER.FIELDS (FROM SUBJECT)] {15}\r\nFrom: a@b.com\r\n BODY[TEXT]<0> {5}\r\nhello)";
        let data = parse(input).unwrap();
        assert_eq!(data.uid, Uid::new(42));
        assert_eq!(data.section("HEADER").unwrap(), b"From: a@b.com\r\n");
        assert_eq!(data.section("text").unwrap(), b"hello");
    }

    #[test]
    fn test_nil_and_quoted_bodies() {
        let data = parse(b"(BODY[TEXT] NIL BODY[HEADER] \"Subject: x\")").unwrap();
        assert_eq!(data.section("TEXT").unwrap(), b"");
        assert_eq!(data.section("HEADER").unwrap(), b"Subject: x");
    }

    #[test]
    fn test_unknown_items_are_skipped() {
        let data =
            parse(b"(FLAGS (\\Seen \\Answered) RFC822.SIZE 1234 UID 7 INTERNALDATE \"17-Jul-1996 02:44:25 -0700\")")
                .unwrap();
        assert_eq!(data.uid, Uid::new(7));
        assert!(data.sections.is_empty());
    }

    #[test]
    fn test_literal_containing_parens() {
        let data = parse(b"(BODY[TEXT] {7}\r\n(a) ) b UID 3)").unwrap();
        assert_eq!(data.section("TEXT").unwrap(), b"(a) ) b");
        assert_eq!(data.uid, Uid::new(3));
    }

    #[test]
    fn test_truncated_literal_is_error() {
        assert!(parse(b"(BODY[TEXT] {50}\r\nshort)").is_err());
    }

    #[test]
    fn test_unterminated_list_is_error() {
        assert!(parse(b"(UID 5").is_err());
    }
}
