//! IMAP command tag generator.
//!
//! Tags are used to match commands with their completion responses.

/// Tag generator for IMAP commands.
///
/// Generates unique sequential tags in the format "T0001", "T0002", etc.
/// A generator belongs to exactly one connection.
#[derive(Debug, Clone)]
pub struct TagGenerator {
    counter: u32,
    prefix: char,
}

impl TagGenerator {
    /// Creates a new tag generator with the given prefix.
    #[must_use]
    pub const fn new(prefix: char) -> Self {
        Self { counter: 0, prefix }
    }

    /// Generates the next tag.
    pub fn next_tag(&mut self) -> String {
        self.counter = self.counter.wrapping_add(1);
        format!("{}{:04}", self.prefix, self.counter)
    }

    /// Returns how many tags have been handed out.
    #[must_use]
    pub const fn issued(&self) -> u32 {
        self.counter
    }
}

impl Default for TagGenerator {
    fn default() -> Self {
        Self::new('T')
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

    #[test]
    fn test_tag_generation() {
        let mut generator = TagGenerator::default();
        assert_eq!(generator.next_tag(), "T0001");
        assert_eq!(generator.next_tag(), "T0002");
        assert_eq!(generator.issued(), 2);
    }

    #[test]
    fn test_custom_prefix() {
        let mut generator = TagGenerator::new('A');
        assert_eq!(generator.next_tag(), "A0001");
    }

    #[test]
    fn test_uniqueness() {
        let mut generator = TagGenerator::default();
        let mut seen = std::collections::HashSet::new();
        for _ in 0..10000 {
            assert!(seen.insert(generator.next_tag()), "duplicate tag generated");
        }
    }

    #[test]
    fn test_padding_grows_past_four_digits() {
        let mut generator = TagGenerator::default();
        for _ in 0..9999 {
            let _ = generator.next_tag();
        }
        assert_eq!(generator.next_tag(), "T10000");
    }
}
