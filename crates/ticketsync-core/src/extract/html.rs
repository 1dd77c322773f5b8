//! HTML to plaintext conversion for email bodies.

use std::sync::LazyLock;

use htmd::HtmlToMarkdown;
use regex::{Captures, Regex};
use tracing::debug;

/// Column at which converted text is wrapped.
pub const WRAP_COLUMN: usize = 80;

#[allow(clippy::expect_used)]
fn pattern(re: &str) -> Regex {
    Regex::new(re).expect("static pattern compiles")
}

static RE_LINK: LazyLock<Regex> =
    LazyLock::new(|| pattern(r#"\[([^\]]*)\]\(\s*<?([^)\s>]*)>?(?:\s+"[^"]*")?\s*\)"#));
static RE_AUTOLINK: LazyLock<Regex> = LazyLock::new(|| pattern(r"<((?:https?|mailto):[^>\s]+)>"));
static RE_ESCAPE: LazyLock<Regex> = LazyLock::new(|| pattern(r"\\([\\`*_{}\[\]()#+\-.!|>~])"));
static RE_EMPHASIS: LazyLock<Regex> = LazyLock::new(|| pattern(r"(\*\*|__)(\S(?:.*?\S)?)(\*\*|__)"));
static RE_HEADING: LazyLock<Regex> = LazyLock::new(|| pattern(r"(?m)^#{1,6}\s+"));
static RE_TAG: LazyLock<Regex> = LazyLock::new(|| pattern(r"(?s)<[^>]*>"));
static RE_BLANKS: LazyLock<Regex> = LazyLock::new(|| pattern(r"\n[ \t]*\n(?:[ \t]*\n)+"));

/// Converts an HTML body to wrapped plaintext.
///
/// Images and non-content elements are dropped. Links keep their visible
/// text; the target follows in brackets unless it repeats the text.
#[must_use]
pub fn html_to_text(html: &str) -> String {
    let converter = HtmlToMarkdown::builder()
        .skip_tags(vec!["script", "style", "head", "title", "img", "svg"])
        .build();
    let markdown = match converter.convert(html) {
        Ok(markdown) => markdown,
        Err(e) => {
            debug!("HTML conversion failed, stripping tags instead: {e}");
            RE_TAG.replace_all(html, " ").into_owned()
        }
    };

    let text = RE_LINK.replace_all(&markdown, |caps: &Captures<'_>| {
        let label = RE_ESCAPE.replace_all(caps[1].trim(), "$1");
        let target = caps[2].trim();
        let bare = target.strip_prefix("mailto:").unwrap_or(target);
        if label.is_empty() {
            target.to_string()
        } else if target.is_empty() || label == target || label == bare {
            label.into_owned()
        } else {
            format!("{label} [{target}]")
        }
    });
    let text = RE_AUTOLINK.replace_all(&text, "$1");
    let text = RE_EMPHASIS.replace_all(&text, "$2");
    let text = RE_HEADING.replace_all(&text, "");
    let text = RE_ESCAPE.replace_all(&text, "$1");
    let text = text.replace('\u{a0}', " ");
    let text = RE_BLANKS.replace_all(&text, "\n\n");

    wrap(text.trim(), WRAP_COLUMN)
}

/// Greedy word wrap. Words longer than `width` get a line of their own.
#[must_use]
pub fn wrap(text: &str, width: usize) -> String {
    let mut out = String::with_capacity(text.len());
    for (i, line) in text.lines().enumerate() {
        if i > 0 {
            out.push('\n');
        }
        let line = line.trim_end();
        if line.chars().count() <= width {
            out.push_str(line);
            continue;
        }

        let mut column = 0;
        for word in line.split_whitespace() {
            let len = word.chars().count();
            if column > 0 && column + 1 + len > width {
                out.push('\n');
                column = 0;
            } else if column > 0 {
                out.push(' ');
                column += 1;
            }
            out.push_str(word);
            column += len;
        }
    }
    out
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
    fn test_paragraphs_survive() {
        let text = html_to_text("<html><body><p>Order confirmed</p><p>Row A, seat 12</p></body></html>");
        assert!(text.contains("Order confirmed"));
        assert!(text.contains("Row A, seat 12"));
        assert!(!text.contains('<'));
    }

    #[test]
    fn test_scripts_styles_images_dropped() {
        let text = html_to_text(
            "<style>p{color:red}</style><script>alert(1)</script>\
             <p>Hello<img src=\"https://cdn.example.com/logo.png\" alt=\"logo\"></p>",
        );
        assert!(text.contains("Hello"));
        assert!(!text.contains("color"));
        assert!(!text.contains("alert"));
        assert!(!text.contains("logo.png"));
    }

    #[test]
    fn test_link_target_kept_when_different() {
        let text = html_to_text("<p><a href=\"https://t.example.com/o/1\">View order</a></p>");
        assert_eq!(text, "View order [https://t.example.com/o/1]");
    }

    #[test]
    fn test_link_target_dropped_when_same_as_text() {
        let text =
            html_to_text("<p><a href=\"https://t.example.com\">https://t.example.com</a></p>");
        assert_eq!(text, "https://t.example.com");
    }

    #[test]
    fn test_lines_wrapped_at_80() {
        let sentence = "word ".repeat(60);
        let text = html_to_text(&format!("<p>{sentence}</p>"));
        assert!(text.lines().count() > 1);
        assert!(text.lines().all(|l| l.chars().count() <= WRAP_COLUMN));
    }

    #[test]
    fn test_wrap_long_word_on_own_line() {
        let long = "x".repeat(100);
        let wrapped = wrap(&format!("a {long} b"), 80);
        assert_eq!(wrapped, format!("a\n{long}\nb"));
    }

    #[test]
    fn test_wrap_short_lines_untouched() {
        assert_eq!(wrap("one\n\ntwo", 80), "one\n\ntwo");
    }
}
