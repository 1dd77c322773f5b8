//! Type-state markers for IMAP client connection states.

use crate::types::MailboxInfo;

/// Marker type for the not-authenticated state.
///
/// In this state, only STARTTLS and LOGIN are valid.
#[derive(Debug, Clone, Copy, Default)]
pub struct NotAuthenticated;

/// Marker type for the authenticated state.
///
/// In this state, a mailbox can be selected.
#[derive(Debug, Clone, Copy, Default)]
pub struct Authenticated;

/// State for a selected mailbox.
///
/// Carries the mailbox name and the snapshot reported by SELECT.
#[derive(Debug, Clone)]
pub struct Selected {
    pub(crate) mailbox: String,
    pub(crate) info: MailboxInfo,
}

impl Selected {
    /// Returns the name of the selected mailbox.
    #[must_use]
    pub fn mailbox(&self) -> &str {
        &self.mailbox
    }

    /// Returns the mailbox snapshot taken at SELECT time.
    #[must_use]
    pub const fn info(&self) -> MailboxInfo {
        self.info
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

    fn _assert_send<T: Send>() {}

    #[test]
    fn test_state_markers_are_send() {
        _assert_send::<NotAuthenticated>();
        _assert_send::<Authenticated>();
        _assert_send::<Selected>();
    }

    #[test]
    fn test_selected_accessors() {
        let selected = Selected {
            mailbox: "INBOX".to_string(),
            info: MailboxInfo {
                exists: 12,
                uid_validity: Some(3857529045),
            },
        };
        assert_eq!(selected.mailbox(), "INBOX");
        assert_eq!(selected.info().exists, 12);
        assert_eq!(selected.info().uid_validity, Some(3857529045));
    }
}
