//! Sender allow-list.
//!
//! Decides whether a `From:` value belongs to one of the approved vendor
//! identities and yields the SEARCH terms the sync walks, in order.

use std::fmt;
use std::str::FromStr;

use regex::Regex;
use ticketsync_mime::extract_address;

use crate::{Error, Result};

/// Vendor tokens used when no allow-list is configured.
pub const DEFAULT_VENDORS: &[&str] = &[
    "ticketmaster",
    "livenation",
    "axs",
    "eventbrite",
    "seatgeek",
    "stubhub",
    "dice.fm",
    "seetickets",
];

/// Matching strategy, selected by configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Policy {
    /// Full address equality.
    Exact,
    /// Domain suffix (`@domain.tld` or bare `domain.tld`).
    DomainSuffix,
    /// Token anywhere in the domain.
    Substring,
}

impl FromStr for Policy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "exact" => Ok(Self::Exact),
            "suffix" | "domain" | "domain-suffix" => Ok(Self::DomainSuffix),
            "substring" | "contains" => Ok(Self::Substring),
            other => Err(Error::Config(format!("unknown allow-list policy: {other}"))),
        }
    }
}

impl fmt::Display for Policy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exact => write!(f, "exact"),
            Self::DomainSuffix => write!(f, "domain-suffix"),
            Self::Substring => write!(f, "substring"),
        }
    }
}

/// An approved set of sender identities under one policy.
#[derive(Debug, Clone)]
pub enum AllowList {
    /// Sender must equal one of these addresses (lower-cased).
    Exact(Vec<String>),
    /// Sender's domain must end with one of these suffixes (lower-cased).
    DomainSuffix(Vec<String>),
    /// Sender's domain must contain one of these tokens.
    Substring(Vec<SubstringRule>),
}

/// One substring token and its compiled domain pattern.
#[derive(Debug, Clone)]
pub struct SubstringRule {
    token: String,
    pattern: Regex,
}

impl SubstringRule {
    fn new(token: &str) -> Result<Self> {
        let token = token.trim().to_lowercase();
        let pattern = Regex::new(&format!(
            r"(?i)@[a-z0-9.-]*{}[a-z0-9.-]*\.[a-z]{{2,}}$",
            regex::escape(&token)
        ))
        .map_err(|e| Error::Config(format!("invalid allow-list token {token:?}: {e}")))?;
        Ok(Self { token, pattern })
    }
}

impl AllowList {
    /// Builds an allow-list for `policy` from raw configuration entries.
    ///
    /// Entries are trimmed and lower-cased; blank entries are skipped.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] when no usable entry remains.
    pub fn new<S: AsRef<str>>(policy: Policy, entries: &[S]) -> Result<Self> {
        let entries: Vec<String> = entries
            .iter()
            .map(|e| e.as_ref().trim().to_lowercase())
            .filter(|e| !e.is_empty())
            .collect();
        if entries.is_empty() {
            return Err(Error::Config("allow-list is empty".to_string()));
        }

        Ok(match policy {
            Policy::Exact => Self::Exact(entries),
            Policy::DomainSuffix => Self::DomainSuffix(entries),
            Policy::Substring => Self::Substring(
                entries
                    .iter()
                    .map(|token| SubstringRule::new(token))
                    .collect::<Result<_>>()?,
            ),
        })
    }

    /// Returns the policy this list applies.
    #[must_use]
    pub const fn policy(&self) -> Policy {
        match self {
            Self::Exact(_) => Policy::Exact,
            Self::DomainSuffix(_) => Policy::DomainSuffix,
            Self::Substring(_) => Policy::Substring,
        }
    }

    /// Returns the SEARCH terms, in configuration order.
    #[must_use]
    pub fn search_terms(&self) -> Vec<String> {
        match self {
            Self::Exact(entries) | Self::DomainSuffix(entries) => entries.clone(),
            Self::Substring(rules) => rules.iter().map(|r| r.token.clone()).collect(),
        }
    }

    /// Checks a raw `From:` value against the list.
    #[must_use]
    pub fn is_approved(&self, sender_field: &str) -> bool {
        let address = extract_address(sender_field);
        match self {
            Self::Exact(entries) => entries.iter().any(|e| *e == address),
            Self::DomainSuffix(entries) => {
                let Some((_, domain)) = address.rsplit_once('@') else {
                    return false;
                };
                entries.iter().any(|entry| domain_matches(&address, domain, entry))
            }
            Self::Substring(rules) => rules.iter().any(|r| r.pattern.is_match(&address)),
        }
    }
}

fn domain_matches(address: &str, domain: &str, entry: &str) -> bool {
    if entry.starts_with('@') {
        return address.ends_with(entry);
    }
    domain == entry
        || domain
            .strip_suffix(entry)
            .is_some_and(|prefix| prefix.ends_with('.'))
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

    fn suffix() -> AllowList {
        AllowList::new(Policy::DomainSuffix, &["ticketmaster.com", "@axs.com"]).unwrap()
    }

    fn substring() -> AllowList {
        AllowList::new(Policy::Substring, &["ticketmaster", "dice.fm"]).unwrap()
    }

    #[test]
    fn test_policy_parse() {
        assert_eq!("exact".parse::<Policy>().unwrap(), Policy::Exact);
        assert_eq!("Domain-Suffix".parse::<Policy>().unwrap(), Policy::DomainSuffix);
        assert_eq!("substring".parse::<Policy>().unwrap(), Policy::Substring);
        assert!("fuzzy".parse::<Policy>().is_err());
    }

    #[test]
    fn test_empty_list_rejected() {
        assert!(AllowList::new::<&str>(Policy::Exact, &[]).is_err());
        assert!(AllowList::new(Policy::Exact, &["  "]).is_err());
    }

    #[test]
    fn test_exact_policy() {
        let list = AllowList::new(Policy::Exact, &["Orders@Tickets.com"]).unwrap();
        assert!(list.is_approved("Tickets <orders@tickets.com>"));
        assert!(list.is_approved("ORDERS@TICKETS.COM"));
        assert!(!list.is_approved("other@tickets.com"));
        assert_eq!(list.search_terms(), vec!["orders@tickets.com"]);
    }

    #[test]
    fn test_suffix_policy_subdomain() {
        let list = suffix();
        assert!(list.is_approved("x@mail.ticketmaster.com"));
        assert!(list.is_approved("Ticketmaster <x@ticketmaster.com>"));
        assert!(!list.is_approved("x@nottickemaster.com"));
        assert!(!list.is_approved("x@notticketmaster.com"));
    }

    #[test]
    fn test_suffix_policy_at_entry_is_exact_domain() {
        let list = suffix();
        assert!(list.is_approved("x@axs.com"));
        assert!(!list.is_approved("x@mail.axs.com"));
    }

    #[test]
    fn test_substring_policy() {
        let list = substring();
        assert!(list.is_approved("x@email.ticketmaster.co.uk"));
        assert!(list.is_approved("Dice <hello@dice.fm>"));
        assert!(!list.is_approved("x@dicexfm.com"));
        assert!(!list.is_approved("ticketmaster@gmail.com"));
    }

    #[test]
    fn test_substring_matches_lookalike_domain() {
        // The pattern is applied literally: any domain containing the token passes.
        assert!(substring().is_approved("x@ticketmasterfake.evil.com"));
    }

    #[test]
    fn test_search_terms_keep_order() {
        assert_eq!(substring().search_terms(), vec!["ticketmaster", "dice.fm"]);
        assert_eq!(suffix().search_terms(), vec!["ticketmaster.com", "@axs.com"]);
    }

    #[test]
    fn test_default_vendors_compile() {
        let list = AllowList::new(Policy::Substring, DEFAULT_VENDORS).unwrap();
        assert_eq!(list.search_terms().len(), DEFAULT_VENDORS.len());
    }

    proptest! {
        #[test]
        fn unlisted_senders_rejected(local in "[a-z]{1,10}", domain in "[a-z]{3,10}") {
            let sender = format!("{local}@{domain}.example");
            let exact = AllowList::new(Policy::Exact, &["orders@vendor.com"]).unwrap();
            let suffix = AllowList::new(Policy::DomainSuffix, &["vendor.com"]).unwrap();
            let substring = AllowList::new(Policy::Substring, &["vendorx"]).unwrap();
            prop_assert!(!exact.is_approved(&sender));
            prop_assert!(!suffix.is_approved(&sender));
            prop_assert!(!substring.is_approved(&sender));
        }

        #[test]
        fn synthetic_matching_senders_accepted(local in "[a-z]{1,10}", sub in "[a-z]{1,8}") {
            let exact = AllowList::new(Policy::Exact, &["orders@vendor.com"]).unwrap();
            let suffix = AllowList::new(Policy::DomainSuffix, &["vendor.com"]).unwrap();
            let substring = AllowList::new(Policy::Substring, &["vendor"]).unwrap();
            prop_assert!(exact.is_approved("Vendor <orders@vendor.com>"));
            let suffix_sender = format!("{local}@{sub}.vendor.com");
            prop_assert!(suffix.is_approved(&suffix_sender));
            let substring_sender = format!("{local}@{sub}vendor.co.uk");
            prop_assert!(substring.is_approved(&substring_sender));
        }
    }
}
