//! # ticketsync-imap
//!
//! A small async IMAP client covering exactly what a read-only mail
//! harvester needs: connect (implicit TLS or STARTTLS), LOGIN, SELECT,
//! UID SEARCH, UID FETCH and LOGOUT.
//!
//! ## Quick Start
//!
//! ```ignore
//! use chrono::NaiveDate;
//! use ticketsync_imap::{Config, SearchCriteria, connection};
//!
//! #[tokio::main]
//! async fn main() -> ticketsync_imap::Result<()> {
//!     let config = Config::new("imap.example.com", 993);
//!     let client = connection::connect(&config).await?;
//!     let client = client.login("user@example.com", "password").await?;
//!     let (mut client, info) = client.select("INBOX").await?;
//!     println!("{} messages", info.exists);
//!
//!     let since = NaiveDate::from_ymd_opt(2024, 1, 5).unwrap();
//!     let uids = client
//!         .uid_search(&SearchCriteria::from_since("orders@example.com", since))
//!         .await?;
//!     let messages = client.uid_fetch(&uids, &ticketsync_imap::FetchRequest::default()).await?;
//!     println!("fetched {}", messages.len());
//!
//!     client.logout().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Connection States
//!
//! The client uses the type-state pattern so that only commands valid in
//! the current IMAP state can be issued:
//!
//! ```text
//! NotAuthenticated ── login() ──→ Authenticated ── select() ──→ Selected
//! ```
//!
//! Every command goes through one read loop that consumes untagged lines
//! (and their literals) up to the tagged completion for that command's tag.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod command;
pub mod connection;
pub mod date;
mod error;
pub mod parser;
pub mod types;

pub use command::{Command, FetchRequest, SearchCriteria, TagGenerator};
pub use connection::{
    Authenticated, Client, Config, FramedStream, ImapStream, NotAuthenticated, Security, Selected,
};
pub use date::format_imap_date;
pub use error::{Error, Result};
pub use parser::{FetchData, Response, Untagged};
pub use types::{MailboxInfo, RawMessage, Status, Uid};
