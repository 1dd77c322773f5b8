//! # ticketsync-mime
//!
//! Lenient MIME parsing for mail that was fetched in slices: the header
//! block comes from `BODY.PEEK[HEADER.FIELDS (...)]` and the body from a
//! length-limited `BODY.PEEK[TEXT]`, so bodies may be cut off mid-part.
//!
//! ## Features
//!
//! - **Headers**: continuation lines, case-insensitive lookup, RFC 2047 words
//! - **Content types**: `type/subtype; key=value` with quoted parameters
//! - **Transfer encodings**: Base64 and Quoted-Printable, tolerant of truncation
//! - **Multipart**: recursive boundary splitting with plain/HTML part lookup
//!
//! ## Quick Start
//!
//! ```ignore
//! use ticketsync_mime::Message;
//!
//! let raw = b"From: Tickets <orders@tickets.example>\r\n\
//!             Subject: Your order\r\n\
//!             Content-Type: text/plain\r\n\
//!             \r\n\
//!             Hello!";
//!
//! let message = Message::parse(raw);
//! assert_eq!(message.subject().as_deref(), Some("Your order"));
//! assert_eq!(message.text_part().as_deref(), Some("Hello!"));
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod address;
mod content_type;
mod error;
mod header;
mod message;

pub mod encoding;

pub use address::extract_address;
pub use content_type::ContentType;
pub use error::{Error, Result};
pub use header::Headers;
pub use message::{Message, TransferEncoding};
