//! # ticketsync-core
//!
//! Core logic for harvesting ticket and order confirmations from a linked
//! mailbox and forwarding them to an ingest service.
//!
//! This crate provides:
//! - **Allow-list matching** of sender identities (exact, domain suffix, substring)
//! - **Message extraction** from partial IMAP fetches into bounded plaintext
//! - **Sync sessions**: ephemeral, pollable progress records
//! - **Ingest forwarding** over HTTP with per-email outcomes
//! - **Progressive sync orchestration** in preview, dry-run and real modes
//! - **Credential ledger** (`SQLite`) with AES-256-GCM protected secrets

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod allowlist;
pub mod credentials;
mod error;
pub mod extract;
pub mod ingest;
pub mod session;
pub mod source;
pub mod sync;

pub use allowlist::AllowList;
pub use credentials::{
    AuditRow, AuditStatus, Credential, CredentialId, CredentialRepository, NewCredential,
    SecretCipher,
};
pub use error::{Error, Result};
pub use extract::{Email, extract};
pub use ingest::{HttpIngestClient, IngestOutcome, IngestRecord, IngestSink};
pub use session::{
    ConnectionState, EmailProgress, IngestStatus, MemorySessionStore, SessionId, SessionStore,
    SessionUpdate, SyncSession, SyncStatus,
};
pub use source::{ImapMailSource, MailSource, Mailbox, PendingLogin};
pub use sync::{
    Orchestrator, PreparedSync, SyncError, SyncEvent, SyncMode, SyncRequest, SyncSettings,
    Trigger,
};
