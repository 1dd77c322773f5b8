//! Sync sessions.
//!
//! A session is the pollable, process-local record of one sync run. It is
//! written only by the orchestrator that created it and read by pollers.

mod model;
mod store;

pub use model::{
    ConnectionState, EmailProgress, IngestStatus, SessionId, SessionUpdate, SyncSession,
    SyncStatus,
};
pub use store::{MemorySessionStore, SessionStore};
