//! # ticketsync
//!
//! Service wrapper around [`ticketsync_core`]: the HTTP API used by the
//! web client to start and poll syncs, the in-process scheduler for
//! auto-sync mailboxes, and the operator CLI.
//!
//! Configuration is read from `TICKETSYNC_*` environment variables, see
//! [`config::AppConfig`].

pub mod api;
pub mod auth;
pub mod cli;
pub mod config;
pub mod jobs;
pub mod runtime;

pub use config::AppConfig;
