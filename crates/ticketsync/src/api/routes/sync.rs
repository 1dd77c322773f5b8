//! Sync trigger and progress routes

pub mod public;
mod router;

pub use router::router;
