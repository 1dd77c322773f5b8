//! Public types for the sync API
use serde::{Deserialize, Serialize};
use ticketsync_core::{Email, SessionId};

/// Longest lookback a manual sync may request.
pub const MAX_LOOKBACK_DAYS: u32 = 365;

/// Body of `POST /api/sync`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncRequestBody {
    /// Credential to sync.
    pub credential_id: i64,
    /// Overrides the lookback window.
    pub lookback_days: Option<u32>,
    /// Return the matches without a session or ingest.
    #[serde(default)]
    pub dry_run: bool,
    /// Pollable session without ingest.
    #[serde(default)]
    pub preview: bool,
}

/// `202` answer for a real or preview sync.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStarted {
    /// Session to poll.
    pub session_id: SessionId,
}

/// `200` answer for a dry run.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DryRunResult {
    /// Number of matches.
    pub total_found: usize,
    /// Matches in discovery order.
    pub emails: Vec<Email>,
}

/// Query of `GET /api/sync-status`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatusQuery {
    /// Session to read.
    pub session_id: String,
}
