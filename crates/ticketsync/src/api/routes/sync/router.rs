//! Router for the sync API

use axum::Router;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use chrono::Utc;
use ticketsync_core::{CredentialId, Error, SessionId, SyncMode, SyncRequest, SyncSession};

use super::public;
use crate::api::public::ApiError;
use crate::api::state::SharedState;

async fn sync_handler(
    State(state): State<SharedState>,
    headers: HeaderMap,
    payload: Result<Json<public::SyncRequestBody>, JsonRejection>,
) -> Result<Response, ApiError> {
    let owner = state.verifier.verify(&headers).await?;
    let Json(body) = payload.map_err(|e| ApiError::BadRequest(e.body_text()))?;

    if let Some(days) = body.lookback_days
        && !(1..=public::MAX_LOOKBACK_DAYS).contains(&days)
    {
        return Err(ApiError::BadRequest(format!(
            "lookbackDays must be between 1 and {}",
            public::MAX_LOOKBACK_DAYS
        )));
    }

    let orchestrator = &state.orchestrator;
    // Foreign credentials look the same as unknown ones.
    let credential = orchestrator
        .credentials()
        .get(CredentialId::new(body.credential_id))
        .await?
        .filter(|c| c.owner_id == owner)
        .ok_or(Error::CredentialNotFound(body.credential_id))?;

    let mode = if body.dry_run {
        SyncMode::DryRun
    } else if body.preview {
        SyncMode::Preview
    } else {
        SyncMode::Real
    };
    let prepared = orchestrator
        .prepare(
            &credential,
            SyncRequest::manual(mode, body.lookback_days),
            Utc::now(),
        )
        .await?;

    if mode == SyncMode::DryRun {
        let emails = orchestrator.run_dry(prepared).await?;
        let result = public::DryRunResult {
            total_found: emails.len(),
            emails,
        };
        return Ok((StatusCode::OK, Json(result)).into_response());
    }

    let session_id = orchestrator.start(prepared).await;
    tracing::info!(
        "Sync session {session_id} started for credential {}",
        credential.id
    );
    Ok((StatusCode::ACCEPTED, Json(public::SyncStarted { session_id })).into_response())
}

async fn sync_status_handler(
    State(state): State<SharedState>,
    headers: HeaderMap,
    query: Result<Query<public::SyncStatusQuery>, QueryRejection>,
) -> Result<Json<SyncSession>, ApiError> {
    let owner = state.verifier.verify(&headers).await?;
    let Query(params) = query.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let session_id: SessionId = params
        .session_id
        .parse()
        .map_err(|_| ApiError::BadRequest(format!("Invalid sessionId: {}", params.session_id)))?;

    let session = state
        .orchestrator
        .sessions()
        .get_for_owner(session_id, &owner)
        .await?;
    Ok(Json(session))
}

/// Create the sync router
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/sync", post(sync_handler))
        .route("/sync-status", get(sync_status_handler))
}
