#![allow(clippy::unwrap_used, missing_docs)]

mod test_utils;

use std::time::Duration;

use axum::http::StatusCode;
use serde_json::json;
use ticketsync_core::CredentialId;

use test_utils::{
    FixedSource, OWNER, body_to_json, get_status, post_sync, test_app, wait_for_terminal,
};

#[tokio::test]
async fn test_sync_runs_and_is_pollable() {
    let test = test_app(FixedSource::with_orders(2)).await;

    let response = post_sync(
        &test.app,
        Some(OWNER),
        json!({ "credentialId": test.credential_id }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let body = body_to_json(response.into_body()).await;
    let session_id = body["sessionId"].as_str().unwrap().to_string();

    let session = wait_for_terminal(&test.app, OWNER, &session_id).await;
    assert_eq!(session["status"], "completed");
    assert_eq!(session["totalFound"], 2);
    assert_eq!(session["totalIngested"], 2);
    assert_eq!(session["connectionState"], "connected");
    assert_eq!(session["emails"][0]["ingestStatus"], "success");
    assert_eq!(session["emails"].as_array().unwrap().len(), 2);

    assert_eq!(test.ingest.count(), 2);
    let record = test.ingest.received.lock().unwrap()[0].clone();
    assert_eq!(record.user_id, OWNER);
    assert_eq!(record.recipient_email, "user-1@example.com");

    let credential = test
        .orchestrator
        .credentials()
        .get(CredentialId::new(test.credential_id))
        .await
        .unwrap()
        .unwrap();
    assert!(credential.last_sync_at.is_some());
    assert!(credential.last_manual_sync_at.is_some());
}

#[tokio::test]
async fn test_dry_run_returns_emails_without_side_effects() {
    let test = test_app(FixedSource::with_orders(3)).await;

    let response = post_sync(
        &test.app,
        Some(OWNER),
        json!({ "credentialId": test.credential_id, "dryRun": true, "lookbackDays": 7 }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_to_json(response.into_body()).await;
    assert_eq!(body["totalFound"], 3);
    let subjects: Vec<&str> = body["emails"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["subject"].as_str().unwrap())
        .collect();
    assert!(subjects.contains(&"Order 3"));
    assert_eq!(body["emails"][0]["sender"], "Vendor A <orders@vendor-a.com>");

    assert_eq!(test.ingest.count(), 0);
    let credential = test
        .orchestrator
        .credentials()
        .get(CredentialId::new(test.credential_id))
        .await
        .unwrap()
        .unwrap();
    assert!(credential.last_sync_at.is_none());
    assert!(credential.last_manual_sync_at.is_none());
}

#[tokio::test]
async fn test_preview_session_skips_ingest() {
    let test = test_app(FixedSource::with_orders(1)).await;

    let response = post_sync(
        &test.app,
        Some(OWNER),
        json!({ "credentialId": test.credential_id, "preview": true }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let body = body_to_json(response.into_body()).await;
    let session = wait_for_terminal(&test.app, OWNER, body["sessionId"].as_str().unwrap()).await;

    assert_eq!(session["status"], "completed");
    assert_eq!(session["totalFound"], 1);
    assert_eq!(session["totalIngested"], 0);
    assert_eq!(session["emails"][0]["ingestStatus"], "pending");
    assert_eq!(test.ingest.count(), 0);
}

#[tokio::test]
async fn test_second_manual_sync_is_rate_limited() {
    let test = test_app(FixedSource::with_orders(1)).await;
    let request = json!({ "credentialId": test.credential_id });

    let first = post_sync(&test.app, Some(OWNER), request.clone()).await;
    assert_eq!(first.status(), StatusCode::ACCEPTED);
    let body = body_to_json(first.into_body()).await;
    wait_for_terminal(&test.app, OWNER, body["sessionId"].as_str().unwrap()).await;

    let second = post_sync(&test.app, Some(OWNER), request).await;
    assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
    let body = body_to_json(second.into_body()).await;
    assert!(body["error"].as_str().is_some());

    let credential = test
        .orchestrator
        .credentials()
        .get(CredentialId::new(test.credential_id))
        .await
        .unwrap()
        .unwrap();
    let retry_after: chrono::DateTime<chrono::Utc> =
        body["retryAfter"].as_str().unwrap().parse().unwrap();
    let expected = credential.last_manual_sync_at.unwrap() + chrono::Duration::hours(24);
    assert_eq!(retry_after.timestamp(), expected.timestamp());
}

#[tokio::test]
async fn test_concurrent_manual_sync_is_rate_limited() {
    let source = FixedSource::with_orders(2).slow(Duration::from_millis(300));
    let test = test_app(source).await;
    let request = json!({ "credentialId": test.credential_id });

    let first = post_sync(&test.app, Some(OWNER), request.clone()).await;
    assert_eq!(first.status(), StatusCode::ACCEPTED);
    let second = post_sync(&test.app, Some(OWNER), request).await;
    assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);

    let body = body_to_json(first.into_body()).await;
    let session = wait_for_terminal(&test.app, OWNER, body["sessionId"].as_str().unwrap()).await;
    assert_eq!(session["status"], "completed");
    assert_eq!(test.ingest.count(), 2);
}

#[tokio::test]
async fn test_dry_run_is_not_rate_limited() {
    let test = test_app(FixedSource::with_orders(1)).await;

    let first = post_sync(
        &test.app,
        Some(OWNER),
        json!({ "credentialId": test.credential_id }),
    )
    .await;
    let body = body_to_json(first.into_body()).await;
    wait_for_terminal(&test.app, OWNER, body["sessionId"].as_str().unwrap()).await;

    let dry = post_sync(
        &test.app,
        Some(OWNER),
        json!({ "credentialId": test.credential_id, "dryRun": true }),
    )
    .await;
    assert_eq!(dry.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_missing_identity_is_unauthorized() {
    let test = test_app(FixedSource::with_orders(1)).await;
    let response = post_sync(&test.app, None, json!({ "credentialId": test.credential_id })).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_foreign_or_unknown_credential_is_not_found() {
    let test = test_app(FixedSource::with_orders(1)).await;

    let foreign = post_sync(
        &test.app,
        Some("user-2"),
        json!({ "credentialId": test.credential_id }),
    )
    .await;
    assert_eq!(foreign.status(), StatusCode::NOT_FOUND);

    let unknown = post_sync(&test.app, Some(OWNER), json!({ "credentialId": 9999 })).await;
    assert_eq!(unknown.status(), StatusCode::NOT_FOUND);
    assert_eq!(test.ingest.count(), 0);
}

#[tokio::test]
async fn test_invalid_request_bodies() {
    let test = test_app(FixedSource::with_orders(1)).await;

    let missing = post_sync(&test.app, Some(OWNER), json!({ "dryRun": true })).await;
    assert_eq!(missing.status(), StatusCode::BAD_REQUEST);
    let body = body_to_json(missing.into_body()).await;
    assert!(body["error"].as_str().unwrap().contains("credentialId"));

    let zero_days = post_sync(
        &test.app,
        Some(OWNER),
        json!({ "credentialId": test.credential_id, "lookbackDays": 0 }),
    )
    .await;
    assert_eq!(zero_days.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_status_is_owner_scoped() {
    let test = test_app(FixedSource::with_orders(1)).await;

    let response = post_sync(
        &test.app,
        Some(OWNER),
        json!({ "credentialId": test.credential_id, "preview": true }),
    )
    .await;
    let body = body_to_json(response.into_body()).await;
    let session_id = body["sessionId"].as_str().unwrap();

    let foreign = get_status(&test.app, "user-2", session_id).await;
    assert_eq!(foreign.status(), StatusCode::FORBIDDEN);

    let own = get_status(&test.app, OWNER, session_id).await;
    assert_eq!(own.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_status_unknown_or_malformed_session() {
    let test = test_app(FixedSource::with_orders(1)).await;

    let unknown = get_status(&test.app, OWNER, "6f1d2b7e-9a55-4c1e-8a5d-2f0b8c3e1a77").await;
    assert_eq!(unknown.status(), StatusCode::NOT_FOUND);

    let malformed = get_status(&test.app, OWNER, "not-a-session").await;
    assert_eq!(malformed.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_connection_failure_marks_session_failed() {
    let test = test_app(FixedSource::unreachable()).await;

    let response = post_sync(
        &test.app,
        Some(OWNER),
        json!({ "credentialId": test.credential_id }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let body = body_to_json(response.into_body()).await;
    let session = wait_for_terminal(&test.app, OWNER, body["sessionId"].as_str().unwrap()).await;

    assert_eq!(session["status"], "failed");
    assert_eq!(session["connectionState"], "error");
    assert!(
        session["connectionError"]
            .as_str()
            .unwrap()
            .contains("connection refused")
    );
    assert_eq!(test.ingest.count(), 0);
}

#[tokio::test]
async fn test_dry_run_connection_failure_is_bad_gateway() {
    let test = test_app(FixedSource::unreachable()).await;

    let response = post_sync(
        &test.app,
        Some(OWNER),
        json!({ "credentialId": test.credential_id, "dryRun": true }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
}
