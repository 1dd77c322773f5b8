//! Caller identity for the HTTP API.
//!
//! Session handling lives in an external identity provider; the service
//! only needs the caller's user id to scope credentials and sessions.

use std::time::Duration;

use async_trait::async_trait;
use axum::http::{HeaderMap, header};
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, warn};

/// Header carrying the user id behind a trusted proxy.
pub const USER_ID_HEADER: &str = "x-user-id";

/// Why a caller could not be identified.
#[derive(Debug, Error)]
pub enum AuthError {
    /// The request carried no identity.
    #[error("Missing credentials")]
    Missing,

    /// The identity was presented but rejected.
    #[error("Invalid credentials: {0}")]
    Rejected(String),

    /// The verify endpoint could not be reached or answered unexpectedly.
    #[error("Identity verification unavailable: {0}")]
    Unavailable(String),
}

/// Resolves the owner id of an API request.
#[async_trait]
pub trait OwnerVerifier: Send + Sync {
    /// Returns the caller's user id.
    async fn verify(&self, headers: &HeaderMap) -> Result<String, AuthError>;
}

/// Trusts the [`USER_ID_HEADER`] set by a fronting proxy.
#[derive(Debug, Clone, Copy, Default)]
pub struct TrustedHeader;

#[async_trait]
impl OwnerVerifier for TrustedHeader {
    async fn verify(&self, headers: &HeaderMap) -> Result<String, AuthError> {
        headers
            .get(USER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
            .ok_or(AuthError::Missing)
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct VerifyResponse {
    user_id: String,
}

/// Forwards the request's `Authorization` header to a verify endpoint.
///
/// The endpoint answers `200 {"userId": "..."}` for a valid session.
#[derive(Debug, Clone)]
pub struct RemoteVerifier {
    client: reqwest::Client,
    url: String,
}

impl RemoteVerifier {
    /// Creates a verifier calling `url`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(url: &str, timeout: Duration) -> reqwest::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.to_string(),
        })
    }
}

#[async_trait]
impl OwnerVerifier for RemoteVerifier {
    async fn verify(&self, headers: &HeaderMap) -> Result<String, AuthError> {
        let authorization = headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or(AuthError::Missing)?;

        let response = self
            .client
            .get(&self.url)
            .header(reqwest::header::AUTHORIZATION, authorization)
            .send()
            .await
            .map_err(|e| {
                warn!("Identity verification request failed: {e}");
                AuthError::Unavailable(e.to_string())
            })?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN
        {
            debug!("Verify endpoint rejected caller ({status})");
            return Err(AuthError::Rejected(format!(
                "verify endpoint returned {status}"
            )));
        }
        if !status.is_success() {
            return Err(AuthError::Unavailable(format!(
                "verify endpoint returned {status}"
            )));
        }

        let body: VerifyResponse = response
            .json()
            .await
            .map_err(|e| AuthError::Unavailable(format!("malformed verify response: {e}")))?;
        if body.user_id.trim().is_empty() {
            return Err(AuthError::Rejected("empty user id".to_string()));
        }
        Ok(body.user_id)
    }
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
    use axum::http::HeaderValue;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(*name, HeaderValue::from_static(*value));
        }
        map
    }

    #[tokio::test]
    async fn test_trusted_header() {
        let owner = TrustedHeader
            .verify(&headers(&[("x-user-id", "user-1")]))
            .await
            .unwrap();
        assert_eq!(owner, "user-1");
    }

    #[tokio::test]
    async fn test_trusted_header_missing_or_blank() {
        assert!(matches!(
            TrustedHeader.verify(&HeaderMap::new()).await,
            Err(AuthError::Missing)
        ));
        assert!(matches!(
            TrustedHeader.verify(&headers(&[("x-user-id", "  ")])).await,
            Err(AuthError::Missing)
        ));
    }

    #[tokio::test]
    async fn test_remote_forwards_authorization() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/verify")
            .match_header("authorization", "Bearer good")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"userId":"user-7","email":"a@b.com"}"#)
            .create_async()
            .await;

        let verifier =
            RemoteVerifier::new(&format!("{}/verify", server.url()), Duration::from_secs(5))
                .unwrap();
        let owner = verifier
            .verify(&headers(&[("authorization", "Bearer good")]))
            .await
            .unwrap();
        assert_eq!(owner, "user-7");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_remote_rejected() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/verify")
            .with_status(401)
            .create_async()
            .await;

        let verifier =
            RemoteVerifier::new(&format!("{}/verify", server.url()), Duration::from_secs(5))
                .unwrap();
        let result = verifier
            .verify(&headers(&[("authorization", "Bearer expired")]))
            .await;
        assert!(matches!(result, Err(AuthError::Rejected(_))));
    }

    #[tokio::test]
    async fn test_remote_server_error_is_unavailable() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/verify")
            .with_status(500)
            .create_async()
            .await;

        let verifier =
            RemoteVerifier::new(&format!("{}/verify", server.url()), Duration::from_secs(5))
                .unwrap();
        let result = verifier
            .verify(&headers(&[("authorization", "Bearer x")]))
            .await;
        assert!(matches!(result, Err(AuthError::Unavailable(_))));
    }

    #[tokio::test]
    async fn test_remote_without_authorization() {
        let verifier =
            RemoteVerifier::new("http://127.0.0.1:1/verify", Duration::from_secs(1)).unwrap();
        assert!(matches!(
            verifier.verify(&HeaderMap::new()).await,
            Err(AuthError::Missing)
        ));
    }
}
