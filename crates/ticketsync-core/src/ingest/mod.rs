//! Ingest forwarding.
//!
//! Each extracted email is posted as one JSON record to the ingest
//! endpoint. Outcomes are reported per record, never raised.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::Result;
use crate::extract::Email;

/// Header carrying the ingest API key.
pub const API_KEY_HEADER: &str = "X-API-Key";

/// Longest response body kept as a diagnostic.
const MAX_DIAGNOSTIC_LEN: usize = 500;

/// One normalized email, as posted to the ingest endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestRecord {
    /// Mailbox login the email was read from.
    pub recipient_email: String,
    /// Raw `From:` value.
    pub sender_email: String,
    /// Subject.
    pub subject: String,
    /// Plaintext body.
    pub body: String,
    /// RFC 3339 timestamp of the email.
    pub email_date: String,
    /// Owner of the linked mailbox.
    pub user_id: String,
}

impl IngestRecord {
    /// Builds the record for `email` read from `recipient`'s mailbox.
    #[must_use]
    pub fn new(email: &Email, recipient: &str, user_id: &str) -> Self {
        Self {
            recipient_email: recipient.to_string(),
            sender_email: email.sender.clone(),
            subject: email.subject.clone(),
            body: email.body.clone(),
            email_date: email.sent_at.to_rfc3339(),
            user_id: user_id.to_string(),
        }
    }
}

/// Result of one ingest attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
    /// 2xx response.
    Accepted,
    /// Non-2xx response.
    Rejected {
        /// HTTP status code.
        status: u16,
        /// Response body, possibly shortened.
        body: String,
    },
    /// The request never got a response.
    Failed(String),
}

impl IngestOutcome {
    /// Returns true for [`IngestOutcome::Accepted`].
    #[must_use]
    pub const fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted)
    }

    /// Diagnostic text for a failed attempt.
    #[must_use]
    pub fn error_message(&self) -> Option<String> {
        match self {
            Self::Accepted => None,
            Self::Rejected { status, body } if body.is_empty() => Some(format!("HTTP {status}")),
            Self::Rejected { status, body } => Some(format!("HTTP {status}: {body}")),
            Self::Failed(message) => Some(message.clone()),
        }
    }
}

/// Destination for extracted emails.
#[async_trait]
pub trait IngestSink: Send + Sync {
    /// Sends one record.
    async fn send(&self, record: &IngestRecord) -> IngestOutcome;
}

/// Ingest sink posting to `{base_url}/api/ingest`.
#[derive(Debug, Clone)]
pub struct HttpIngestClient {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
}

impl HttpIngestClient {
    /// Creates a client for the ingest service at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(base_url: &str, api_key: Option<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: format!("{}/api/ingest", base_url.trim_end_matches('/')),
            api_key: api_key.filter(|k| !k.is_empty()),
        })
    }

    /// Full ingest URL.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl IngestSink for HttpIngestClient {
    async fn send(&self, record: &IngestRecord) -> IngestOutcome {
        let mut request = self.client.post(&self.endpoint).json(record);
        if let Some(key) = &self.api_key {
            request = request.header(API_KEY_HEADER, key);
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => {
                warn!("Ingest request failed: {e}");
                return IngestOutcome::Failed(e.to_string());
            }
        };

        let status = response.status();
        if status.is_success() {
            debug!("Ingest accepted ({status})");
            return IngestOutcome::Accepted;
        }

        let body = response.text().await.unwrap_or_default();
        let body = crate::extract::truncate_chars(body.trim(), MAX_DIAGNOSTIC_LEN);
        warn!("Ingest rejected with {status}");
        IngestOutcome::Rejected {
            status: status.as_u16(),
            body,
        }
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
    use chrono::{TimeZone, Utc};
    use mockito::Matcher;

    fn record() -> IngestRecord {
        let email = Email {
            message_id: "<1@t.com>".to_string(),
            sender: "Tickets <orders@t.com>".to_string(),
            subject: "Order 1".to_string(),
            sent_at: Utc.with_ymd_and_hms(2024, 1, 5, 10, 0, 0).unwrap(),
            body: "Row A".to_string(),
        };
        IngestRecord::new(&email, "me@example.com", "user-1")
    }

    fn client(server: &mockito::Server, key: Option<&str>) -> HttpIngestClient {
        HttpIngestClient::new(
            &format!("{}/", server.url()),
            key.map(str::to_string),
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[test]
    fn test_record_shape() {
        let json = serde_json::to_value(record()).unwrap();
        assert_eq!(json["recipientEmail"], "me@example.com");
        assert_eq!(json["senderEmail"], "Tickets <orders@t.com>");
        assert_eq!(json["emailDate"], "2024-01-05T10:00:00+00:00");
        assert_eq!(json["userId"], "user-1");
    }

    #[tokio::test]
    async fn test_accepted_with_api_key() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/ingest")
            .match_header("x-api-key", "secret")
            .match_body(Matcher::PartialJson(serde_json::json!({
                "subject": "Order 1",
                "userId": "user-1",
            })))
            .with_status(201)
            .create_async()
            .await;

        let outcome = client(&server, Some("secret")).send(&record()).await;
        assert_eq!(outcome, IngestOutcome::Accepted);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_rejected_keeps_body() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/api/ingest")
            .with_status(422)
            .with_body("duplicate email")
            .create_async()
            .await;

        let outcome = client(&server, None).send(&record()).await;
        assert_eq!(
            outcome,
            IngestOutcome::Rejected {
                status: 422,
                body: "duplicate email".to_string()
            }
        );
        assert_eq!(
            outcome.error_message().as_deref(),
            Some("HTTP 422: duplicate email")
        );
    }

    #[tokio::test]
    async fn test_unreachable_is_failed() {
        let sink = HttpIngestClient::new("http://127.0.0.1:1", None, Duration::from_secs(2)).unwrap();
        let outcome = sink.send(&record()).await;
        assert!(matches!(outcome, IngestOutcome::Failed(_)));
        assert!(!outcome.is_accepted());
    }

    #[test]
    fn test_endpoint_trailing_slash() {
        let sink = HttpIngestClient::new("https://app.example.com/", None, Duration::from_secs(1))
            .unwrap();
        assert_eq!(sink.endpoint(), "https://app.example.com/api/ingest");
    }
}
