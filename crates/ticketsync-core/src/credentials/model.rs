//! Credential model types.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Unique identifier for a credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CredentialId(pub i64);

impl CredentialId {
    /// Create a new credential ID.
    #[must_use]
    pub const fn new(id: i64) -> Self {
        Self(id)
    }
}

impl fmt::Display for CredentialId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A linked mailbox, as stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    /// Database ID.
    pub id: CredentialId,
    /// User owning the mailbox.
    pub owner_id: String,
    /// IMAP host.
    pub host: String,
    /// IMAP port (993 for implicit TLS, anything else uses STARTTLS).
    pub port: u16,
    /// Login identity, usually the mailbox address.
    pub login: String,
    /// Base64 AES-256-GCM ciphertext of the secret.
    pub encrypted_secret: String,
    /// Base64 nonce used to encrypt the secret.
    pub iv: String,
    /// Whether the scheduler syncs this mailbox.
    pub auto_sync: bool,
    /// End of the last successful real sync.
    pub last_sync_at: Option<DateTime<Utc>>,
    /// End of the last successful manual sync.
    pub last_manual_sync_at: Option<DateTime<Utc>>,
    /// When the credential was stored.
    pub created_at: DateTime<Utc>,
}

/// A credential to be stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewCredential {
    /// User owning the mailbox.
    pub owner_id: String,
    /// IMAP host.
    pub host: String,
    /// IMAP port.
    pub port: u16,
    /// Login identity.
    pub login: String,
    /// Base64 ciphertext of the secret.
    pub encrypted_secret: String,
    /// Base64 nonce.
    pub iv: String,
    /// Whether the scheduler syncs this mailbox.
    pub auto_sync: bool,
}

/// Outcome recorded for a finished sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditStatus {
    /// Every found email was ingested.
    Success,
    /// Some, but not all, found emails were ingested.
    Partial,
    /// Nothing ingested out of a non-empty set, or the sync failed.
    Error,
}

impl AuditStatus {
    /// Classifies a completed sync by its totals.
    #[must_use]
    pub const fn from_totals(found: usize, ingested: usize) -> Self {
        if ingested == found {
            Self::Success
        } else if ingested > 0 {
            Self::Partial
        } else {
            Self::Error
        }
    }

    /// Storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Partial => "partial",
            Self::Error => "error",
        }
    }

    /// Parses the storage representation; unknown values map to `Error`.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s {
            "success" => Self::Success,
            "partial" => Self::Partial,
            _ => Self::Error,
        }
    }
}

/// One row of the sync audit log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditRow {
    /// Credential that was synced.
    pub credential_id: CredentialId,
    /// When the sync started.
    pub started_at: DateTime<Utc>,
    /// When the sync finished.
    pub finished_at: DateTime<Utc>,
    /// Emails found.
    pub total_found: usize,
    /// Emails accepted by the ingest endpoint.
    pub total_ingested: usize,
    /// Outcome.
    pub status: AuditStatus,
    /// Fatal error message, for failed syncs.
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_audit_status_from_totals() {
        assert_eq!(AuditStatus::from_totals(3, 3), AuditStatus::Success);
        assert_eq!(AuditStatus::from_totals(0, 0), AuditStatus::Success);
        assert_eq!(AuditStatus::from_totals(3, 2), AuditStatus::Partial);
        assert_eq!(AuditStatus::from_totals(3, 0), AuditStatus::Error);
    }

    #[test]
    fn test_audit_status_storage_names() {
        for status in [AuditStatus::Success, AuditStatus::Partial, AuditStatus::Error] {
            assert_eq!(AuditStatus::parse(status.as_str()), status);
        }
        assert_eq!(AuditStatus::parse("bogus"), AuditStatus::Error);
    }
}
