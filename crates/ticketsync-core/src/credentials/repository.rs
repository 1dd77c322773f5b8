//! Credential and sync audit storage.

use chrono::{DateTime, Utc};
use sqlx::Row;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions, SqliteRow};
use tracing::debug;

use super::model::{AuditRow, AuditStatus, Credential, CredentialId, NewCredential};
use crate::{Error, Result};

/// Repository for linked mailboxes and their sync history.
#[derive(Debug, Clone)]
pub struct CredentialRepository {
    pool: SqlitePool,
}

impl CredentialRepository {
    /// Create a new repository with the given database path.
    ///
    /// Creates the database and tables if they don't exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the database connection fails or schema creation fails.
    pub async fn new(database_path: &str) -> Result<Self> {
        let url = format!("sqlite:{database_path}?mode=rwc");
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&url)
            .await?;

        let repo = Self { pool };
        repo.initialize().await?;
        Ok(repo)
    }

    /// Create an in-memory repository for testing.
    ///
    /// # Errors
    ///
    /// Returns an error if the database connection fails or schema creation fails.
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;

        let repo = Self { pool };
        repo.initialize().await?;
        Ok(repo)
    }

    /// Initialize database schema.
    async fn initialize(&self) -> Result<()> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS credentials (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                owner_id TEXT NOT NULL,
                host TEXT NOT NULL,
                port INTEGER NOT NULL,
                login TEXT NOT NULL,
                encrypted_secret TEXT NOT NULL,
                iv TEXT NOT NULL,
                auto_sync INTEGER NOT NULL DEFAULT 1,
                last_sync_at TEXT,
                last_manual_sync_at TEXT,
                created_at TEXT NOT NULL
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS sync_audit (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                credential_id INTEGER NOT NULL REFERENCES credentials(id) ON DELETE CASCADE,
                started_at TEXT NOT NULL,
                finished_at TEXT NOT NULL,
                total_found INTEGER NOT NULL,
                total_ingested INTEGER NOT NULL,
                status TEXT NOT NULL,
                error TEXT
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_sync_audit_credential ON sync_audit(credential_id, finished_at)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Stores a new credential.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn insert(&self, credential: &NewCredential) -> Result<Credential> {
        let created_at = Utc::now();
        let result = sqlx::query(
            r"
            INSERT INTO credentials (
                owner_id, host, port, login, encrypted_secret, iv, auto_sync, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ",
        )
        .bind(&credential.owner_id)
        .bind(&credential.host)
        .bind(i64::from(credential.port))
        .bind(&credential.login)
        .bind(&credential.encrypted_secret)
        .bind(&credential.iv)
        .bind(credential.auto_sync)
        .bind(created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        let id = CredentialId(result.last_insert_rowid());
        debug!("Stored credential {id} for {}", credential.login);

        Ok(Credential {
            id,
            owner_id: credential.owner_id.clone(),
            host: credential.host.clone(),
            port: credential.port,
            login: credential.login.clone(),
            encrypted_secret: credential.encrypted_secret.clone(),
            iv: credential.iv.clone(),
            auto_sync: credential.auto_sync,
            last_sync_at: None,
            last_manual_sync_at: None,
            created_at,
        })
    }

    /// Get credential by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails or a row is malformed.
    pub async fn get(&self, id: CredentialId) -> Result<Option<Credential>> {
        let row = sqlx::query(
            r"
            SELECT id, owner_id, host, port, login, encrypted_secret, iv, auto_sync,
                   last_sync_at, last_manual_sync_at, created_at
            FROM credentials
            WHERE id = ?
            ",
        )
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_credential).transpose()
    }

    /// Get every credential enrolled in scheduled sync.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails or a row is malformed.
    pub async fn list_auto_sync(&self) -> Result<Vec<Credential>> {
        let rows = sqlx::query(
            r"
            SELECT id, owner_id, host, port, login, encrypted_secret, iv, auto_sync,
                   last_sync_at, last_manual_sync_at, created_at
            FROM credentials
            WHERE auto_sync = 1
            ORDER BY id ASC
            ",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_credential).collect()
    }

    /// Records a successful real sync finished at `at`.
    ///
    /// Manual syncs also move the manual rate-limit timestamp.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CredentialNotFound`] if no row was updated.
    pub async fn record_sync(&self, id: CredentialId, at: DateTime<Utc>, manual: bool) -> Result<()> {
        let at = at.to_rfc3339();
        let query = if manual {
            sqlx::query("UPDATE credentials SET last_sync_at = ?, last_manual_sync_at = ? WHERE id = ?")
                .bind(at.clone())
                .bind(at)
        } else {
            sqlx::query("UPDATE credentials SET last_sync_at = ? WHERE id = ?").bind(at)
        };
        let result = query.bind(id.0).execute(&self.pool).await?;

        if result.rows_affected() == 0 {
            return Err(Error::CredentialNotFound(id.0));
        }
        Ok(())
    }

    /// Takes the manual sync slot of a credential.
    ///
    /// Moves `last_manual_sync_at` from `expected` to `at` only if no other
    /// manual sync moved it since `expected` was read. Returns `false` when
    /// the slot was already taken.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn claim_manual_sync(
        &self,
        id: CredentialId,
        expected: Option<DateTime<Utc>>,
        at: DateTime<Utc>,
    ) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE credentials SET last_manual_sync_at = ? WHERE id = ? AND last_manual_sync_at IS ?",
        )
        .bind(at.to_rfc3339())
        .bind(id.0)
        .bind(expected.map(|t| t.to_rfc3339()))
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Appends one audit row and returns its ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn append_audit(&self, row: &AuditRow) -> Result<i64> {
        let result = sqlx::query(
            r"
            INSERT INTO sync_audit (
                credential_id, started_at, finished_at, total_found, total_ingested, status, error
            ) VALUES (?, ?, ?, ?, ?, ?, ?)
            ",
        )
        .bind(row.credential_id.0)
        .bind(row.started_at.to_rfc3339())
        .bind(row.finished_at.to_rfc3339())
        .bind(i64::try_from(row.total_found).unwrap_or(i64::MAX))
        .bind(i64::try_from(row.total_ingested).unwrap_or(i64::MAX))
        .bind(row.status.as_str())
        .bind(&row.error)
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    /// Most recent audit rows for a credential, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails or a row is malformed.
    pub async fn recent_audit(&self, id: CredentialId, limit: u32) -> Result<Vec<AuditRow>> {
        let rows = sqlx::query(
            r"
            SELECT credential_id, started_at, finished_at, total_found, total_ingested, status, error
            FROM sync_audit
            WHERE credential_id = ?
            ORDER BY finished_at DESC, id DESC
            LIMIT ?
            ",
        )
        .bind(id.0)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_audit).collect()
    }
}

fn row_to_credential(row: &SqliteRow) -> Result<Credential> {
    let port: i64 = row.try_get("port")?;
    Ok(Credential {
        id: CredentialId(row.try_get("id")?),
        owner_id: row.try_get("owner_id")?,
        host: row.try_get("host")?,
        port: u16::try_from(port).map_err(|e| decode_error(Box::new(e)))?,
        login: row.try_get("login")?,
        encrypted_secret: row.try_get("encrypted_secret")?,
        iv: row.try_get("iv")?,
        auto_sync: row.try_get("auto_sync")?,
        last_sync_at: parse_optional_timestamp(row.try_get("last_sync_at")?)?,
        last_manual_sync_at: parse_optional_timestamp(row.try_get("last_manual_sync_at")?)?,
        created_at: parse_timestamp(&row.try_get::<String, _>("created_at")?)?,
    })
}

fn row_to_audit(row: &SqliteRow) -> Result<AuditRow> {
    let total_found: i64 = row.try_get("total_found")?;
    let total_ingested: i64 = row.try_get("total_ingested")?;
    let status: String = row.try_get("status")?;
    Ok(AuditRow {
        credential_id: CredentialId(row.try_get("credential_id")?),
        started_at: parse_timestamp(&row.try_get::<String, _>("started_at")?)?,
        finished_at: parse_timestamp(&row.try_get::<String, _>("finished_at")?)?,
        total_found: usize::try_from(total_found).unwrap_or_default(),
        total_ingested: usize::try_from(total_ingested).unwrap_or_default(),
        status: AuditStatus::parse(&status),
        error: row.try_get("error")?,
    })
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| decode_error(Box::new(e)))
}

fn parse_optional_timestamp(value: Option<String>) -> Result<Option<DateTime<Utc>>> {
    value.as_deref().map(parse_timestamp).transpose()
}

fn decode_error(source: Box<dyn std::error::Error + Send + Sync>) -> Error {
    Error::Database(sqlx::Error::Decode(source))
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
    use chrono::{Duration, TimeZone};

    fn new_credential(login: &str, auto_sync: bool) -> NewCredential {
        NewCredential {
            owner_id: "user-1".to_string(),
            host: "imap.example.com".to_string(),
            port: 993,
            login: login.to_string(),
            encrypted_secret: "Y2lwaGVy".to_string(),
            iv: "aXY=".to_string(),
            auto_sync,
        }
    }

    #[tokio::test]
    async fn test_insert_and_get() {
        let repo = CredentialRepository::in_memory().await.unwrap();
        let stored = repo.insert(&new_credential("me@example.com", true)).await.unwrap();

        let loaded = repo.get(stored.id).await.unwrap().unwrap();
        assert_eq!(loaded.login, "me@example.com");
        assert_eq!(loaded.port, 993);
        assert!(loaded.auto_sync);
        assert!(loaded.last_sync_at.is_none());
        assert_eq!(loaded.created_at, stored.created_at);
    }

    #[tokio::test]
    async fn test_get_missing() {
        let repo = CredentialRepository::in_memory().await.unwrap();
        assert!(repo.get(CredentialId(99)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_auto_sync() {
        let repo = CredentialRepository::in_memory().await.unwrap();
        repo.insert(&new_credential("a@example.com", true)).await.unwrap();
        repo.insert(&new_credential("b@example.com", false)).await.unwrap();
        repo.insert(&new_credential("c@example.com", true)).await.unwrap();

        let logins: Vec<String> = repo
            .list_auto_sync()
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.login)
            .collect();
        assert_eq!(logins, vec!["a@example.com", "c@example.com"]);
    }

    #[tokio::test]
    async fn test_record_sync_scheduled_and_manual() {
        let repo = CredentialRepository::in_memory().await.unwrap();
        let id = repo.insert(&new_credential("a@example.com", true)).await.unwrap().id;
        let first = Utc.with_ymd_and_hms(2024, 1, 5, 10, 0, 0).unwrap();
        let second = first + Duration::hours(2);

        repo.record_sync(id, first, false).await.unwrap();
        let loaded = repo.get(id).await.unwrap().unwrap();
        assert_eq!(loaded.last_sync_at, Some(first));
        assert!(loaded.last_manual_sync_at.is_none());

        repo.record_sync(id, second, true).await.unwrap();
        let loaded = repo.get(id).await.unwrap().unwrap();
        assert_eq!(loaded.last_sync_at, Some(second));
        assert_eq!(loaded.last_manual_sync_at, Some(second));
    }

    #[tokio::test]
    async fn test_claim_manual_sync_once() {
        let repo = CredentialRepository::in_memory().await.unwrap();
        let id = repo.insert(&new_credential("a@example.com", true)).await.unwrap().id;
        let at = Utc.with_ymd_and_hms(2024, 1, 5, 10, 0, 0).unwrap();

        assert!(repo.claim_manual_sync(id, None, at).await.unwrap());
        assert!(!repo.claim_manual_sync(id, None, at + Duration::seconds(1)).await.unwrap());
        assert_eq!(repo.get(id).await.unwrap().unwrap().last_manual_sync_at, Some(at));

        let next = at + Duration::hours(25);
        assert!(repo.claim_manual_sync(id, Some(at), next).await.unwrap());
        assert_eq!(repo.get(id).await.unwrap().unwrap().last_manual_sync_at, Some(next));
    }

    #[tokio::test]
    async fn test_record_sync_unknown_credential() {
        let repo = CredentialRepository::in_memory().await.unwrap();
        let result = repo.record_sync(CredentialId(7), Utc::now(), false).await;
        assert!(matches!(result, Err(Error::CredentialNotFound(7))));
    }

    #[tokio::test]
    async fn test_audit_log_newest_first() {
        let repo = CredentialRepository::in_memory().await.unwrap();
        let id = repo.insert(&new_credential("a@example.com", true)).await.unwrap().id;
        let start = Utc.with_ymd_and_hms(2024, 1, 5, 10, 0, 0).unwrap();

        for (hour, ingested) in [(0, 3), (1, 1)] {
            repo.append_audit(&AuditRow {
                credential_id: id,
                started_at: start + Duration::hours(hour),
                finished_at: start + Duration::hours(hour) + Duration::minutes(1),
                total_found: 3,
                total_ingested: ingested,
                status: AuditStatus::from_totals(3, ingested),
                error: None,
            })
            .await
            .unwrap();
        }

        let rows = repo.recent_audit(id, 10).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].status, AuditStatus::Partial);
        assert_eq!(rows[1].status, AuditStatus::Success);
        assert_eq!(repo.recent_audit(id, 1).await.unwrap().len(), 1);
    }
}
