//! Service configuration from `TICKETSYNC_*` environment variables.

use std::env;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use ticketsync_core::allowlist::{DEFAULT_VENDORS, Policy};
use ticketsync_core::sync::{MAX_CONNECT_TIMEOUT, MIN_CONNECT_TIMEOUT};
use ticketsync_core::{AllowList, SyncSettings};
use ticketsync_imap::command::DEFAULT_TEXT_LIMIT;

const DEFAULT_INGEST_URL: &str = "http://127.0.0.1:3000";

/// How the API resolves the caller's user id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentityMode {
    /// Trust an `X-User-Id` header set by a fronting proxy.
    TrustedHeader,
    /// Forward `Authorization` to a verify endpoint.
    Remote(String),
}

/// Service configuration.
#[derive(Clone)]
pub struct AppConfig {
    /// SQLite database holding credentials and the sync audit.
    pub database_path: PathBuf,
    /// Base64 AES-256-GCM key for mailbox secrets.
    pub encryption_key: String,
    /// Base URL of the ingest service.
    pub ingest_url: String,
    /// Optional `X-API-Key` for the ingest service.
    pub ingest_api_key: Option<String>,
    /// Per-request ingest timeout.
    pub ingest_timeout: Duration,
    /// Allow-list matching policy.
    pub allow_list_policy: Policy,
    /// Allow-list entries, in search order.
    pub allow_list: Vec<String>,
    /// Bound on connect + greeting + STARTTLS + LOGIN.
    pub connect_timeout: Duration,
    /// Per-read IMAP timeout once connected.
    pub io_timeout: Duration,
    /// Bytes of `BODY[TEXT]` fetched per message.
    pub body_fetch_bytes: u32,
    /// Lookback when the credential has never synced.
    pub default_lookback_days: u32,
    /// Newest messages kept per sender.
    pub per_sender_cap: usize,
    /// Age after which sync sessions are swept.
    pub session_retention: Duration,
    /// Period of the auto-sync job.
    pub sync_interval: Duration,
    /// Period of the session sweep job.
    pub sweep_interval: Duration,
    /// Concurrent scheduled syncs.
    pub workers: usize,
    /// Caller identity resolution.
    pub identity: IdentityMode,
}

impl fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppConfig")
            .field("database_path", &self.database_path)
            .field("encryption_key", &"<redacted>")
            .field("ingest_url", &self.ingest_url)
            .field(
                "ingest_api_key",
                &self.ingest_api_key.as_ref().map(|_| "<redacted>"),
            )
            .field("allow_list_policy", &self.allow_list_policy)
            .field("allow_list", &self.allow_list)
            .field("connect_timeout", &self.connect_timeout)
            .field("workers", &self.workers)
            .field("identity", &self.identity)
            .finish_non_exhaustive()
    }
}

impl AppConfig {
    /// Loads the configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns an error if `TICKETSYNC_ENCRYPTION_KEY` is missing or any
    /// variable fails to parse.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Loads the configuration through `lookup`.
    ///
    /// # Errors
    ///
    /// Same as [`AppConfig::from_env`].
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let encryption_key = var("TICKETSYNC_ENCRYPTION_KEY")
            .ok_or_else(|| anyhow!("Missing env var TICKETSYNC_ENCRYPTION_KEY"))?;

        let database_path =
            var("TICKETSYNC_DATABASE_PATH").map_or_else(default_database_path, PathBuf::from);

        let allow_list_policy = match var("TICKETSYNC_ALLOW_LIST_POLICY") {
            Some(policy) => policy.parse::<Policy>()?,
            None => Policy::Substring,
        };
        let allow_list = var("TICKETSYNC_ALLOW_LIST").map_or_else(
            || DEFAULT_VENDORS.iter().map(|v| (*v).to_string()).collect(),
            |list| {
                list.split(',')
                    .map(str::trim)
                    .filter(|e| !e.is_empty())
                    .map(str::to_string)
                    .collect()
            },
        );

        let connect_timeout = secs(&var, "TICKETSYNC_CONNECT_TIMEOUT_SECS", 30)?
            .clamp(MIN_CONNECT_TIMEOUT, MAX_CONNECT_TIMEOUT);

        let identity =
            var("TICKETSYNC_VERIFY_URL").map_or(IdentityMode::TrustedHeader, IdentityMode::Remote);

        let workers: usize = parse(&var, "TICKETSYNC_WORKERS", 4)?;

        Ok(Self {
            database_path,
            encryption_key,
            ingest_url: var("TICKETSYNC_INGEST_URL")
                .unwrap_or_else(|| DEFAULT_INGEST_URL.to_string()),
            ingest_api_key: var("TICKETSYNC_INGEST_API_KEY"),
            ingest_timeout: secs(&var, "TICKETSYNC_INGEST_TIMEOUT_SECS", 30)?,
            allow_list_policy,
            allow_list,
            connect_timeout,
            io_timeout: secs(&var, "TICKETSYNC_IO_TIMEOUT_SECS", 60)?,
            body_fetch_bytes: parse(&var, "TICKETSYNC_BODY_FETCH_BYTES", DEFAULT_TEXT_LIMIT)?,
            default_lookback_days: parse(&var, "TICKETSYNC_LOOKBACK_DAYS", 30)?,
            per_sender_cap: parse(&var, "TICKETSYNC_PER_SENDER_CAP", 10)?,
            session_retention: secs(&var, "TICKETSYNC_SESSION_RETENTION_SECS", 3600)?,
            sync_interval: secs(&var, "TICKETSYNC_SYNC_INTERVAL_SECS", 3600)?,
            sweep_interval: secs(&var, "TICKETSYNC_SWEEP_INTERVAL_SECS", 300)?,
            workers: workers.max(1),
            identity,
        })
    }

    /// Builds the configured allow-list.
    ///
    /// # Errors
    ///
    /// Returns an error if no usable entry is configured.
    pub fn allow_list(&self) -> Result<AllowList> {
        Ok(AllowList::new(self.allow_list_policy, &self.allow_list)?)
    }

    /// Orchestrator settings derived from this configuration.
    #[must_use]
    pub fn sync_settings(&self) -> SyncSettings {
        SyncSettings {
            default_lookback_days: self.default_lookback_days,
            per_sender_cap: self.per_sender_cap,
            ..SyncSettings::default()
        }
        .with_connect_timeout(self.connect_timeout)
    }
}

fn parse<T, V>(var: &V, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
    V: Fn(&str) -> Option<String>,
{
    var(key).map_or(Ok(default), |raw| {
        raw.parse::<T>().with_context(|| format!("Invalid value for {key}: {raw:?}"))
    })
}

fn secs<V>(var: &V, key: &str, default: u64) -> Result<Duration>
where
    V: Fn(&str) -> Option<String>,
{
    parse(var, key, default).map(Duration::from_secs)
}

fn default_database_path() -> PathBuf {
    dirs::data_dir()
        .map(|dir| dir.join("ticketsync"))
        .unwrap_or_else(|| PathBuf::from("."))
        .join("ticketsync.db")
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
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<AppConfig> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        AppConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = load(&[("TICKETSYNC_ENCRYPTION_KEY", "a2V5")]).unwrap();
        assert_eq!(config.allow_list_policy, Policy::Substring);
        assert_eq!(config.allow_list.len(), DEFAULT_VENDORS.len());
        assert_eq!(config.connect_timeout, Duration::from_secs(30));
        assert_eq!(config.default_lookback_days, 30);
        assert_eq!(config.per_sender_cap, 10);
        assert_eq!(config.session_retention, Duration::from_secs(3600));
        assert_eq!(config.identity, IdentityMode::TrustedHeader);
        assert_eq!(config.ingest_url, DEFAULT_INGEST_URL);
        assert!(config.ingest_api_key.is_none());
        assert!(config.database_path.ends_with("ticketsync.db"));
    }

    #[test]
    fn test_missing_key_is_error() {
        let err = load(&[]).unwrap_err();
        assert!(err.to_string().contains("TICKETSYNC_ENCRYPTION_KEY"));
    }

    #[test]
    fn test_connect_timeout_clamped() {
        let low = load(&[
            ("TICKETSYNC_ENCRYPTION_KEY", "a2V5"),
            ("TICKETSYNC_CONNECT_TIMEOUT_SECS", "1"),
        ])
        .unwrap();
        assert_eq!(low.connect_timeout, MIN_CONNECT_TIMEOUT);

        let high = load(&[
            ("TICKETSYNC_ENCRYPTION_KEY", "a2V5"),
            ("TICKETSYNC_CONNECT_TIMEOUT_SECS", "9000"),
        ])
        .unwrap();
        assert_eq!(high.connect_timeout, MAX_CONNECT_TIMEOUT);
        assert_eq!(high.sync_settings().connect_timeout, MAX_CONNECT_TIMEOUT);
    }

    #[test]
    fn test_allow_list_override() {
        let config = load(&[
            ("TICKETSYNC_ENCRYPTION_KEY", "a2V5"),
            ("TICKETSYNC_ALLOW_LIST_POLICY", "exact"),
            ("TICKETSYNC_ALLOW_LIST", " orders@a.com, ,tickets@b.com "),
        ])
        .unwrap();
        assert_eq!(config.allow_list, vec!["orders@a.com", "tickets@b.com"]);
        let list = config.allow_list().unwrap();
        assert!(list.is_approved("A <orders@a.com>"));
        assert!(!list.is_approved("x@a.com"));
    }

    #[test]
    fn test_invalid_number_names_variable() {
        let err = load(&[
            ("TICKETSYNC_ENCRYPTION_KEY", "a2V5"),
            ("TICKETSYNC_WORKERS", "many"),
        ])
        .unwrap_err();
        assert!(err.to_string().contains("TICKETSYNC_WORKERS"));
    }

    #[test]
    fn test_verify_url_selects_remote() {
        let config = load(&[
            ("TICKETSYNC_ENCRYPTION_KEY", "a2V5"),
            ("TICKETSYNC_VERIFY_URL", "https://auth.example.com/verify"),
        ])
        .unwrap();
        assert_eq!(
            config.identity,
            IdentityMode::Remote("https://auth.example.com/verify".to_string())
        );
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let config = load(&[
            ("TICKETSYNC_ENCRYPTION_KEY", "c2VjcmV0LWtleQ=="),
            ("TICKETSYNC_INGEST_API_KEY", "ingest-secret"),
        ])
        .unwrap();
        let debug = format!("{config:?}");
        assert!(!debug.contains("c2VjcmV0LWtleQ=="));
        assert!(!debug.contains("ingest-secret"));
    }
}
