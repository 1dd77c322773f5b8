//! Wiring of the core services from an [`AppConfig`].

use std::sync::Arc;

use anyhow::{Context, Result};
use ticketsync_core::{
    CredentialRepository, HttpIngestClient, ImapMailSource, MemorySessionStore, Orchestrator,
    SecretCipher,
};
use tracing::info;

use crate::auth::{OwnerVerifier, RemoteVerifier, TrustedHeader};
use crate::config::{AppConfig, IdentityMode};

/// Opens the credential database, creating it if needed.
///
/// # Errors
///
/// Returns an error if the database directory or schema cannot be created.
pub async fn open_credentials(config: &AppConfig) -> Result<CredentialRepository> {
    if let Some(parent) = config.database_path.parent()
        && !parent.as_os_str().is_empty()
    {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }

    let path = config.database_path.to_string_lossy();
    let repository = CredentialRepository::new(&path)
        .await
        .with_context(|| format!("Failed to open database {path}"))?;
    info!("Credential database ready at {path}");
    Ok(repository)
}

/// Builds the orchestrator with the IMAP source, in-memory session store
/// and HTTP ingest client.
///
/// # Errors
///
/// Returns an error if the key, allow-list or database is unusable.
pub async fn build_orchestrator(config: &AppConfig) -> Result<Orchestrator> {
    let cipher = SecretCipher::from_base64_key(&config.encryption_key)
        .context("TICKETSYNC_ENCRYPTION_KEY is not a base64 32-byte key")?;
    let allow_list = config.allow_list()?;
    info!(
        "Allow-list: {} policy, {} entries",
        allow_list.policy(),
        config.allow_list.len()
    );

    let ingest = HttpIngestClient::new(
        &config.ingest_url,
        config.ingest_api_key.clone(),
        config.ingest_timeout,
    )?;
    info!("Forwarding to {}", ingest.endpoint());

    let credentials = open_credentials(config).await?;

    Ok(Orchestrator::new(
        Arc::new(ImapMailSource::new(config.io_timeout, config.body_fetch_bytes)),
        Arc::new(MemorySessionStore::new()),
        Arc::new(ingest),
        Arc::new(allow_list),
        credentials,
        cipher,
        config.sync_settings(),
    ))
}

/// Builds the configured identity verifier.
///
/// # Errors
///
/// Returns an error if the HTTP client for a remote verifier cannot be
/// built.
pub fn build_verifier(config: &AppConfig) -> Result<Arc<dyn OwnerVerifier>> {
    Ok(match &config.identity {
        IdentityMode::TrustedHeader => Arc::new(TrustedHeader),
        IdentityMode::Remote(url) => Arc::new(RemoteVerifier::new(url, config.ingest_timeout)?),
    })
}
