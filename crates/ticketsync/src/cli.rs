//! Command line interface.

use anyhow::{Context, Result, bail};
use chrono::Utc;
use clap::{Parser, Subcommand};
use ticketsync_core::{
    CredentialId, NewCredential, SecretCipher, SyncMode, SyncRequest, Trigger,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::api;
use crate::config::AppConfig;
use crate::jobs::AutoSync;
use crate::runtime::{build_orchestrator, open_credentials};

#[derive(Subcommand)]
enum Command {
    /// Run the API server and background jobs
    Serve {
        /// Set the server host address
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// Set the server port
        #[arg(long, default_value = "2222")]
        port: u16,
    },
    /// Sync one credential, or every auto-sync credential, and exit
    SyncOnce {
        /// Credential to sync; all auto-sync credentials when omitted
        #[arg(long)]
        credential: Option<i64>,

        /// Print matches without ingesting or recording the sync
        #[arg(long, action, default_value = "false")]
        dry_run: bool,

        /// Override the lookback window in days
        #[arg(long)]
        lookback_days: Option<u32>,
    },
    /// Store a mailbox credential with its secret encrypted
    AddCredential {
        /// User id owning the mailbox
        #[arg(long)]
        owner: String,

        /// IMAP host
        #[arg(long)]
        host: String,

        /// IMAP port; 993 for implicit TLS, anything else uses STARTTLS
        #[arg(long, default_value = "993")]
        port: u16,

        /// Login identity
        #[arg(long)]
        login: String,

        /// Mailbox secret (app password)
        #[arg(long, env = "TICKETSYNC_MAILBOX_SECRET", hide_env_values = true)]
        secret: String,

        /// Leave the mailbox out of scheduled syncs
        #[arg(long, action, default_value = "false")]
        no_auto_sync: bool,
    },
    /// Show recent sync audit rows for a credential
    Audit {
        /// Credential to inspect
        #[arg(long)]
        credential: i64,

        /// Number of rows
        #[arg(long, default_value = "10")]
        limit: u32,
    },
}

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

/// Parses the command line and runs the selected command.
///
/// # Errors
///
/// Returns any configuration, database or sync error of the command.
pub async fn run() -> Result<()> {
    let cli = Cli::parse();
    init_tracing();
    let config = AppConfig::from_env()?;

    match cli.command {
        Command::Serve { host, port } => api::serve(&host, port, config).await,
        Command::SyncOnce {
            credential,
            dry_run,
            lookback_days,
        } => sync_once(&config, credential, dry_run, lookback_days).await,
        Command::AddCredential {
            owner,
            host,
            port,
            login,
            secret,
            no_auto_sync,
        } => {
            let cipher = SecretCipher::from_base64_key(&config.encryption_key)?;
            let (encrypted_secret, iv) = cipher.encrypt(&secret)?;
            drop(secret);
            let repository = open_credentials(&config).await?;
            let credential = repository
                .insert(&NewCredential {
                    owner_id: owner,
                    host,
                    port,
                    login,
                    encrypted_secret,
                    iv,
                    auto_sync: !no_auto_sync,
                })
                .await?;
            println!("{}", credential.id);
            Ok(())
        }
        Command::Audit { credential, limit } => {
            let repository = open_credentials(&config).await?;
            let rows = repository
                .recent_audit(CredentialId::new(credential), limit)
                .await?;
            println!("{}", serde_json::to_string_pretty(&rows)?);
            Ok(())
        }
    }
}

async fn sync_once(
    config: &AppConfig,
    credential: Option<i64>,
    dry_run: bool,
    lookback_days: Option<u32>,
) -> Result<()> {
    let orchestrator = build_orchestrator(config).await?;

    let Some(id) = credential else {
        if dry_run || lookback_days.is_some() {
            bail!("--dry-run and --lookback-days need --credential");
        }
        let report = AutoSync::new(config.sync_interval, config.workers)
            .sync_all(&orchestrator)
            .await?;
        println!(
            "{} completed, {} failed, {} skipped",
            report.completed, report.failed, report.skipped
        );
        return Ok(());
    };

    let credential = orchestrator
        .credentials()
        .get(CredentialId::new(id))
        .await?
        .with_context(|| format!("Credential {id} not found"))?;

    // Operator runs are not subject to the manual cool-down.
    let request = SyncRequest {
        lookback_days,
        mode: if dry_run { SyncMode::DryRun } else { SyncMode::Real },
        trigger: Trigger::Scheduled,
    };
    let prepared = orchestrator
        .prepare(&credential, request, Utc::now())
        .await?;

    if dry_run {
        let emails = orchestrator.run_dry(prepared).await?;
        println!("{}", serde_json::to_string_pretty(&emails)?);
    } else {
        let session = orchestrator.run(prepared).await?;
        println!("{}", serde_json::to_string_pretty(&session)?);
    }
    Ok(())
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "ticketsync=info,ticketsync_core=info,ticketsync_imap=info,tower_http=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
