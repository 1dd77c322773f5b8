use std::sync::Arc;

use anyhow::{Context, Result};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use super::routes;
use crate::api::state::{AppState, SharedState};
use crate::config::AppConfig;
use crate::jobs::{AutoSync, SweepSessions, spawn_periodic_job};
use crate::runtime::{build_orchestrator, build_verifier};

/// Builds the router with every API route under `/api`.
pub fn app(shared_state: SharedState) -> Router {
    let cors = CorsLayer::permissive();

    Router::new()
        .nest("/api", routes::router())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(shared_state)
}

/// Runs the HTTP server and the background jobs until the listener fails.
///
/// # Errors
///
/// Returns an error if the services cannot be built or the address cannot
/// be bound.
pub async fn serve(host: &str, port: u16, config: AppConfig) -> Result<()> {
    let orchestrator = build_orchestrator(&config).await?;
    let verifier = build_verifier(&config)?;
    let shared_state = Arc::new(AppState::new(orchestrator.clone(), verifier));
    let app = app(Arc::clone(&shared_state));

    let listener = tokio::net::TcpListener::bind((host, port))
        .await
        .with_context(|| format!("Failed to bind {host}:{port}"))?;

    tracing::info!("Server started. Listening on {}", listener.local_addr()?);

    // Each job runs in its own tokio task in a loop.
    spawn_periodic_job(
        orchestrator.clone(),
        AutoSync::new(config.sync_interval, config.workers),
    );
    spawn_periodic_job(
        orchestrator,
        SweepSessions::new(config.sweep_interval, config.session_retention),
    );

    axum::serve(listener, app).await?;
    Ok(())
}
