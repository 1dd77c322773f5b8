use std::sync::Arc;

use ticketsync_core::Orchestrator;

use crate::auth::OwnerVerifier;

/// State shared by every handler.
pub type SharedState = Arc<AppState>;

/// Services the handlers need.
pub struct AppState {
    /// Sync orchestrator, which also owns the session store and ledger.
    pub orchestrator: Orchestrator,
    /// Resolves the caller's user id.
    pub verifier: Arc<dyn OwnerVerifier>,
}

impl AppState {
    /// Creates the handler state.
    #[must_use]
    pub fn new(orchestrator: Orchestrator, verifier: Arc<dyn OwnerVerifier>) -> Self {
        Self {
            orchestrator,
            verifier,
        }
    }
}
