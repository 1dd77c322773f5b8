//! API routes module

pub mod sync;

use axum::Router;

use crate::api::state::SharedState;

/// Create the combined API router
pub fn router() -> Router<SharedState> {
    Router::new().merge(sync::router())
}
