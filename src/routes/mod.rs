pub mod accounts;
pub mod actions;
pub mod summary;

use axum::Router;
use axum::routing::get;
use std::sync::Arc;

use crate::AppState;

/// Build all routes for the service
pub fn build_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/health", get(health))
        .merge(accounts::routes())
        .merge(actions::routes())
        .merge(summary::routes())
}

async fn health() -> &'static str {
    "ok"
}
