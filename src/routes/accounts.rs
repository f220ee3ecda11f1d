//! Account selector data for the submission form.

use axum::{Json, Router, extract::State, routing::get};
use serde::Serialize;
use std::sync::Arc;

use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/accounts", get(list_accounts))
}

#[derive(Serialize)]
struct AccountInfo {
    id: String,
    handle: String,
}

/// GET /accounts - Configured account ids and display handles
async fn list_accounts(State(state): State<Arc<AppState>>) -> Json<Vec<AccountInfo>> {
    let mut accounts: Vec<AccountInfo> = state
        .accounts
        .iter()
        .map(|cred| AccountInfo {
            id: cred.id.clone(),
            handle: cred.handle.clone(),
        })
        .collect();
    accounts.sort_by(|a, b| a.id.cmp(&b.id));
    Json(accounts)
}
