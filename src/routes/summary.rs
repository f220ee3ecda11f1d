//! Daily rollup trigger (/cron/daily-summary).
//!
//! An external scheduler calls this once a day; it aggregates yesterday's
//! request records per account, upserts the daily summary rows, and returns
//! the computed summary.

use axum::{Json, Router, extract::State, routing::post};
use chrono::{Duration, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

use crate::AppState;
use crate::services::error::ApiError;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/cron/daily-summary", post(run_daily_summary))
}

#[derive(Serialize)]
struct AccountSummaryResponse {
    account: String,
    request_count: i64,
    action_count: i64,
    success_count: i64,
    error_count: i64,
    success_rate: f64,
}

#[derive(Serialize)]
struct DailySummaryResponse {
    date: String,
    total_requests: i64,
    total_actions: i64,
    successful_actions: i64,
    failed_actions: i64,
    accounts: Vec<AccountSummaryResponse>,
}

/// POST /cron/daily-summary - Roll up yesterday's audit records
async fn run_daily_summary(
    State(state): State<Arc<AppState>>,
) -> Result<Json<DailySummaryResponse>, ApiError> {
    let day = (Utc::now() - Duration::days(1)).date_naive();

    let summaries = state
        .audit
        .summarize_day(day)
        .await
        .map_err(|e| ApiError::Internal(format!("failed to generate daily summary: {e}")))?;

    let mut response = DailySummaryResponse {
        date: day.to_string(),
        total_requests: 0,
        total_actions: 0,
        successful_actions: 0,
        failed_actions: 0,
        accounts: Vec::with_capacity(summaries.len()),
    };

    for summary in &summaries {
        state
            .audit
            .upsert_daily_summary(day, summary)
            .await
            .map_err(|e| ApiError::Internal(format!("failed to persist daily summary: {e}")))?;

        response.total_requests += summary.request_count;
        response.total_actions += summary.action_count;
        response.successful_actions += summary.success_count;
        response.failed_actions += summary.error_count;
        response.accounts.push(AccountSummaryResponse {
            account: summary.account.clone(),
            request_count: summary.request_count,
            action_count: summary.action_count,
            success_count: summary.success_count,
            error_count: summary.error_count,
            success_rate: summary.success_rate(),
        });
    }

    info!(date = %day, accounts = response.accounts.len(), "daily rollup complete");
    Ok(Json(response))
}
