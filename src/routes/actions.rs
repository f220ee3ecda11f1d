//! Batch submission endpoints (/reply, /like, /retweet).
//!
//! Each endpoint takes the multipart form, validates and de-duplicates the
//! URL list, resolves the account credential, uploads any reply media, then
//! hands the job to the runner and streams its results back as one JSON
//! object per line. Pre-flight failures return a JSON error before any
//! result is produced.

use axum::{
    Router,
    body::Body,
    extract::{DefaultBodyLimit, Multipart, State},
    http::{HeaderMap, header},
    response::{IntoResponse, Response},
    routing::post,
};
use bytes::Bytes;
use std::convert::Infallible;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::info;

use crate::AppState;
use crate::constants::{MAX_FORM_BODY_SIZE, MAX_MEDIA_ATTACHMENTS, MAX_MEDIA_UPLOAD_SIZE};
use crate::runner::{self, ActionKind, ActionResult, BatchJob, MediaAttachment};
use crate::services::audit::ClientInfo;
use crate::services::error::ApiError;
use crate::validate;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/reply", post(reply_batch))
        .route("/like", post(like_batch))
        .route("/retweet", post(retweet_batch))
        .layer(DefaultBodyLimit::max(MAX_FORM_BODY_SIZE))
}

async fn reply_batch(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    multipart: Multipart,
) -> Result<Response, ApiError> {
    submit_batch(state, headers, multipart, ActionKind::Reply).await
}

async fn like_batch(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    multipart: Multipart,
) -> Result<Response, ApiError> {
    submit_batch(state, headers, multipart, ActionKind::Like).await
}

async fn retweet_batch(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    multipart: Multipart,
) -> Result<Response, ApiError> {
    submit_batch(state, headers, multipart, ActionKind::Retweet).await
}

#[derive(Default)]
struct SubmittedForm {
    tweet_urls: String,
    reply_message: String,
    selected_account: String,
    media: Vec<MediaAttachment>,
}

async fn parse_form(mut multipart: Multipart) -> Result<SubmittedForm, ApiError> {
    let mut form = SubmittedForm::default();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::Internal(format!("failed to parse form: {e}")))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "tweet_urls" => form.tweet_urls = read_text(field).await?,
            "reply_message" => form.reply_message = read_text(field).await?,
            "selected_account" => form.selected_account = read_text(field).await?,
            "media" => {
                if form.media.len() >= MAX_MEDIA_ATTACHMENTS {
                    return Err(ApiError::BadRequest(format!(
                        "at most {MAX_MEDIA_ATTACHMENTS} media attachments are allowed"
                    )));
                }
                let content_type = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::Internal(format!("failed to read attachment: {e}")))?;
                if data.len() > MAX_MEDIA_UPLOAD_SIZE {
                    return Err(ApiError::BadRequest(format!(
                        "media attachments are limited to {} bytes",
                        MAX_MEDIA_UPLOAD_SIZE
                    )));
                }
                // Browsers submit an empty part when no file is picked.
                if !data.is_empty() {
                    form.media.push(MediaAttachment { data, content_type });
                }
            }
            _ => {}
        }
    }
    Ok(form)
}

async fn read_text(field: axum::extract::multipart::Field<'_>) -> Result<String, ApiError> {
    Ok(field
        .text()
        .await
        .map_err(|e| ApiError::Internal(format!("failed to parse form: {e}")))?
        .trim()
        .to_string())
}

async fn submit_batch(
    state: Arc<AppState>,
    headers: HeaderMap,
    multipart: Multipart,
    kind: ActionKind,
) -> Result<Response, ApiError> {
    let form = parse_form(multipart).await?;

    let outcome = validate::validate_tweet_urls(&form.tweet_urls);
    if !outcome.errors.is_empty() {
        return Err(ApiError::Validation(outcome.errors));
    }
    if outcome.urls.is_empty() {
        return Err(ApiError::BadRequest("no valid URLs".to_string()));
    }

    if form.selected_account.is_empty() {
        return Err(ApiError::BadRequest("selected_account is required".to_string()));
    }
    if kind == ActionKind::Reply && form.reply_message.is_empty() {
        return Err(ApiError::BadRequest("reply_message is required".to_string()));
    }

    let cred = state
        .accounts
        .resolve(&form.selected_account)
        .ok_or_else(|| ApiError::Internal(format!("unknown account: {}", form.selected_account)))?
        .clone();

    // Media upload is all-or-nothing and happens before streaming begins, so
    // a failure here is a single top-level error with no partial results.
    let media_ids = if kind == ActionKind::Reply && !form.media.is_empty() {
        runner::upload_batch_media(&state.twitter, &cred, &form.media)
            .await
            .map_err(|e| ApiError::Internal(format!("media upload failed: {e}")))?
    } else {
        Vec::new()
    };

    let job = BatchJob {
        kind,
        urls: outcome.urls,
        message: (kind == ActionKind::Reply).then(|| form.reply_message.clone()),
        media_ids,
        client_info: ClientInfo {
            user_agent: header_value(&headers, "user-agent"),
            ip_address: header_value(&headers, "x-forwarded-for"),
        },
    };

    info!(action = %kind, account = %cred.id, urls = job.urls.len(), media = form.media.len(), "starting batch");

    let (tx, rx) = mpsc::channel::<ActionResult>(16);
    let twitter = state.twitter.clone();
    let audit = state.audit.clone();
    let policy = state.policy.clone();
    tokio::spawn(async move {
        runner::run_batch(&twitter, &audit, &cred, job, &policy, tx).await;
    });

    Ok(ndjson_response(rx))
}

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

/// Turn the runner's result channel into a chunked JSON-lines body; the
/// response stays open until the runner drops its sender.
fn ndjson_response(rx: mpsc::Receiver<ActionResult>) -> Response {
    let stream = futures::stream::unfold(rx, |mut rx| async move {
        let result = rx.recv().await?;
        let mut line = serde_json::to_vec(&result).unwrap();
        line.push(b'\n');
        Some((Ok::<Bytes, Infallible>(Bytes::from(line)), rx))
    });

    (
        [(header::CONTENT_TYPE, "application/json")],
        Body::from_stream(stream),
    )
        .into_response()
}
