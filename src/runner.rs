//! Batch action runner.
//!
//! Executes one validated submission to completion: uploads any reply media
//! up front (all-or-nothing), then walks the URL list strictly in order,
//! invoking the API adapter with bounded retry on transient failures and
//! emitting one [`ActionResult`] per URL on the output channel as soon as it
//! is known. Audit writes never abort the loop; a closed channel (the caller
//! went away) stops it before the next URL.

use std::fmt;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::accounts::Credential;
use crate::services::audit::{AuditStore, ClientInfo};
use crate::services::twitter::{PostActions, TwitterError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionKind {
    Reply,
    Like,
    Retweet,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::Reply => "reply",
            ActionKind::Like => "like",
            ActionKind::Retweet => "retweet",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Retry and pacing policy, loaded from configuration.
#[derive(Debug, Clone)]
pub struct RunnerPolicy {
    /// Total attempts per URL, including the first (>= 1).
    pub max_attempts: u32,
    /// Backoff before retry N is `backoff_base * N`.
    pub backoff_base: Duration,
    /// Pause between consecutive URLs, independent of retries.
    pub inter_request_delay: Duration,
}

/// One uploaded form attachment, not yet pushed to the API.
#[derive(Debug, Clone)]
pub struct MediaAttachment {
    pub data: bytes::Bytes,
    pub content_type: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionStatus {
    Success,
    Error,
}

impl ActionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionStatus::Success => "success",
            ActionStatus::Error => "error",
        }
    }
}

/// Per-URL outcome, emitted in validated input order and serialized as one
/// NDJSON line on the response stream.
#[derive(Debug, Clone, Serialize)]
pub struct ActionResult {
    pub url: String,
    pub status: ActionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ActionResult {
    fn success(url: String, result_id: Option<String>) -> Self {
        Self {
            url,
            status: ActionStatus::Success,
            result_id,
            message: None,
        }
    }

    fn error(url: String, message: String) -> Self {
        Self {
            url,
            status: ActionStatus::Error,
            result_id: None,
            message: Some(message),
        }
    }
}

/// One validated, ready-to-run submission.
#[derive(Debug, Clone)]
pub struct BatchJob {
    pub kind: ActionKind,
    /// Unique, pattern-valid URLs in encounter order.
    pub urls: Vec<String>,
    /// Reply text; `None` for like and retweet.
    pub message: Option<String>,
    /// Media ids already uploaded via [`upload_batch_media`].
    pub media_ids: Vec<String>,
    pub client_info: ClientInfo,
}

/// The numeric post id is the last path segment, query string stripped.
pub fn extract_tweet_id(url: &str) -> &str {
    let tail = url.rsplit('/').next().unwrap_or(url);
    tail.split('?').next().unwrap_or(tail)
}

/// Upload reply attachments before any URL is processed. All-or-nothing: the
/// first failure aborts the whole batch with a single top-level error, before
/// the audit request record exists.
pub async fn upload_batch_media(
    client: &dyn PostActions,
    cred: &Credential,
    media: &[MediaAttachment],
) -> Result<Vec<String>, TwitterError> {
    let mut media_ids = Vec::with_capacity(media.len());
    for (index, attachment) in media.iter().enumerate() {
        match client
            .upload_media(cred, &attachment.data, &attachment.content_type)
            .await
        {
            Ok(id) => {
                info!(index, media_id = %id, content_type = %attachment.content_type, "uploaded attachment");
                media_ids.push(id);
            }
            Err(err) => {
                error!(index, error = %err, "media upload failed; aborting batch");
                return Err(err);
            }
        }
    }
    Ok(media_ids)
}

/// Run one batch to completion. Results stream through `tx`; dropping the
/// sender at the end closes the stream. There is no aggregate return value;
/// final counts live on the audit request record.
pub async fn run_batch(
    client: &dyn PostActions,
    audit: &dyn AuditStore,
    cred: &Credential,
    job: BatchJob,
    policy: &RunnerPolicy,
    tx: mpsc::Sender<ActionResult>,
) {
    let request_id = match audit
        .begin_request(job.kind, &cred.id, job.urls.len() as i64, &job.client_info)
        .await
    {
        Ok(id) => Some(id),
        Err(err) => {
            error!(error = %err, "failed to create audit request record; continuing without audit");
            None
        }
    };

    let total = job.urls.len();
    for (i, url) in job.urls.iter().enumerate() {
        let tweet_id = extract_tweet_id(url);
        info!(url = %url, position = i + 1, total, action = %job.kind, "processing tweet");

        let result = match attempt_with_retry(client, cred, &job, tweet_id, policy).await {
            Ok(result_id) => ActionResult::success(url.clone(), result_id),
            Err(err) => {
                warn!(url = %url, error = %err, "action failed");
                ActionResult::error(url.clone(), err.to_string())
            }
        };

        if let Some(request_id) = request_id {
            if let Err(err) = audit.record_action(request_id, url, tweet_id, &result).await {
                error!(error = %err, url = %url, "failed to write audit action record");
            }
            let success = result.status == ActionStatus::Success;
            if let Err(err) = audit.bump_counter(request_id, success).await {
                error!(error = %err, "failed to bump audit counter");
            }
        }

        if tx.send(result).await.is_err() {
            info!(processed = i + 1, total, "client disconnected; stopping batch");
            return;
        }

        if i + 1 < total && !policy.inter_request_delay.is_zero() {
            tokio::time::sleep(policy.inter_request_delay).await;
        }
    }
}

/// Invoke the action for one tweet, retrying transient failures with a
/// linearly growing backoff. Permanent failures return after one attempt.
async fn attempt_with_retry(
    client: &dyn PostActions,
    cred: &Credential,
    job: &BatchJob,
    tweet_id: &str,
    policy: &RunnerPolicy,
) -> Result<Option<String>, TwitterError> {
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        let outcome = match job.kind {
            ActionKind::Reply => {
                let message = job.message.as_deref().unwrap_or_default();
                client
                    .reply(cred, tweet_id, message, &job.media_ids)
                    .await
                    .map(Some)
            }
            ActionKind::Like => client.like(cred, tweet_id).await.map(|()| None),
            ActionKind::Retweet => client.retweet(cred, tweet_id).await,
        };

        match outcome {
            Ok(result_id) => return Ok(result_id),
            Err(err) if err.is_transient() && attempt < max_attempts => {
                let delay = policy.backoff_base * attempt;
                warn!(tweet_id, attempt, error = %err, "transient failure; backing off");
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}
