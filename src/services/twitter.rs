//! X (Twitter) API client for batch engagement actions.
//!
//! All calls are signed with OAuth 1.0a user context (HMAC-SHA1) using the
//! per-account credential bundle resolved at request entry. Failures are
//! classified at construction time so the runner can decide whether to retry
//! without inspecting message text.

use async_trait::async_trait;
use base64::Engine;
use chrono::Utc;
use hmac::{Hmac, Mac};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use rand::Rng;
use reqwest::Client;
use serde::Deserialize;
use sha1::Sha1;
use thiserror::Error;

use crate::accounts::Credential;

const API_BASE: &str = "https://api.x.com";

type HmacSha1 = Hmac<Sha1>;

/// RFC 3986 unreserved characters pass through; everything else is encoded.
const OAUTH_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

#[derive(Debug, Error)]
pub enum TwitterError {
    #[error("network error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("rate limited (status 429): {body}")]
    RateLimited { body: String },
    #[error("service unavailable (status {status}): {body}")]
    Unavailable { status: u16, body: String },
    #[error("Twitter API error (status {status}): {body}")]
    Api { status: u16, body: String },
    #[error("invalid media: {0}")]
    Media(String),
}

impl TwitterError {
    fn from_status(status: u16, body: String) -> Self {
        match status {
            429 => TwitterError::RateLimited { body },
            500 | 502 | 503 | 504 => TwitterError::Unavailable { status, body },
            _ => TwitterError::Api { status, body },
        }
    }

    /// Whether the failure is expected to resolve on its own shortly.
    /// Unclassified failures are treated as permanent so the runner fails
    /// fast instead of retrying indefinitely.
    pub fn is_transient(&self) -> bool {
        match self {
            TwitterError::RateLimited { .. } | TwitterError::Unavailable { .. } => true,
            TwitterError::Http(e) => e.is_timeout() || e.is_connect(),
            TwitterError::Api { .. } | TwitterError::Media(_) => false,
        }
    }
}

/// The three idempotent-per-call engagement operations plus media upload.
/// Implemented by [`TwitterClient`]; test code substitutes fakes.
#[async_trait]
pub trait PostActions: Send + Sync {
    async fn reply(
        &self,
        cred: &Credential,
        tweet_id: &str,
        message: &str,
        media_ids: &[String],
    ) -> Result<String, TwitterError>;

    async fn like(&self, cred: &Credential, tweet_id: &str) -> Result<(), TwitterError>;

    async fn retweet(
        &self,
        cred: &Credential,
        tweet_id: &str,
    ) -> Result<Option<String>, TwitterError>;

    async fn upload_media(
        &self,
        cred: &Credential,
        data: &[u8],
        media_type: &str,
    ) -> Result<String, TwitterError>;
}

#[derive(Clone)]
pub struct TwitterClient {
    http: Client,
}

impl TwitterClient {
    pub fn new() -> Self {
        // Per-call timeouts live here; the runner above never waits on a
        // request longer than this.
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .expect("reqwest client");
        Self { http }
    }
}

impl Default for TwitterClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PostActions for TwitterClient {
    /// Post `message` as a reply to `tweet_id`, attaching pre-uploaded media.
    async fn reply(
        &self,
        cred: &Credential,
        tweet_id: &str,
        message: &str,
        media_ids: &[String],
    ) -> Result<String, TwitterError> {
        let url = format!("{API_BASE}/2/tweets");

        let mut body = serde_json::json!({
            "text": message,
            "reply": { "in_reply_to_tweet_id": tweet_id }
        });
        if !media_ids.is_empty() {
            body["media"] = serde_json::json!({ "media_ids": media_ids });
        }

        let resp = self
            .http
            .post(&url)
            .header("Authorization", oauth1_header(cred, "POST", &url, &[]))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        let text = read_success(resp).await?;
        let wrapper: TweetResponseWrapper = parse_json(&text)?;
        Ok(wrapper.data.id)
    }

    /// Mark `tweet_id` as liked by the credential's account.
    async fn like(&self, cred: &Credential, tweet_id: &str) -> Result<(), TwitterError> {
        let url = format!("{API_BASE}/2/users/{}/likes", cred.user_id);

        let resp = self
            .http
            .post(&url)
            .header("Authorization", oauth1_header(cred, "POST", &url, &[]))
            .header("Content-Type", "application/json")
            .json(&serde_json::json!({ "tweet_id": tweet_id }))
            .send()
            .await?;

        read_success(resp).await?;
        Ok(())
    }

    /// Repost `tweet_id` from the credential's account.
    async fn retweet(
        &self,
        cred: &Credential,
        tweet_id: &str,
    ) -> Result<Option<String>, TwitterError> {
        let url = format!("{API_BASE}/2/users/{}/retweets", cred.user_id);

        let resp = self
            .http
            .post(&url)
            .header("Authorization", oauth1_header(cred, "POST", &url, &[]))
            .header("Content-Type", "application/json")
            .json(&serde_json::json!({ "tweet_id": tweet_id }))
            .send()
            .await?;

        let text = read_success(resp).await?;
        let wrapper: RetweetResponseWrapper = parse_json(&text)?;
        Ok(wrapper.data.id)
    }

    /// Upload one attachment; the returned media id must be referenced by a
    /// reply before it expires.
    async fn upload_media(
        &self,
        cred: &Credential,
        data: &[u8],
        media_type: &str,
    ) -> Result<String, TwitterError> {
        let url = format!("{API_BASE}/2/media/upload");

        let media_category = if media_type == "image/gif" {
            "tweet_gif"
        } else {
            "tweet_image"
        };

        let part = reqwest::multipart::Part::bytes(data.to_vec())
            .mime_str(media_type)
            .map_err(|e| TwitterError::Media(format!("invalid mime type: {e}")))?;

        let form = reqwest::multipart::Form::new()
            .text("media_category", media_category.to_string())
            .text("media_type", media_type.to_string())
            .part("media", part);

        let resp = self
            .http
            .post(&url)
            .header("Authorization", oauth1_header(cred, "POST", &url, &[]))
            .multipart(form)
            .send()
            .await?;

        let text = read_success(resp).await?;
        let wrapper: MediaUploadResponse = parse_json(&text)?;
        Ok(wrapper.data.id)
    }
}

async fn read_success(resp: reqwest::Response) -> Result<String, TwitterError> {
    let status = resp.status();
    let text = resp.text().await?;
    if !status.is_success() {
        return Err(TwitterError::from_status(status.as_u16(), text));
    }
    Ok(text)
}

fn parse_json<'a, T: Deserialize<'a>>(text: &'a str) -> Result<T, TwitterError> {
    serde_json::from_str(text).map_err(|e| TwitterError::Api {
        status: 200,
        body: format!("failed to parse response: {e} - body: {text}"),
    })
}

// OAuth 1.0a request signing

/// Build the `Authorization: OAuth ...` header for one request.
/// `extra_params` must contain any query or form-urlencoded parameters the
/// request carries; JSON and multipart bodies are not part of the signature.
fn oauth1_header(
    cred: &Credential,
    method: &str,
    url: &str,
    extra_params: &[(&str, &str)],
) -> String {
    let nonce = generate_nonce();
    let timestamp = Utc::now().timestamp().to_string();
    build_oauth1_header(cred, method, url, extra_params, &nonce, &timestamp)
}

fn build_oauth1_header(
    cred: &Credential,
    method: &str,
    url: &str,
    extra_params: &[(&str, &str)],
    nonce: &str,
    timestamp: &str,
) -> String {
    let oauth_params: [(&str, &str); 6] = [
        ("oauth_consumer_key", &cred.app_key),
        ("oauth_nonce", nonce),
        ("oauth_signature_method", "HMAC-SHA1"),
        ("oauth_timestamp", timestamp),
        ("oauth_token", &cred.access_token),
        ("oauth_version", "1.0"),
    ];

    let all_params: Vec<(String, String)> = oauth_params
        .iter()
        .chain(extra_params.iter())
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

    let signature = sign_request(
        method,
        url,
        &all_params,
        &cred.app_secret,
        &cred.access_token_secret,
    );

    let mut header_params: Vec<(String, String)> = oauth_params
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    header_params.push(("oauth_signature".to_string(), signature));
    header_params.sort();

    let fields = header_params
        .iter()
        .map(|(k, v)| format!(r#"{}="{}""#, oauth_encode(k), oauth_encode(v)))
        .collect::<Vec<_>>()
        .join(", ");

    format!("OAuth {fields}")
}

/// HMAC-SHA1 over the OAuth signature base string, base64-encoded.
fn sign_request(
    method: &str,
    url: &str,
    params: &[(String, String)],
    consumer_secret: &str,
    token_secret: &str,
) -> String {
    let mut encoded: Vec<(String, String)> = params
        .iter()
        .map(|(k, v)| (oauth_encode(k), oauth_encode(v)))
        .collect();
    encoded.sort();

    let param_string = encoded
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&");

    let base = format!(
        "{}&{}&{}",
        method.to_uppercase(),
        oauth_encode(url),
        oauth_encode(&param_string)
    );
    let key = format!(
        "{}&{}",
        oauth_encode(consumer_secret),
        oauth_encode(token_secret)
    );

    let mut mac = HmacSha1::new_from_slice(key.as_bytes()).expect("HMAC accepts any key length");
    mac.update(base.as_bytes());
    base64::engine::general_purpose::STANDARD.encode(mac.finalize().into_bytes())
}

fn oauth_encode(s: &str) -> String {
    utf8_percent_encode(s, OAUTH_ENCODE_SET).to_string()
}

fn generate_nonce() -> String {
    let bytes: [u8; 16] = rand::rng().random();
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

#[derive(Debug, Deserialize)]
struct TweetResponseWrapper {
    data: TweetData,
}

#[derive(Debug, Deserialize)]
struct TweetData {
    id: String,
}

#[derive(Debug, Deserialize)]
struct RetweetResponseWrapper {
    data: RetweetData,
}

/// The retweet endpoint confirms with `retweeted`; an id for the created
/// repost is not always present.
#[derive(Debug, Deserialize)]
struct RetweetData {
    #[allow(dead_code)]
    retweeted: bool,
    id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MediaUploadResponse {
    data: MediaUploadData,
}

#[derive(Debug, Deserialize)]
struct MediaUploadData {
    id: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc_credential() -> Credential {
        // Fixture values from the documented OAuth 1.0a signing example.
        Credential {
            id: "doc".into(),
            handle: "doc".into(),
            user_id: "1".into(),
            app_key: "xvz1evFS4wEEPTGEFPHBog".into(),
            app_secret: "kAcSOqF21Fu85e7zjz7ZN2U4ZRhfV3WpwPAoE3Z7kBw".into(),
            access_token: "370773112-GmHxMAgYyLbNEtIKZeRNFsMKPR9EyMZeS9weJAEb".into(),
            access_token_secret: "LswwdoUaIvS8ltyTt5jkRh4J50vUPVVHtR2YPi5kE".into(),
        }
    }

    #[test]
    fn signature_matches_documented_vector() {
        let cred = doc_credential();
        let params: Vec<(String, String)> = vec![
            (
                "status".into(),
                "Hello Ladies + Gentlemen, a signed OAuth request!".into(),
            ),
            ("include_entities".into(), "true".into()),
            ("oauth_consumer_key".into(), cred.app_key.clone()),
            (
                "oauth_nonce".into(),
                "kYjzVBB8Y0ZFabxSWbWovY3uYSQ2pTgmZeNu2VS4cg".into(),
            ),
            ("oauth_signature_method".into(), "HMAC-SHA1".into()),
            ("oauth_timestamp".into(), "1318622958".into()),
            ("oauth_token".into(), cred.access_token.clone()),
            ("oauth_version".into(), "1.0".into()),
        ];
        let signature = sign_request(
            "POST",
            "https://api.twitter.com/1.1/statuses/update.json",
            &params,
            &cred.app_secret,
            &cred.access_token_secret,
        );
        assert_eq!(signature, "tnnArxj06cWHq44gCs1OSKk/jLY=");
    }

    #[test]
    fn oauth_encoding_is_rfc3986() {
        assert_eq!(
            oauth_encode("Hello Ladies + Gentlemen, a signed OAuth request!"),
            "Hello%20Ladies%20%2B%20Gentlemen%2C%20a%20signed%20OAuth%20request%21"
        );
        assert_eq!(oauth_encode("abc-._~XYZ123"), "abc-._~XYZ123");
    }

    #[test]
    fn header_carries_all_oauth_fields() {
        let cred = doc_credential();
        let header = build_oauth1_header(
            &cred,
            "POST",
            "https://api.x.com/2/tweets",
            &[],
            "fixed-nonce",
            "1318622958",
        );
        assert!(header.starts_with("OAuth "));
        for field in [
            "oauth_consumer_key=",
            "oauth_nonce=",
            "oauth_signature=",
            "oauth_signature_method=\"HMAC-SHA1\"",
            "oauth_timestamp=\"1318622958\"",
            "oauth_token=",
            "oauth_version=\"1.0\"",
        ] {
            assert!(header.contains(field), "missing {field} in {header}");
        }
    }

    #[test]
    fn rate_limit_and_unavailable_are_transient() {
        let err = TwitterError::from_status(429, "slow down".into());
        assert!(err.is_transient());
        assert!(err.to_string().contains("rate limited"));

        let err = TwitterError::from_status(503, "overloaded".into());
        assert!(err.is_transient());
        assert!(err.to_string().contains("service unavailable"));
    }

    #[test]
    fn client_errors_are_permanent() {
        for status in [400, 401, 403, 404] {
            let err = TwitterError::from_status(status, "nope".into());
            assert!(!err.is_transient(), "status {status} should be permanent");
        }
    }
}
