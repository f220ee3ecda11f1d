//! Tweet URL validation.
//!
//! Pure function over the raw newline-delimited submission: trims each line,
//! checks it against the tweet URL shape, and drops exact duplicates while
//! preserving encounter order. Callers must not start a batch when `errors`
//! is non-empty.

use regex::Regex;
use std::collections::HashSet;
use std::sync::LazyLock;

static TWEET_URL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^https?://(twitter\.com|x\.com)/[A-Za-z0-9_]+/(status|statuses)/[0-9]+$")
        .expect("valid tweet URL regex")
});

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationOutcome {
    /// One human-readable message per malformed line, in input order.
    pub errors: Vec<String>,
    /// Unique pattern-valid URLs, in encounter order.
    pub urls: Vec<String>,
}

pub fn validate_tweet_urls(raw: &str) -> ValidationOutcome {
    let mut outcome = ValidationOutcome::default();
    let mut seen = HashSet::new();
    for line in raw.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if !TWEET_URL_RE.is_match(line) {
            outcome.errors.push(format!("Invalid Twitter/X URL format: {line}"));
            continue;
        }
        if seen.insert(line.to_string()) {
            outcome.urls.push(line.to_string());
        }
    }
    outcome
}
