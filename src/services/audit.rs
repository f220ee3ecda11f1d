//! Audit log and metrics store.
//!
//! One request record per batch submission, one action record per URL
//! outcome, and a daily per-account rollup. The runner talks to the store
//! through [`AuditStore`] so tests can substitute an in-memory sink; the
//! Postgres implementation lives here too.

use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::PgPool;

use crate::runner::{ActionKind, ActionResult};

/// Submitting client metadata captured on the request record.
#[derive(Debug, Clone, Default)]
pub struct ClientInfo {
    pub user_agent: Option<String>,
    pub ip_address: Option<String>,
}

#[async_trait]
pub trait AuditStore: Send + Sync {
    /// Create the request record before iteration starts; counters start at
    /// zero. Returns the request id the per-URL records refer to.
    async fn begin_request(
        &self,
        kind: ActionKind,
        account: &str,
        total_urls: i64,
        client: &ClientInfo,
    ) -> Result<i64>;

    /// Persist one URL's outcome. Called exactly once per processed URL.
    async fn record_action(
        &self,
        request_id: i64,
        url: &str,
        tweet_id: &str,
        result: &ActionResult,
    ) -> Result<()>;

    /// Atomically bump the matching counter on the request record.
    async fn bump_counter(&self, request_id: i64, success: bool) -> Result<()>;
}

#[derive(Clone)]
pub struct PgAuditStore {
    pool: PgPool,
}

impl PgAuditStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Aggregate one UTC day's request records per account.
    pub async fn summarize_day(&self, day: NaiveDate) -> Result<Vec<AccountDaySummary>, sqlx::Error> {
        let start = day.and_time(chrono::NaiveTime::MIN).and_utc();
        let end = start + chrono::Duration::days(1);

        let rows: Vec<(String, i64, i64, i64, i64)> = sqlx::query_as(
            r#"
            SELECT account,
                   COUNT(*),
                   COALESCE(SUM(total_urls), 0)::BIGINT,
                   COALESCE(SUM(success_count), 0)::BIGINT,
                   COALESCE(SUM(error_count), 0)::BIGINT
            FROM batch_requests
            WHERE created_at >= $1 AND created_at < $2
            GROUP BY account
            ORDER BY account
            "#,
        )
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(
                |(account, request_count, action_count, success_count, error_count)| {
                    AccountDaySummary {
                        account,
                        request_count,
                        action_count,
                        success_count,
                        error_count,
                    }
                },
            )
            .collect())
    }

    /// Create-or-increment the per-account summary row for `day`.
    pub async fn upsert_daily_summary(
        &self,
        day: NaiveDate,
        summary: &AccountDaySummary,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO daily_account_summaries
                (account, day, request_count, action_count, success_count, error_count)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (account, day) DO UPDATE SET
                request_count = daily_account_summaries.request_count + EXCLUDED.request_count,
                action_count = daily_account_summaries.action_count + EXCLUDED.action_count,
                success_count = daily_account_summaries.success_count + EXCLUDED.success_count,
                error_count = daily_account_summaries.error_count + EXCLUDED.error_count,
                updated_at = NOW()
            "#,
        )
        .bind(&summary.account)
        .bind(day)
        .bind(summary.request_count)
        .bind(summary.action_count)
        .bind(summary.success_count)
        .bind(summary.error_count)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl AuditStore for PgAuditStore {
    async fn begin_request(
        &self,
        kind: ActionKind,
        account: &str,
        total_urls: i64,
        client: &ClientInfo,
    ) -> Result<i64> {
        let row: (i64,) = sqlx::query_as(
            r#"
            INSERT INTO batch_requests
                (action_type, account, total_urls, success_count, error_count, user_agent, ip_address)
            VALUES ($1, $2, $3, 0, 0, $4, $5)
            RETURNING id
            "#,
        )
        .bind(kind.as_str())
        .bind(account)
        .bind(total_urls)
        .bind(client.user_agent.as_deref())
        .bind(client.ip_address.as_deref())
        .fetch_one(&self.pool)
        .await?;
        Ok(row.0)
    }

    async fn record_action(
        &self,
        request_id: i64,
        url: &str,
        tweet_id: &str,
        result: &ActionResult,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO batch_actions
                (request_id, tweet_url, tweet_id, status, result_id, error_message)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(request_id)
        .bind(url)
        .bind(tweet_id)
        .bind(result.status.as_str())
        .bind(result.result_id.as_deref())
        .bind(result.message.as_deref())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn bump_counter(&self, request_id: i64, success: bool) -> Result<()> {
        let sql = if success {
            "UPDATE batch_requests SET success_count = success_count + 1 WHERE id = $1"
        } else {
            "UPDATE batch_requests SET error_count = error_count + 1 WHERE id = $1"
        };
        sqlx::query(sql).bind(request_id).execute(&self.pool).await?;
        Ok(())
    }
}

/// One account's aggregated activity for a single day.
#[derive(Debug, Clone)]
pub struct AccountDaySummary {
    pub account: String,
    pub request_count: i64,
    pub action_count: i64,
    pub success_count: i64,
    pub error_count: i64,
}

impl AccountDaySummary {
    /// Percentage of actions that succeeded; 0 when the account had none.
    pub fn success_rate(&self) -> f64 {
        if self.action_count > 0 {
            (self.success_count as f64 / self.action_count as f64) * 100.0
        } else {
            0.0
        }
    }
}
