//! Balance Repository - PostgreSQL operations for point balances using sqlx

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use tracing::debug;

use crate::database::LedgerStore;
use crate::error::StoreError;
use crate::ledger::{ActionKind, Balance, GrantDelta, LedgerSummary, TopEarner};

const BALANCE_COLUMNS: &str = "identity_id, points, lifetime_points, clicks, ad_views, \
                               daily_points, daily_reset_on, last_activity_at";

fn balance_from_row(row: &PgRow) -> Balance {
    Balance {
        identity_id: row.get("identity_id"),
        points: row.get("points"),
        lifetime_points: row.get("lifetime_points"),
        clicks: row.get("clicks"),
        ad_views: row.get("ad_views"),
        daily_points: row.get("daily_points"),
        daily_reset_on: row.get("daily_reset_on"),
        last_activity_at: row.get("last_activity_at"),
    }
}

pub struct BalanceRepository {
    pool: PgPool,
}

impl BalanceRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LedgerStore for BalanceRepository {
    async fn apply_grant(&self, identity: &str, delta: &GrantDelta) -> Result<Balance, StoreError> {
        let (clicks, ad_views): (i64, i64) = match delta.kind {
            ActionKind::Click => (1, 0),
            ActionKind::AdView => (0, 1),
        };

        let row = sqlx::query(&format!(
            r#"
            UPDATE rewards.balances
            SET points = points + $2,
                lifetime_points = lifetime_points + $2,
                clicks = clicks + $3,
                ad_views = ad_views + $4,
                daily_points = CASE WHEN daily_reset_on = $5 THEN daily_points + $2 ELSE $2 END,
                daily_reset_on = $5,
                last_activity_at = $6
            WHERE identity_id = $1
            RETURNING {BALANCE_COLUMNS}
            "#
        ))
        .bind(identity)
        .bind(delta.points)
        .bind(clicks)
        .bind(ad_views)
        .bind(delta.local_date)
        .bind(delta.at)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(StoreError::NotFound)?;

        debug!(kind = %delta.kind, points = delta.points, "Balance incremented");
        Ok(balance_from_row(&row))
    }

    async fn balance(&self, identity: &str) -> Result<Balance, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {BALANCE_COLUMNS} FROM rewards.balances WHERE identity_id = $1"
        ))
        .bind(identity)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(StoreError::NotFound)?;

        Ok(balance_from_row(&row))
    }

    async fn ensure_identity(&self, identity: &str) -> Result<Balance, StoreError> {
        sqlx::query(
            r#"
            INSERT INTO rewards.balances (identity_id)
            VALUES ($1)
            ON CONFLICT (identity_id) DO NOTHING
            "#,
        )
        .bind(identity)
        .execute(&self.pool)
        .await?;

        self.balance(identity).await
    }

    async fn summary(
        &self,
        active_since: DateTime<Utc>,
        local_date: NaiveDate,
        top: usize,
    ) -> Result<LedgerSummary, StoreError> {
        let totals = sqlx::query(
            r#"
            SELECT
                COUNT(*) AS total_identities,
                COALESCE(SUM(clicks), 0)::BIGINT AS total_clicks,
                COALESCE(SUM(ad_views), 0)::BIGINT AS total_ad_views,
                COALESCE(SUM(points), 0)::BIGINT AS total_points,
                COUNT(*) FILTER (WHERE last_activity_at >= $1) AS active_identities,
                COALESCE(SUM(daily_points) FILTER (WHERE daily_reset_on = $2), 0)::BIGINT
                    AS points_today
            FROM rewards.balances
            "#,
        )
        .bind(active_since)
        .bind(local_date)
        .fetch_one(&self.pool)
        .await?;

        let rows = sqlx::query(
            r#"
            SELECT identity_id, points, lifetime_points, clicks
            FROM rewards.balances
            ORDER BY points DESC, identity_id
            LIMIT $1
            "#,
        )
        .bind(top as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(LedgerSummary {
            total_identities: totals.get("total_identities"),
            total_clicks: totals.get("total_clicks"),
            total_ad_views: totals.get("total_ad_views"),
            total_points: totals.get("total_points"),
            active_identities: totals.get("active_identities"),
            points_today: totals.get("points_today"),
            top_earners: rows
                .iter()
                .map(|row| TopEarner {
                    identity_id: row.get("identity_id"),
                    points: row.get("points"),
                    lifetime_points: row.get("lifetime_points"),
                    clicks: row.get("clicks"),
                })
                .collect(),
        })
    }
}
