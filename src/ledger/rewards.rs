//! Reward Ledger - atomic point grants with milestone detection

use chrono::{DateTime, Duration, Local, Utc};
use std::sync::Arc;
use tracing::{debug, info};

use crate::database::LedgerStore;
use crate::error::StoreError;
use crate::ledger::{ActionKind, Balance, GrantDelta, GrantResult, LedgerSummary};

/// Identities count as active when they earned within this many hours
const ACTIVE_WINDOW_HOURS: i64 = 24;

/// Leaderboard length of [`RewardLedger::summary`]
const TOP_EARNERS: usize = 5;

/// True when `count` lands exactly on a milestone. An interval of zero
/// disables milestones.
pub fn is_milestone(count: i64, interval: u64) -> bool {
    interval > 0 && count > 0 && (count as u64) % interval == 0
}

pub struct RewardLedger {
    store: Arc<dyn LedgerStore>,
}

impl RewardLedger {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    pub async fn grant(
        &self,
        identity: &str,
        kind: ActionKind,
        points: i64,
        milestone_interval: u64,
    ) -> Result<GrantResult, StoreError> {
        self.grant_at(identity, kind, points, milestone_interval, Utc::now())
            .await
    }

    /// Grant `points` for one action of `kind`.
    ///
    /// Counter, balance, lifetime and daily totals move together in a single
    /// store call. Milestones are checked against the returned counter only,
    /// so concurrent grants can never both claim the same milestone.
    pub async fn grant_at(
        &self,
        identity: &str,
        kind: ActionKind,
        points: i64,
        milestone_interval: u64,
        at: DateTime<Utc>,
    ) -> Result<GrantResult, StoreError> {
        if points <= 0 {
            return Err(StoreError::InvalidAmount(points));
        }

        let delta = GrantDelta {
            kind,
            points,
            at,
            local_date: at.with_timezone(&Local).date_naive(),
        };

        let balance = self.store.apply_grant(identity, &delta).await?;
        let new_action_count = balance.action_count(kind);
        let milestone_hit = is_milestone(new_action_count, milestone_interval);

        debug!(
            kind = %kind,
            points,
            new_points = balance.points,
            new_action_count,
            "Points granted"
        );
        if milestone_hit {
            info!(kind = %kind, count = new_action_count, "Milestone reached");
        }

        Ok(GrantResult {
            new_points: balance.points,
            new_action_count,
            milestone_hit,
            balance,
        })
    }

    pub async fn balance(&self, identity: &str) -> Result<Balance, StoreError> {
        self.store.balance(identity).await
    }

    /// Totals, activity in the last 24 hours and today's points as of `now`
    pub async fn summary(&self, now: DateTime<Utc>) -> Result<LedgerSummary, StoreError> {
        self.store
            .summary(
                now - Duration::hours(ACTIVE_WINDOW_HOURS),
                now.with_timezone(&Local).date_naive(),
                TOP_EARNERS,
            )
            .await
    }

    /// Open a zero balance for a new identity; idempotent
    pub async fn register(&self, identity: &str) -> Result<Balance, StoreError> {
        let balance = self.store.ensure_identity(identity).await?;
        debug!(points = balance.points, "Identity registered");
        Ok(balance)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::MemoryStore;

    fn ledger_with(identity: &str) -> RewardLedger {
        let store = MemoryStore::new();
        store.register_identity(identity);
        RewardLedger::new(Arc::new(store))
    }

    #[test]
    fn test_is_milestone() {
        assert!(!is_milestone(0, 100));
        assert!(!is_milestone(99, 100));
        assert!(is_milestone(100, 100));
        assert!(is_milestone(200, 100));
        assert!(!is_milestone(100, 0));
    }

    #[tokio::test]
    async fn test_first_grant() {
        let ledger = ledger_with("user_1");
        let result = ledger.grant("user_1", ActionKind::Click, 10, 100).await.unwrap();

        assert_eq!(result.new_points, 10);
        assert_eq!(result.new_action_count, 1);
        assert!(!result.milestone_hit);
        assert_eq!(result.balance.lifetime_points, 10);
    }

    #[tokio::test]
    async fn test_kinds_have_separate_counters() {
        let ledger = ledger_with("user_1");
        ledger.grant("user_1", ActionKind::Click, 10, 2).await.unwrap();
        let ad = ledger.grant("user_1", ActionKind::AdView, 25, 2).await.unwrap();

        assert_eq!(ad.new_action_count, 1);
        assert!(!ad.milestone_hit);
        assert_eq!(ad.new_points, 35);

        let click = ledger.grant("user_1", ActionKind::Click, 10, 2).await.unwrap();
        assert!(click.milestone_hit);
    }

    #[tokio::test]
    async fn test_unknown_identity_is_not_found() {
        let ledger = ledger_with("user_1");
        let err = ledger
            .grant("ghost", ActionKind::Click, 10, 100)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound));
    }

    #[tokio::test]
    async fn test_summary_aggregates_balances() {
        let store = Arc::new(MemoryStore::new());
        for identity in ["alice", "bob", "carol"] {
            store.register_identity(identity);
        }
        let ledger = RewardLedger::new(store.clone());
        let now = Utc::now();

        for _ in 0..3 {
            ledger.grant_at("alice", ActionKind::Click, 10, 100, now).await.unwrap();
        }
        ledger.grant_at("bob", ActionKind::AdView, 25, 100, now).await.unwrap();
        // Active two days ago only
        ledger
            .grant_at("carol", ActionKind::Click, 10, 100, now - Duration::hours(48))
            .await
            .unwrap();

        let summary = ledger.summary(now).await.unwrap();
        assert_eq!(summary.total_identities, 3);
        assert_eq!(summary.total_clicks, 4);
        assert_eq!(summary.total_ad_views, 1);
        assert_eq!(summary.total_points, 65);
        assert_eq!(summary.active_identities, 2);
        assert_eq!(summary.points_today, 55);

        let ranked: Vec<&str> = summary
            .top_earners
            .iter()
            .map(|t| t.identity_id.as_str())
            .collect();
        assert_eq!(ranked, vec!["alice", "bob", "carol"]);
    }

    #[tokio::test]
    async fn test_non_positive_points_rejected() {
        let ledger = ledger_with("user_1");
        let err = ledger
            .grant("user_1", ActionKind::Click, 0, 100)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidAmount(0)));
        assert_eq!(ledger.balance("user_1").await.unwrap().clicks, 0);
    }
}
