//! Balance data model

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Point-granting action kinds. Each kind has its own counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Click,
    AdView,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::Click => "click",
            ActionKind::AdView => "ad_view",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s {
            "click" => Ok(ActionKind::Click),
            "ad_view" | "ad-view" | "ad_reward" => Ok(ActionKind::AdView),
            other => Err(anyhow::anyhow!("Unknown action kind: {}", other)),
        }
    }
}

/// Points and counters of one identity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balance {
    pub identity_id: String,
    /// Spendable points
    pub points: i64,
    /// Points ever granted; purchases never reduce it
    pub lifetime_points: i64,
    pub clicks: i64,
    pub ad_views: i64,
    pub daily_points: i64,
    /// Local date the daily accumulator belongs to
    pub daily_reset_on: Option<NaiveDate>,
    pub last_activity_at: Option<DateTime<Utc>>,
}

impl Balance {
    pub fn new(identity_id: impl Into<String>) -> Self {
        Self {
            identity_id: identity_id.into(),
            points: 0,
            lifetime_points: 0,
            clicks: 0,
            ad_views: 0,
            daily_points: 0,
            daily_reset_on: None,
            last_activity_at: None,
        }
    }

    pub fn action_count(&self, kind: ActionKind) -> i64 {
        match kind {
            ActionKind::Click => self.clicks,
            ActionKind::AdView => self.ad_views,
        }
    }

    /// Apply a grant in place. Used by stores that hold balances in memory;
    /// the SQL store expresses the same arithmetic in one UPDATE.
    pub fn apply(&mut self, delta: &GrantDelta) {
        self.points += delta.points;
        self.lifetime_points += delta.points;
        match delta.kind {
            ActionKind::Click => self.clicks += 1,
            ActionKind::AdView => self.ad_views += 1,
        }
        if self.daily_reset_on == Some(delta.local_date) {
            self.daily_points += delta.points;
        } else {
            self.daily_points = delta.points;
            self.daily_reset_on = Some(delta.local_date);
        }
        self.last_activity_at = Some(delta.at);
    }
}

/// One atomic increment against a balance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GrantDelta {
    pub kind: ActionKind,
    pub points: i64,
    pub at: DateTime<Utc>,
    /// Server-local date of `at`, drives the daily accumulator reset
    pub local_date: NaiveDate,
}

/// Outcome of a successful grant
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GrantResult {
    pub new_points: i64,
    pub new_action_count: i64,
    pub milestone_hit: bool,
    pub balance: Balance,
}

/// Leaderboard row of [`LedgerSummary`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TopEarner {
    pub identity_id: String,
    pub points: i64,
    pub lifetime_points: i64,
    pub clicks: i64,
}

/// Aggregate view over every balance, for the admin dashboard
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LedgerSummary {
    pub total_identities: i64,
    pub total_clicks: i64,
    pub total_ad_views: i64,
    /// Spendable points currently held
    pub total_points: i64,
    /// Identities with activity since the cutoff passed to the store
    pub active_identities: i64,
    /// Daily accumulators whose reset date is today
    pub points_today: i64,
    /// Highest spendable balances, richest first
    pub top_earners: Vec<TopEarner>,
}
