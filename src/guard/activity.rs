//! Sliding-window rate limiting and burst suspicion per identity

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

use crate::config::GuardConfig;
use crate::error::RejectReason;
use crate::guard::{ActivityStore, MemoryActivityStore};

/// Guard thresholds in chrono units
#[derive(Debug, Clone)]
pub struct GuardPolicy {
    pub min_interval: Duration,
    pub decay_interval: Duration,
    pub suspicion_threshold: u32,
    pub max_actions_per_window: usize,
    pub window: Duration,
}

impl Default for GuardPolicy {
    fn default() -> Self {
        Self::from(&GuardConfig::default())
    }
}

impl From<&GuardConfig> for GuardPolicy {
    fn from(config: &GuardConfig) -> Self {
        Self {
            min_interval: Duration::milliseconds(config.min_action_interval_ms as i64),
            decay_interval: Duration::milliseconds(config.decay_interval_ms as i64),
            suspicion_threshold: config.suspicion_threshold,
            max_actions_per_window: config.max_actions_per_minute,
            window: Duration::seconds(config.window_secs as i64),
        }
    }
}

/// Outcome of [`ActivityGuard::check`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GuardDecision {
    pub allow: bool,
    pub reason: Option<RejectReason>,
    /// Suspicion after this check
    pub suspicion: u32,
    /// Accepted actions in the trailing window, excluding this one
    pub window_count: usize,
}

/// Per-identity behavioral gate consulted before every point-granting action
pub struct ActivityGuard {
    store: Arc<dyn ActivityStore>,
    policy: GuardPolicy,
}

impl ActivityGuard {
    pub fn new(policy: GuardPolicy) -> Self {
        Self {
            store: Arc::new(MemoryActivityStore::new()),
            policy,
        }
    }

    pub fn with_store(policy: GuardPolicy, store: Arc<dyn ActivityStore>) -> Self {
        Self { store, policy }
    }

    pub fn policy(&self) -> &GuardPolicy {
        &self.policy
    }

    /// Decide whether `identity` may act at `now`.
    ///
    /// Suspicion is evaluated before the window cap so a tight burst is
    /// attributed to bot-pattern detection. A suspicion rejection keeps the
    /// increment; a window rejection discards it. Every call counts as an
    /// attempt, so rejected attempts still shorten the next gap.
    pub fn check(&self, identity: &str, now: DateTime<Utc>) -> GuardDecision {
        let policy = &self.policy;
        let mut decision = None;

        self.store.update(identity, &mut |state| {
            state.prune(now - policy.window);

            let mut suspicion = state.suspicion;
            if let Some(last) = state.last_seen() {
                let gap = now.signed_duration_since(last);
                if gap < policy.min_interval {
                    suspicion += 1;
                } else if gap > policy.decay_interval {
                    suspicion = suspicion.saturating_sub(1);
                }
            }

            state.last_attempt_at = Some(now);

            let window_count = state.window_count();
            let reason = if suspicion > policy.suspicion_threshold {
                state.suspicion = suspicion;
                Some(RejectReason::SuspiciousActivity)
            } else if window_count >= policy.max_actions_per_window {
                Some(RejectReason::RateExceeded)
            } else {
                state.suspicion = suspicion;
                None
            };

            decision = Some(GuardDecision {
                allow: reason.is_none(),
                reason,
                suspicion: state.suspicion,
                window_count,
            });
        });

        let decision = decision.unwrap_or(GuardDecision {
            allow: true,
            reason: None,
            suspicion: 0,
            window_count: 0,
        });

        if let Some(reason) = decision.reason {
            debug!(
                reason = %reason,
                suspicion = decision.suspicion,
                window_count = decision.window_count,
                "Activity guard rejected action"
            );
        }

        decision
    }

    /// Record an action that went through. Call only after a successful grant.
    pub fn record(&self, identity: &str, now: DateTime<Utc>) {
        let window = self.policy.window;
        self.store.update(identity, &mut |state| {
            state.prune(now - window);
            state.recent.push_back(now);
            state.last_action_at = Some(now);
        });
    }

    /// Current suspicion and window count without mutating state
    pub fn inspect(&self, identity: &str) -> Option<(u32, usize)> {
        self.store
            .snapshot(identity)
            .map(|state| (state.suspicion, state.window_count()))
    }

    /// Housekeeping: forget identities idle for longer than `idle`
    pub fn evict_idle(&self, now: DateTime<Utc>, idle: Duration) -> usize {
        self.store.evict_idle(now - idle)
    }

    pub fn tracked_identities(&self) -> usize {
        self.store.tracked()
    }
}
