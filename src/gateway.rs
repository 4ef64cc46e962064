//! Action Gateway
//!
//! Single entry point for point-granting actions. Each action runs the same
//! pipeline:
//!
//! ```text
//! identity? ──► RiskAssessor ──► ActivityGuard.check ──► RewardLedger.grant ──► ActivityGuard.record
//!     │              │ (block mode)        │ reject               │ error
//!     ▼              ▼                     ▼                      ▼
//! unauthenticated  origin_blocked   suspicious_activity /   not_found /
//!                                   rate_exceeded           internal_error
//! ```
//!
//! Purchase, reveal and consume paths are thin delegations to the inventory.

use axum::http::HeaderMap;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::net::IpAddr;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::audit::{AuditEventType, AuditLogger, AuditSeverity};
use crate::config::{GateConfig, RiskMode, sanitize_for_logging};
use crate::error::{RejectReason, StoreError};
use crate::guard::ActivityGuard;
use crate::inventory::{CodeInventory, ImportSummary, Order};
use crate::ledger::{ActionKind, Balance, RewardLedger};
use crate::risk::{OriginRecord, RiskAssessor};

/// Gateway knobs taken from [`GateConfig`]
#[derive(Debug, Clone)]
pub struct GatewayPolicy {
    pub risk_mode: RiskMode,
    pub high_risk_threshold: u8,
    pub points_per_click: i64,
    pub points_per_ad_view: i64,
    pub milestone_interval: u64,
    pub sanitize_logs: bool,
}

impl Default for GatewayPolicy {
    fn default() -> Self {
        Self::from(&GateConfig::default())
    }
}

impl From<&GateConfig> for GatewayPolicy {
    fn from(config: &GateConfig) -> Self {
        Self {
            risk_mode: config.risk.mode,
            high_risk_threshold: config.risk.high_risk_threshold,
            points_per_click: config.rewards.points_per_click,
            points_per_ad_view: config.rewards.points_per_ad_view,
            milestone_interval: config.rewards.milestone_interval,
            sanitize_logs: config.logging.sanitize_logs,
        }
    }
}

impl GatewayPolicy {
    pub fn points_for(&self, kind: ActionKind) -> i64 {
        match kind {
            ActionKind::Click => self.points_per_click,
            ActionKind::AdView => self.points_per_ad_view,
        }
    }
}

/// One point-granting action as received from the transport layer
#[derive(Debug, Clone)]
pub struct ActionRequest<'a> {
    /// Authenticated identity, if the session layer resolved one
    pub identity: Option<&'a str>,
    pub kind: ActionKind,
    /// Socket peer address
    pub peer: Option<IpAddr>,
    pub headers: &'a HeaderMap,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActionOutcome {
    pub accepted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<RejectReason>,
    /// Spendable points after the grant
    #[serde(skip_serializing_if = "Option::is_none")]
    pub balance: Option<i64>,
    /// Counter of the granted action kind after the grant
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action_count: Option<i64>,
    pub points_awarded: i64,
    pub milestone_hit: bool,
    /// Set when a transient store failure caused the rejection
    pub retryable: bool,
}

impl ActionOutcome {
    fn rejected(reason: RejectReason) -> Self {
        Self {
            accepted: false,
            reason: Some(reason),
            balance: None,
            action_count: None,
            points_awarded: 0,
            milestone_hit: false,
            retryable: false,
        }
    }
}

pub struct ActionGateway {
    assessor: Arc<RiskAssessor>,
    guard: Arc<ActivityGuard>,
    ledger: Arc<RewardLedger>,
    inventory: Arc<CodeInventory>,
    audit: Arc<AuditLogger>,
    policy: GatewayPolicy,
}

impl ActionGateway {
    pub fn new(
        assessor: Arc<RiskAssessor>,
        guard: Arc<ActivityGuard>,
        ledger: Arc<RewardLedger>,
        inventory: Arc<CodeInventory>,
        audit: Arc<AuditLogger>,
        policy: GatewayPolicy,
    ) -> Self {
        Self {
            assessor,
            guard,
            ledger,
            inventory,
            audit,
            policy,
        }
    }

    pub fn policy(&self) -> &GatewayPolicy {
        &self.policy
    }

    pub fn assessor(&self) -> &RiskAssessor {
        &self.assessor
    }

    pub fn guard(&self) -> &ActivityGuard {
        &self.guard
    }

    pub fn ledger(&self) -> &RewardLedger {
        &self.ledger
    }

    pub fn audit(&self) -> &AuditLogger {
        &self.audit
    }

    fn masked<'a>(&self, identity: &'a str) -> std::borrow::Cow<'a, str> {
        if self.policy.sanitize_logs {
            sanitize_for_logging(identity).into()
        } else {
            identity.into()
        }
    }

    pub async fn perform(&self, request: ActionRequest<'_>) -> ActionOutcome {
        self.perform_at(request, Utc::now()).await
    }

    /// Run one action through risk, guard and ledger at `now`
    pub async fn perform_at(&self, request: ActionRequest<'_>, now: DateTime<Utc>) -> ActionOutcome {
        let Some(identity) = request.identity.filter(|id| !id.trim().is_empty()) else {
            self.audit
                .log_rejection(None, RejectReason::Unauthenticated, None)
                .await;
            return ActionOutcome::rejected(RejectReason::Unauthenticated);
        };

        let origin = self.assessor.assess_at(request.peer, request.headers, now);
        if origin.risk_score >= self.policy.high_risk_threshold {
            match self.policy.risk_mode {
                RiskMode::Block => {
                    self.audit
                        .log_rejection(
                            Some(identity),
                            RejectReason::OriginBlocked,
                            Some(origin.risk_score),
                        )
                        .await;
                    return ActionOutcome::rejected(RejectReason::OriginBlocked);
                }
                RiskMode::Warn => {
                    warn!(
                        identity = %self.masked(identity),
                        risk_score = origin.risk_score,
                        provider = origin.provider.as_deref().unwrap_or("unknown"),
                        "High-risk origin, continuing in warn mode"
                    );
                    self.audit
                        .log(
                            AuditEventType::HighRiskOrigin {
                                identity: identity.to_string(),
                                risk_score: origin.risk_score,
                                provider: origin.provider.clone(),
                            },
                            AuditSeverity::Warning,
                            Some(origin.risk_score),
                        )
                        .await;
                }
            }
        }

        let decision = self.guard.check(identity, now);
        if let Some(reason) = decision.reason {
            self.audit
                .log_rejection(Some(identity), reason, Some(origin.risk_score))
                .await;
            return ActionOutcome::rejected(reason);
        }

        let points = self.policy.points_for(request.kind);
        let grant = match self
            .ledger
            .grant_at(identity, request.kind, points, self.policy.milestone_interval, now)
            .await
        {
            Ok(grant) => grant,
            Err(err) => return self.grant_failed(identity, err).await,
        };

        self.guard.record(identity, now);
        debug!(
            identity = %self.masked(identity),
            kind = %request.kind,
            balance = grant.new_points,
            "Action accepted"
        );

        ActionOutcome {
            accepted: true,
            reason: None,
            balance: Some(grant.new_points),
            action_count: Some(grant.new_action_count),
            points_awarded: points,
            milestone_hit: grant.milestone_hit,
            retryable: false,
        }
    }

    async fn grant_failed(&self, identity: &str, err: StoreError) -> ActionOutcome {
        let reason = err.reject_reason();
        let retryable = err.is_retryable();

        if reason == RejectReason::NotFound {
            self.audit
                .log_rejection(Some(identity), reason, None)
                .await;
        } else {
            warn!(identity = %self.masked(identity), error = %err, retryable, "Grant failed");
            self.audit
                .log(
                    AuditEventType::GrantFailed {
                        identity: identity.to_string(),
                        error: err.to_string(),
                        retryable,
                    },
                    AuditSeverity::Error,
                    None,
                )
                .await;
        }

        ActionOutcome {
            retryable,
            ..ActionOutcome::rejected(reason)
        }
    }

    /// Origin classification for the risk-check endpoint. `bypass` skips the
    /// cache read.
    pub fn check_origin(&self, peer: Option<IpAddr>, headers: &HeaderMap, bypass: bool) -> OriginRecord {
        if bypass {
            self.assessor.assess_uncached(peer, headers, Utc::now())
        } else {
            self.assessor.assess(peer, headers)
        }
    }

    pub async fn balance(&self, identity: &str) -> Result<Balance, StoreError> {
        self.ledger.balance(identity).await
    }

    pub async fn register(&self, identity: &str) -> Result<Balance, StoreError> {
        self.ledger.register(identity).await
    }

    pub async fn purchase(&self, identity: &str, product_id: &str, cost: i64) -> Result<Order, StoreError> {
        self.inventory.fulfill(identity, product_id, cost).await
    }

    pub async fn purchases(&self, identity: &str) -> Result<Vec<Order>, StoreError> {
        self.inventory.orders(identity).await
    }

    pub async fn reveal(&self, identity: &str, order_id: Uuid) -> Result<Order, StoreError> {
        self.inventory.reveal(order_id, identity).await
    }

    pub async fn set_consumed(&self, identity: &str, order_id: Uuid, used: bool) -> Result<Order, StoreError> {
        self.inventory.set_consumed(order_id, identity, used).await
    }

    pub async fn import_codes(&self, product_id: &str, raw: &str) -> Result<ImportSummary, StoreError> {
        let summary = self.inventory.import_codes(product_id, raw).await?;
        self.audit
            .log(
                AuditEventType::CodesImported {
                    product_id: product_id.to_string(),
                    inserted: summary.inserted,
                    skipped: summary.skipped,
                },
                AuditSeverity::Info,
                None,
            )
            .await;
        Ok(summary)
    }

    pub async fn delete_code(&self, code_id: Uuid) -> Result<(), StoreError> {
        self.inventory.delete_code(code_id).await?;
        self.audit
            .log(
                AuditEventType::CodeDeleted {
                    code_id: code_id.to_string(),
                },
                AuditSeverity::Info,
                None,
            )
            .await;
        Ok(())
    }

    pub fn inventory(&self) -> &CodeInventory {
        &self.inventory
    }

    /// Periodic housekeeping: stale origins and idle identities
    pub fn housekeep(&self, now: DateTime<Utc>, idle: chrono::Duration) -> (usize, usize) {
        let origins = self.assessor.purge_expired(now);
        let identities = self.guard.evict_idle(now, idle);
        (origins, identities)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::MemoryStore;
    use crate::guard::GuardPolicy;
    use chrono::Duration;

    fn gateway(policy: GatewayPolicy) -> (Arc<MemoryStore>, ActionGateway) {
        let store = Arc::new(MemoryStore::new());
        store.register_identity("user_1");
        let gateway = ActionGateway::new(
            Arc::new(RiskAssessor::new(Duration::hours(24))),
            Arc::new(ActivityGuard::new(GuardPolicy::default())),
            Arc::new(RewardLedger::new(store.clone())),
            Arc::new(CodeInventory::new(store.clone())),
            Arc::new(AuditLogger::default()),
            policy,
        );
        (store, gateway)
    }

    fn click<'a>(identity: Option<&'a str>, peer: &str, headers: &'a HeaderMap) -> ActionRequest<'a> {
        ActionRequest {
            identity,
            kind: ActionKind::Click,
            peer: peer.parse().ok(),
            headers,
        }
    }

    #[tokio::test]
    async fn test_missing_identity_is_unauthenticated() {
        let (_, gateway) = gateway(GatewayPolicy::default());
        let headers = HeaderMap::new();

        let outcome = gateway.perform(click(None, "81.2.69.142", &headers)).await;
        assert_eq!(outcome.reason, Some(RejectReason::Unauthenticated));

        let outcome = gateway.perform(click(Some("  "), "81.2.69.142", &headers)).await;
        assert_eq!(outcome.reason, Some(RejectReason::Unauthenticated));
    }

    #[tokio::test]
    async fn test_accepted_click() {
        let (_, gateway) = gateway(GatewayPolicy::default());
        let headers = HeaderMap::new();

        let outcome = gateway.perform(click(Some("user_1"), "10.0.0.5", &headers)).await;
        assert!(outcome.accepted);
        assert_eq!(outcome.balance, Some(10));
        assert_eq!(outcome.action_count, Some(1));
        assert!(!outcome.milestone_hit);
        assert_eq!(gateway.guard().inspect("user_1"), Some((0, 1)));
    }

    #[tokio::test]
    async fn test_block_mode_rejects_vpn() {
        let policy = GatewayPolicy {
            risk_mode: RiskMode::Block,
            ..GatewayPolicy::default()
        };
        let (store, gateway) = gateway(policy);
        let headers = HeaderMap::new();

        let outcome = gateway
            .perform(click(Some("user_1"), "104.200.200.1", &headers))
            .await;
        assert_eq!(outcome.reason, Some(RejectReason::OriginBlocked));
        assert_eq!(store.balance_of("user_1").unwrap().points, 0);
        assert!(gateway.guard().inspect("user_1").is_none());
    }

    #[tokio::test]
    async fn test_warn_mode_grants_and_audits() {
        let (_, gateway) = gateway(GatewayPolicy::default());
        let headers = HeaderMap::new();

        let outcome = gateway
            .perform(click(Some("user_1"), "104.200.200.1", &headers))
            .await;
        assert!(outcome.accepted);

        let audit = gateway.audit().recent(10).await;
        assert!(matches!(
            audit[0].event_type,
            AuditEventType::HighRiskOrigin { risk_score, .. } if risk_score >= 50
        ));
    }

    #[tokio::test]
    async fn test_unknown_identity_is_not_recorded() {
        let (_, gateway) = gateway(GatewayPolicy::default());
        let headers = HeaderMap::new();

        let outcome = gateway.perform(click(Some("ghost"), "10.0.0.5", &headers)).await;
        assert_eq!(outcome.reason, Some(RejectReason::NotFound));
        assert!(!outcome.retryable);
        assert_eq!(gateway.guard().inspect("ghost"), Some((0, 0)));
    }
}
