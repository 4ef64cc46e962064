//! Admin API Endpoints
//!
//! Code inventory management, identity provisioning, and monitoring of the
//! risk and activity layers. Every handler requires the admin key header.

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    routing::{delete, get, post},
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::api::{ApiError, api_error, store_error};
use crate::audit::AuditEntry;
use crate::config::RiskMode;
use crate::gateway::ActionGateway;
use crate::inventory::{ImportSummary, RedemptionCode};
use crate::ledger::{Balance, LedgerSummary};

/// Header carrying the admin API key
pub const ADMIN_KEY_HEADER: &str = "x-admin-key";

/// API state for admin endpoints
#[derive(Clone)]
pub struct AdminApiState {
    pub gateway: Arc<ActionGateway>,
    pub admin_api_key: Option<String>,
}

/// Compare digests so the check does not short-circuit on the first
/// differing byte of the key
fn keys_match(provided: &str, expected: &str) -> bool {
    Sha256::digest(provided.as_bytes()) == Sha256::digest(expected.as_bytes())
}

fn require_admin(state: &AdminApiState, headers: &HeaderMap) -> Result<(), ApiError> {
    let Some(expected) = state.admin_api_key.as_deref() else {
        return Err(api_error(StatusCode::FORBIDDEN, "Admin API key not configured"));
    };
    let provided = headers
        .get(ADMIN_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();

    if keys_match(provided, expected) {
        Ok(())
    } else {
        warn!("Invalid admin API key attempt");
        Err(api_error(StatusCode::FORBIDDEN, "Invalid admin API key"))
    }
}

#[derive(Debug, Deserialize)]
pub struct ImportCodesRequest {
    #[serde(alias = "productId")]
    pub product_id: String,
    /// Newline-separated codes
    pub codes: String,
}

#[derive(Debug, Serialize)]
pub struct ImportCodesResponse {
    pub product_id: String,
    #[serde(flatten)]
    pub summary: ImportSummary,
    pub available: i64,
}

#[derive(Debug, Serialize)]
pub struct CodesResponse {
    pub product_id: String,
    pub total: usize,
    pub available: i64,
    pub codes: Vec<RedemptionCode>,
}

#[derive(Debug, Serialize)]
pub struct RiskOverviewResponse {
    pub mode: RiskMode,
    pub high_risk_threshold: u8,
    pub cached_origins: usize,
    pub cache_ttl_secs: i64,
    pub tracked_identities: usize,
}

#[derive(Debug, Serialize)]
pub struct ClearCacheResponse {
    pub cleared: usize,
}

#[derive(Debug, Deserialize)]
pub struct AuditQuery {
    pub limit: Option<usize>,
    pub identity: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AuditResponse {
    pub total: usize,
    pub entries: Vec<AuditEntry>,
}

#[derive(Debug, Deserialize)]
pub struct RegisterIdentityRequest {
    #[serde(alias = "identityId")]
    pub identity_id: String,
}

/// POST /admin/codes - bulk import
pub async fn import_codes(
    State(state): State<AdminApiState>,
    headers: HeaderMap,
    Json(payload): Json<ImportCodesRequest>,
) -> Result<Json<ImportCodesResponse>, ApiError> {
    require_admin(&state, &headers)?;
    let product_id = payload.product_id.trim();
    if product_id.is_empty() {
        return Err(api_error(StatusCode::BAD_REQUEST, "Product ID required"));
    }

    let summary = state
        .gateway
        .import_codes(product_id, &payload.codes)
        .await
        .map_err(store_error)?;
    let available = state
        .gateway
        .inventory()
        .available(product_id)
        .await
        .map_err(store_error)?;

    Ok(Json(ImportCodesResponse {
        product_id: product_id.to_string(),
        summary,
        available,
    }))
}

/// GET /admin/codes/{product_id}
pub async fn list_codes(
    State(state): State<AdminApiState>,
    headers: HeaderMap,
    Path(product_id): Path<String>,
) -> Result<Json<CodesResponse>, ApiError> {
    require_admin(&state, &headers)?;
    let inventory = state.gateway.inventory();
    let codes = inventory.codes(&product_id).await.map_err(store_error)?;
    let available = inventory.available(&product_id).await.map_err(store_error)?;

    Ok(Json(CodesResponse {
        product_id,
        total: codes.len(),
        available,
        codes,
    }))
}

/// DELETE /admin/codes/{code_id} - unused codes only
pub async fn delete_code(
    State(state): State<AdminApiState>,
    headers: HeaderMap,
    Path(code_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    require_admin(&state, &headers)?;
    let code_id = Uuid::parse_str(&code_id)
        .map_err(|_| api_error(StatusCode::BAD_REQUEST, "Invalid code ID"))?;
    state.gateway.delete_code(code_id).await.map_err(store_error)?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /admin/risk
pub async fn risk_overview(
    State(state): State<AdminApiState>,
    headers: HeaderMap,
) -> Result<Json<RiskOverviewResponse>, ApiError> {
    require_admin(&state, &headers)?;
    let gateway = &state.gateway;
    let policy = gateway.policy();

    Ok(Json(RiskOverviewResponse {
        mode: policy.risk_mode,
        high_risk_threshold: policy.high_risk_threshold,
        cached_origins: gateway.assessor().cached_origins(),
        cache_ttl_secs: gateway.assessor().ttl().num_seconds(),
        tracked_identities: gateway.guard().tracked_identities(),
    }))
}

/// DELETE /admin/risk/cache - forget every cached origin classification
pub async fn clear_risk_cache(
    State(state): State<AdminApiState>,
    headers: HeaderMap,
) -> Result<Json<ClearCacheResponse>, ApiError> {
    require_admin(&state, &headers)?;
    let cleared = state.gateway.assessor().clear_cache();
    info!(cleared, "Origin cache cleared");
    Ok(Json(ClearCacheResponse { cleared }))
}

/// GET /admin/analytics - totals, 24h activity, today's points, top earners
pub async fn analytics(
    State(state): State<AdminApiState>,
    headers: HeaderMap,
) -> Result<Json<LedgerSummary>, ApiError> {
    require_admin(&state, &headers)?;
    let summary = state
        .gateway
        .ledger()
        .summary(Utc::now())
        .await
        .map_err(store_error)?;
    Ok(Json(summary))
}

/// GET /admin/audit?limit=&identity=
pub async fn audit_trail(
    State(state): State<AdminApiState>,
    headers: HeaderMap,
    Query(query): Query<AuditQuery>,
) -> Result<Json<AuditResponse>, ApiError> {
    require_admin(&state, &headers)?;
    let audit = state.gateway.audit();
    let limit = query.limit.unwrap_or(100).min(1000);

    let mut entries = match query.identity.as_deref() {
        Some(identity) => audit.for_identity(identity).await,
        None => audit.recent(limit).await,
    };
    entries.truncate(limit);

    Ok(Json(AuditResponse {
        total: audit.len().await,
        entries,
    }))
}

/// POST /admin/identities - open a zero balance
pub async fn register_identity(
    State(state): State<AdminApiState>,
    headers: HeaderMap,
    Json(payload): Json<RegisterIdentityRequest>,
) -> Result<Json<Balance>, ApiError> {
    require_admin(&state, &headers)?;
    let identity = payload.identity_id.trim();
    if identity.is_empty() {
        return Err(api_error(StatusCode::BAD_REQUEST, "Identity ID required"));
    }
    let balance = state.gateway.register(identity).await.map_err(store_error)?;
    Ok(Json(balance))
}

pub fn create_router(state: AdminApiState) -> Router {
    Router::new()
        .route("/codes", post(import_codes))
        .route("/codes/{id}", get(list_codes).delete(delete_code))
        .route("/risk", get(risk_overview))
        .route("/risk/cache", delete(clear_risk_cache))
        .route("/analytics", get(analytics))
        .route("/audit", get(audit_trail))
        .route("/identities", post(register_identity))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn state(key: Option<&str>) -> AdminApiState {
        use crate::audit::AuditLogger;
        use crate::database::MemoryStore;
        use crate::gateway::GatewayPolicy;
        use crate::guard::{ActivityGuard, GuardPolicy};
        use crate::inventory::CodeInventory;
        use crate::ledger::RewardLedger;
        use crate::risk::RiskAssessor;

        let store = Arc::new(MemoryStore::new());
        let gateway = ActionGateway::new(
            Arc::new(RiskAssessor::new(chrono::Duration::hours(24))),
            Arc::new(ActivityGuard::new(GuardPolicy::default())),
            Arc::new(RewardLedger::new(store.clone())),
            Arc::new(CodeInventory::new(store)),
            Arc::new(AuditLogger::default()),
            GatewayPolicy::default(),
        );
        AdminApiState {
            gateway: Arc::new(gateway),
            admin_api_key: key.map(str::to_string),
        }
    }

    #[test]
    fn test_require_admin() {
        let key = "k".repeat(32);
        let state = state(Some(&key));
        let mut headers = HeaderMap::new();
        assert!(require_admin(&state, &headers).is_err());

        headers.insert(ADMIN_KEY_HEADER, HeaderValue::from_static("wrong"));
        assert_eq!(
            require_admin(&state, &headers).unwrap_err().0,
            StatusCode::FORBIDDEN
        );

        headers.insert(ADMIN_KEY_HEADER, HeaderValue::from_str(&key).unwrap());
        assert!(require_admin(&state, &headers).is_ok());
    }

    #[test]
    fn test_admin_disabled_without_key() {
        let state = state(None);
        let mut headers = HeaderMap::new();
        headers.insert(ADMIN_KEY_HEADER, HeaderValue::from_static(""));
        assert!(require_admin(&state, &headers).is_err());
    }

    fn admin_headers(key: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(ADMIN_KEY_HEADER, HeaderValue::from_str(key).unwrap());
        headers
    }

    #[tokio::test]
    async fn test_analytics_requires_key_and_reports_totals() {
        let key = "k".repeat(32);
        let state = state(Some(&key));
        state.gateway.register("user_1").await.unwrap();
        state.gateway.register("user_2").await.unwrap();

        let (status, _) = analytics(State(state.clone()), HeaderMap::new())
            .await
            .unwrap_err();
        assert_eq!(status, StatusCode::FORBIDDEN);

        let Json(summary) = analytics(State(state), admin_headers(&key)).await.unwrap();
        assert_eq!(summary.total_identities, 2);
        assert_eq!(summary.active_identities, 0);
        assert_eq!(summary.top_earners.len(), 2);
    }

    #[tokio::test]
    async fn test_clear_risk_cache() {
        let key = "k".repeat(32);
        let state = state(Some(&key));
        let peer = "81.2.69.142".parse().ok();
        state.gateway.check_origin(peer, &HeaderMap::new(), false);
        assert_eq!(state.gateway.assessor().cached_origins(), 1);

        let Json(response) = clear_risk_cache(State(state.clone()), admin_headers(&key))
            .await
            .unwrap();
        assert_eq!(response.cleared, 1);
        assert_eq!(state.gateway.assessor().cached_origins(), 0);
    }
}
