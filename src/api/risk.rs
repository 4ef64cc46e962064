//! Origin risk check endpoint

use axum::{
    Json, Router,
    extract::{Query, State},
    http::HeaderMap,
    routing::get,
};
use serde::{Deserialize, Serialize};

use crate::api::{GatewayApiState, PeerAddr};
use crate::risk::{OriginRecord, RiskLevel};

#[derive(Debug, Deserialize)]
pub struct RiskCheckQuery {
    /// Present (any value) to skip the cached classification
    pub bypass: Option<String>,
}

/// Classification of the caller's origin. Never echoes the address.
#[derive(Debug, Serialize)]
pub struct RiskCheckResponse {
    pub is_vpn: bool,
    pub is_proxy: bool,
    pub is_tor: bool,
    pub is_datacenter: bool,
    pub risk_score: u8,
    pub risk_level: RiskLevel,
    pub provider: Option<String>,
}

impl From<OriginRecord> for RiskCheckResponse {
    fn from(record: OriginRecord) -> Self {
        Self {
            risk_level: record.risk_level(),
            is_vpn: record.is_vpn,
            is_proxy: record.is_proxy,
            is_tor: record.is_tor,
            is_datacenter: record.is_datacenter,
            risk_score: record.risk_score,
            provider: record.provider,
        }
    }
}

/// GET /risk/check
pub async fn check(
    State(state): State<GatewayApiState>,
    PeerAddr(peer): PeerAddr,
    Query(query): Query<RiskCheckQuery>,
    headers: HeaderMap,
) -> Json<RiskCheckResponse> {
    let record = state
        .gateway
        .check_origin(peer, &headers, query.bypass.is_some());
    Json(record.into())
}

pub fn create_router(state: GatewayApiState) -> Router {
    Router::new()
        .route("/check", get(check))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_omits_address() {
        let record = OriginRecord {
            risk_score: 60,
            is_tor: true,
            ..OriginRecord::safe_default("185.220.100.40")
        };
        let json = serde_json::to_string(&RiskCheckResponse::from(record)).unwrap();

        assert!(!json.contains("185.220"));
        assert!(json.contains("\"risk_level\":\"MEDIUM\""));
    }
}
