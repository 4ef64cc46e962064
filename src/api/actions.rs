//! Reward action endpoints

use axum::{
    Json, Router,
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::{get, post},
};
use serde::Serialize;

use crate::api::{ApiError, GatewayApiState, PeerAddr, identity_from, require_identity, store_error};
use crate::error::RejectReason;
use crate::gateway::{ActionOutcome, ActionRequest};
use crate::ledger::{ActionKind, Balance};

#[derive(Debug, Serialize)]
pub struct ActionResponse {
    #[serde(flatten)]
    pub outcome: ActionOutcome,
    /// Human-readable message for rejected actions
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<&'static str>,
}

async fn perform(
    state: &GatewayApiState,
    kind: ActionKind,
    peer: PeerAddr,
    headers: &HeaderMap,
) -> (StatusCode, Json<ActionResponse>) {
    let identity = identity_from(headers);
    let outcome = state
        .gateway
        .perform(ActionRequest {
            identity: identity.as_deref(),
            kind,
            peer: peer.0,
            headers,
        })
        .await;

    let status = match outcome.reason {
        None => StatusCode::OK,
        Some(RejectReason::InternalError) if outcome.retryable => StatusCode::SERVICE_UNAVAILABLE,
        Some(reason) => StatusCode::from_u16(reason.status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
    };
    let message = outcome.reason.map(|r| r.user_message());

    (status, Json(ActionResponse { outcome, message }))
}

/// POST /actions/click
pub async fn click(
    State(state): State<GatewayApiState>,
    peer: PeerAddr,
    headers: HeaderMap,
) -> (StatusCode, Json<ActionResponse>) {
    perform(&state, ActionKind::Click, peer, &headers).await
}

/// POST /actions/ad-reward
pub async fn ad_reward(
    State(state): State<GatewayApiState>,
    peer: PeerAddr,
    headers: HeaderMap,
) -> (StatusCode, Json<ActionResponse>) {
    perform(&state, ActionKind::AdView, peer, &headers).await
}

/// GET /actions/balance
pub async fn balance(
    State(state): State<GatewayApiState>,
    headers: HeaderMap,
) -> Result<Json<Balance>, ApiError> {
    let identity = require_identity(&headers)?;
    let balance = state.gateway.balance(&identity).await.map_err(store_error)?;
    Ok(Json(balance))
}

pub fn create_router(state: GatewayApiState) -> Router {
    Router::new()
        .route("/click", post(click))
        .route("/ad-reward", post(ad_reward))
        .route("/balance", get(balance))
        .with_state(state)
}
