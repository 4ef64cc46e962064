//! Purchased code endpoints

use axum::{
    Json, Router,
    extract::State,
    http::HeaderMap,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::{ApiError, GatewayApiState, require_identity, store_error};
use crate::inventory::Order;

#[derive(Debug, Serialize)]
pub struct PurchasesResponse {
    pub purchases: Vec<Order>,
}

#[derive(Debug, Deserialize)]
pub struct RevealRequest {
    #[serde(alias = "orderId")]
    pub order_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct ToggleUsedRequest {
    #[serde(alias = "orderId")]
    pub order_id: Uuid,
    #[serde(alias = "isUsed")]
    pub is_used: bool,
}

#[derive(Debug, Serialize)]
pub struct OrderResponse {
    pub success: bool,
    pub order: Order,
}

/// GET /store/purchases - newest first, codes only on revealed orders
pub async fn purchases(
    State(state): State<GatewayApiState>,
    headers: HeaderMap,
) -> Result<Json<PurchasesResponse>, ApiError> {
    let identity = require_identity(&headers)?;
    let purchases = state.gateway.purchases(&identity).await.map_err(store_error)?;
    Ok(Json(PurchasesResponse { purchases }))
}

/// POST /store/reveal-code
pub async fn reveal_code(
    State(state): State<GatewayApiState>,
    headers: HeaderMap,
    Json(payload): Json<RevealRequest>,
) -> Result<Json<OrderResponse>, ApiError> {
    let identity = require_identity(&headers)?;
    let order = state
        .gateway
        .reveal(&identity, payload.order_id)
        .await
        .map_err(store_error)?;
    Ok(Json(OrderResponse {
        success: true,
        order,
    }))
}

/// POST /store/toggle-used - used codes cannot be marked unused again
pub async fn toggle_used(
    State(state): State<GatewayApiState>,
    headers: HeaderMap,
    Json(payload): Json<ToggleUsedRequest>,
) -> Result<Json<OrderResponse>, ApiError> {
    let identity = require_identity(&headers)?;
    let order = state
        .gateway
        .set_consumed(&identity, payload.order_id, payload.is_used)
        .await
        .map_err(store_error)?;
    Ok(Json(OrderResponse {
        success: true,
        order,
    }))
}

pub fn create_router(state: GatewayApiState) -> Router {
    Router::new()
        .route("/purchases", get(purchases))
        .route("/reveal-code", post(reveal_code))
        .route("/toggle-used", post(toggle_used))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_toggle_request_accepts_camel_case() {
        let id = Uuid::new_v4();
        let body = format!(r#"{{"orderId":"{}","isUsed":true}}"#, id);
        let request: ToggleUsedRequest = serde_json::from_str(&body).unwrap();

        assert_eq!(request.order_id, id);
        assert!(request.is_used);
    }
}
