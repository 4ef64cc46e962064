//! HTTP API endpoints for the reward gate
//!
//! Provides REST APIs for:
//! - Reward actions (click, ad reward, balance)
//! - Origin risk check
//! - Purchased code store (list, reveal, mark used)
//! - Administration (code inventory, risk overview, audit trail)
//! - Security middleware (size limits, headers, logging)
//!
//! Identity comes from the `x-user-id` header, set by the session layer in
//! front of this service.

pub mod actions;
pub mod admin;
pub mod middleware;
pub mod risk;
pub mod store;

use axum::{
    http::{HeaderMap, StatusCode},
    Json,
};
use serde::Serialize;
use std::sync::Arc;

use crate::error::{RejectReason, StoreError};
use crate::gateway::ActionGateway;

pub use admin::{AdminApiState, create_router as create_admin_router};
pub use middleware::{
    PeerAddr, SecurityMiddlewareConfig, SecurityState, body_size_middleware, logging_middleware,
    security_headers_middleware,
};

pub use actions::create_router as create_actions_router;
pub use risk::create_router as create_risk_router;
pub use store::create_router as create_store_router;

/// Header carrying the authenticated identity
pub const IDENTITY_HEADER: &str = "x-user-id";

/// Shared state for the user-facing routers
#[derive(Clone)]
pub struct GatewayApiState {
    pub gateway: Arc<ActionGateway>,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<RejectReason>,
    pub retryable: bool,
}

pub type ApiError = (StatusCode, Json<ErrorResponse>);

pub fn api_error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
            reason: None,
            retryable: false,
        }),
    )
}

pub fn rejection(reason: RejectReason) -> ApiError {
    let status =
        StatusCode::from_u16(reason.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (
        status,
        Json(ErrorResponse {
            error: reason.user_message().to_string(),
            reason: Some(reason),
            retryable: false,
        }),
    )
}

/// Map a store failure to a response. Internal details stay in the logs.
pub fn store_error(err: StoreError) -> ApiError {
    let status = match &err {
        StoreError::NotFound => StatusCode::NOT_FOUND,
        StoreError::InsufficientPoints { .. } | StoreError::InvalidAmount(_) => {
            StatusCode::BAD_REQUEST
        }
        StoreError::OutOfStock(_) | StoreError::InvalidTransition(_) | StoreError::CodeInUse => {
            StatusCode::CONFLICT
        }
        StoreError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
    };
    let message = match &err {
        StoreError::Unavailable(detail) => {
            tracing::error!(error = %detail, "Store unavailable");
            "Service temporarily unavailable".to_string()
        }
        other => other.to_string(),
    };
    (
        status,
        Json(ErrorResponse {
            error: message,
            reason: None,
            retryable: err.is_retryable(),
        }),
    )
}

/// Identity set by the session layer, if any
pub fn identity_from(headers: &HeaderMap) -> Option<String> {
    headers
        .get(IDENTITY_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
}

pub fn require_identity(headers: &HeaderMap) -> Result<String, ApiError> {
    identity_from(headers).ok_or_else(|| rejection(RejectReason::Unauthenticated))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_identity_header() {
        let mut headers = HeaderMap::new();
        assert!(identity_from(&headers).is_none());

        headers.insert(IDENTITY_HEADER, HeaderValue::from_static("  "));
        assert!(require_identity(&headers).is_err());

        headers.insert(IDENTITY_HEADER, HeaderValue::from_static("user_1"));
        assert_eq!(identity_from(&headers).as_deref(), Some("user_1"));
    }

    #[test]
    fn test_store_error_status() {
        assert_eq!(store_error(StoreError::NotFound).0, StatusCode::NOT_FOUND);
        assert_eq!(store_error(StoreError::CodeInUse).0, StatusCode::CONFLICT);

        let (status, Json(body)) = store_error(StoreError::Unavailable("pool timed out".into()));
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert!(body.retryable);
        assert!(!body.error.contains("pool"));
    }

    #[test]
    fn test_rejection_carries_reason() {
        let (status, Json(body)) = rejection(RejectReason::RateExceeded);
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(body.reason, Some(RejectReason::RateExceeded));
    }
}
