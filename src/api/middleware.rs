//! Security Middleware for the reward gate API
//!
//! Provides:
//! - Request size limits
//! - Security headers
//! - Request logging with sanitization

use axum::{
    extract::{ConnectInfo, FromRequestParts, Request, State},
    http::request::Parts,
    http::{HeaderMap, HeaderValue, StatusCode},
    middleware::Next,
    response::Response,
};
use std::convert::Infallible;
use std::net::{IpAddr, SocketAddr};
use std::time::Instant;
use tracing::{error, info, warn};

use crate::config::{GateConfig, sanitize_for_logging};
use crate::risk::{ClientAddress, client_address};

/// Security configuration for middleware
#[derive(Debug, Clone)]
pub struct SecurityMiddlewareConfig {
    /// Maximum request body size in bytes
    pub max_request_size: usize,
    /// Enable request logging
    pub log_requests: bool,
    /// Mask client addresses in logs
    pub sanitize_logs: bool,
}

impl Default for SecurityMiddlewareConfig {
    fn default() -> Self {
        Self {
            max_request_size: 64 * 1024,
            log_requests: true,
            sanitize_logs: true,
        }
    }
}

impl From<&GateConfig> for SecurityMiddlewareConfig {
    fn from(config: &GateConfig) -> Self {
        Self {
            max_request_size: config.security.max_request_size,
            log_requests: config.logging.log_requests,
            sanitize_logs: config.logging.sanitize_logs,
        }
    }
}

/// Shared state for security middleware
#[derive(Clone)]
pub struct SecurityState {
    pub config: SecurityMiddlewareConfig,
}

impl SecurityState {
    pub fn new(config: SecurityMiddlewareConfig) -> Self {
        Self { config }
    }
}

/// Socket peer of the request, when the server was started with connect info
#[derive(Debug, Clone, Copy)]
pub struct PeerAddr(pub Option<IpAddr>);

impl<S: Send + Sync> FromRequestParts<S> for PeerAddr {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(PeerAddr(
            parts
                .extensions
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| addr.ip()),
        ))
    }
}

/// Client address for logs, resolved the same way the risk assessor does
fn log_address(headers: &HeaderMap, peer: Option<IpAddr>, sanitize: bool) -> String {
    let raw = match client_address(headers, peer) {
        ClientAddress::Parsed(ip) => ip.to_string(),
        ClientAddress::Unparseable(raw) => raw,
        ClientAddress::Missing => return "unknown".to_string(),
    };
    if sanitize {
        sanitize_for_logging(&raw)
    } else {
        raw
    }
}

/// Security headers middleware
pub async fn security_headers_middleware(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();

    headers.insert("X-Frame-Options", HeaderValue::from_static("DENY"));
    headers.insert(
        "X-Content-Type-Options",
        HeaderValue::from_static("nosniff"),
    );
    headers.insert(
        "Strict-Transport-Security",
        HeaderValue::from_static("max-age=31536000; includeSubDomains"),
    );
    headers.insert(
        "Content-Security-Policy",
        HeaderValue::from_static("default-src 'none'; frame-ancestors 'none'"),
    );
    headers.insert(
        "Referrer-Policy",
        HeaderValue::from_static("strict-origin-when-cross-origin"),
    );
    // Balances and codes must never be cached
    headers.insert(
        "Cache-Control",
        HeaderValue::from_static("no-store, no-cache, must-revalidate"),
    );
    headers.remove("Server");

    response
}

/// Request logging middleware with sanitization
pub async fn logging_middleware(
    State(state): State<SecurityState>,
    PeerAddr(peer): PeerAddr,
    headers: HeaderMap,
    request: Request,
    next: Next,
) -> Response {
    if !state.config.log_requests {
        return next.run(request).await;
    }

    let start = Instant::now();
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let client = log_address(&headers, peer, state.config.sanitize_logs);

    let response = next.run(request).await;
    let duration = start.elapsed();
    let status = response.status();

    if status.is_server_error() {
        error!(
            method = %method,
            path = %path,
            status = %status.as_u16(),
            duration_ms = %duration.as_millis(),
            client_ip = %client,
            "Request failed"
        );
    } else if status.is_client_error() {
        warn!(
            method = %method,
            path = %path,
            status = %status.as_u16(),
            duration_ms = %duration.as_millis(),
            client_ip = %client,
            "Client error"
        );
    } else {
        info!(
            method = %method,
            path = %path,
            status = %status.as_u16(),
            duration_ms = %duration.as_millis(),
            client_ip = %client,
            "Request completed"
        );
    }

    response
}

/// Request body size validation middleware
pub async fn body_size_middleware(
    State(state): State<SecurityState>,
    headers: HeaderMap,
    request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let declared = headers
        .get("content-length")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<usize>().ok());

    if let Some(length) = declared {
        if length > state.config.max_request_size {
            warn!(
                "Request body too large: {} bytes (max: {})",
                length, state.config.max_request_size
            );
            return Err(StatusCode::PAYLOAD_TOO_LARGE);
        }
    }

    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_address_is_masked() {
        let peer: IpAddr = "203.0.113.77".parse().unwrap();
        let headers = HeaderMap::new();

        assert_eq!(log_address(&headers, Some(peer), true), "203....3.77");
        assert_eq!(log_address(&headers, Some(peer), false), "203.0.113.77");
        assert_eq!(log_address(&headers, None, true), "unknown");
    }

    #[test]
    fn test_log_address_prefers_forwarded_header() {
        let peer: IpAddr = "10.0.0.1".parse().unwrap();
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("198.51.100.7, 10.0.0.1"));

        assert_eq!(log_address(&headers, Some(peer), false), "198.51.100.7");
    }
}
