//! Error and rejection types shared by the gating components.
//!
//! Two families live here:
//! - [`RejectReason`]: the closed set of machine-readable outcomes returned to
//!   callers of the action endpoint.
//! - [`StoreError`]: failures raised by the durable store contract.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Closed set of reasons a reward action can be rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    Unauthenticated,
    NotFound,
    OriginBlocked,
    SuspiciousActivity,
    RateExceeded,
    InternalError,
}

impl RejectReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectReason::Unauthenticated => "unauthenticated",
            RejectReason::NotFound => "not_found",
            RejectReason::OriginBlocked => "origin_blocked",
            RejectReason::SuspiciousActivity => "suspicious_activity",
            RejectReason::RateExceeded => "rate_exceeded",
            RejectReason::InternalError => "internal_error",
        }
    }

    /// HTTP status equivalent for the thin HTTP layer.
    pub fn status_code(&self) -> u16 {
        match self {
            RejectReason::Unauthenticated => 401,
            RejectReason::NotFound => 404,
            RejectReason::OriginBlocked => 403,
            RejectReason::SuspiciousActivity | RejectReason::RateExceeded => 429,
            RejectReason::InternalError => 500,
        }
    }

    /// User-facing message. Never describes which heuristic fired.
    pub fn user_message(&self) -> &'static str {
        match self {
            RejectReason::Unauthenticated => "Please log in to continue",
            RejectReason::NotFound => "Account not found",
            RejectReason::OriginBlocked => "Rewards are unavailable from this network right now",
            RejectReason::SuspiciousActivity => "Slow down! Clicking too fast",
            RejectReason::RateExceeded => "Slow down! Too many actions, take a short break",
            RejectReason::InternalError => "Something went wrong, please try again",
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors surfaced by the durable store contract.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("record not found")]
    NotFound,

    #[error("insufficient points: balance {available}, cost {required}")]
    InsufficientPoints { available: i64, required: i64 },

    #[error("no unused codes left for product {0}")]
    OutOfStock(String),

    #[error("invalid state transition: {0}")]
    InvalidTransition(&'static str),

    #[error("redemption code is bound to an order and cannot be deleted")]
    CodeInUse,

    #[error("invalid amount: {0}")]
    InvalidAmount(i64),

    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    /// Transient failures the caller may retry. The core never retries itself.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Unavailable(_))
    }

    /// Maps a store failure onto the reject reason of the action endpoint.
    pub fn reject_reason(&self) -> RejectReason {
        match self {
            StoreError::NotFound => RejectReason::NotFound,
            _ => RejectReason::InternalError,
        }
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => StoreError::NotFound,
            other => StoreError::Unavailable(other.to_string()),
        }
    }
}
