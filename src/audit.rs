//! Audit trail of policy decisions
//!
//! Bounded in-memory ring of rejections and high-risk warnings, read back by
//! the admin API. Every entry is mirrored to `tracing` at its severity.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;

use crate::error::RejectReason;

/// Types of auditable events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuditEventType {
    /// Action refused by policy
    ActionRejected {
        identity: Option<String>,
        reason: RejectReason,
    },
    /// High-risk origin let through in warn mode
    HighRiskOrigin {
        identity: String,
        risk_score: u8,
        provider: Option<String>,
    },
    /// Store failure while granting
    GrantFailed {
        identity: String,
        error: String,
        retryable: bool,
    },
    CodesImported {
        product_id: String,
        inserted: usize,
        skipped: usize,
    },
    CodeDeleted {
        code_id: String,
    },
}

impl AuditEventType {
    fn identity(&self) -> Option<&str> {
        match self {
            AuditEventType::ActionRejected { identity, .. } => identity.as_deref(),
            AuditEventType::HighRiskOrigin { identity, .. }
            | AuditEventType::GrantFailed { identity, .. } => Some(identity),
            _ => None,
        }
    }
}

/// Severity levels for audit events
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
pub enum AuditSeverity {
    Info = 1,
    Warning = 2,
    Error = 3,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub event_type: AuditEventType,
    pub severity: AuditSeverity,
    /// Risk score of the request origin, when one was assessed
    pub risk_score: Option<u8>,
}

pub struct AuditLogger {
    entries: RwLock<VecDeque<AuditEntry>>,
    max_entries: usize,
    sequence: AtomicU64,
}

impl Default for AuditLogger {
    fn default() -> Self {
        Self::new(10_000)
    }
}

impl AuditLogger {
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: RwLock::new(VecDeque::new()),
            max_entries: max_entries.max(1),
            sequence: AtomicU64::new(0),
        }
    }

    fn generate_id(&self, event: &AuditEventType, timestamp: DateTime<Utc>) -> String {
        let seq = self.sequence.fetch_add(1, Ordering::Relaxed);
        let mut hasher = Sha256::new();
        hasher.update(format!("{:?}", event).as_bytes());
        hasher.update(timestamp.timestamp_nanos_opt().unwrap_or(0).to_le_bytes());
        hasher.update(seq.to_le_bytes());
        let digest = hasher.finalize();
        format!("audit_{:x}", digest)[..22].to_string()
    }

    pub async fn log(&self, event_type: AuditEventType, severity: AuditSeverity, risk_score: Option<u8>) {
        match severity {
            AuditSeverity::Info => tracing::info!(event = ?event_type, "AUDIT"),
            AuditSeverity::Warning => tracing::warn!(event = ?event_type, "AUDIT"),
            AuditSeverity::Error => tracing::error!(event = ?event_type, "AUDIT"),
        }

        let timestamp = Utc::now();
        let entry = AuditEntry {
            id: self.generate_id(&event_type, timestamp),
            timestamp,
            event_type,
            severity,
            risk_score,
        };

        let mut entries = self.entries.write().await;
        entries.push_back(entry);
        while entries.len() > self.max_entries {
            entries.pop_front();
        }
    }

    pub async fn log_rejection(&self, identity: Option<&str>, reason: RejectReason, risk_score: Option<u8>) {
        let severity = match reason {
            RejectReason::InternalError => AuditSeverity::Error,
            RejectReason::Unauthenticated | RejectReason::NotFound => AuditSeverity::Info,
            _ => AuditSeverity::Warning,
        };
        self.log(
            AuditEventType::ActionRejected {
                identity: identity.map(str::to_string),
                reason,
            },
            severity,
            risk_score,
        )
        .await;
    }

    /// Newest first
    pub async fn recent(&self, count: usize) -> Vec<AuditEntry> {
        let entries = self.entries.read().await;
        entries.iter().rev().take(count).cloned().collect()
    }

    pub async fn for_identity(&self, identity: &str) -> Vec<AuditEntry> {
        let entries = self.entries.read().await;
        entries
            .iter()
            .rev()
            .filter(|e| e.event_type.identity() == Some(identity))
            .cloned()
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_audit_logging() {
        let logger = AuditLogger::default();

        logger
            .log_rejection(Some("user_1"), RejectReason::RateExceeded, None)
            .await;
        logger
            .log_rejection(Some("user_2"), RejectReason::OriginBlocked, Some(80))
            .await;

        let recent = logger.recent(10).await;
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].risk_score, Some(80));
        assert_ne!(recent[0].id, recent[1].id);
        assert_eq!(logger.for_identity("user_1").await.len(), 1);
    }

    #[tokio::test]
    async fn test_ring_is_bounded() {
        let logger = AuditLogger::new(3);
        for _ in 0..5 {
            logger.log_rejection(None, RejectReason::Unauthenticated, None).await;
        }
        assert_eq!(logger.len().await, 3);
    }
}
