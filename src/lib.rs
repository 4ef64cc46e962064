//! Reward Gate
//!
//! Abuse-resistant gating core for a points-for-actions rewards economy.
//! Every point-granting action passes an origin risk check and a
//! per-identity behavioral guard before an atomic ledger grant; purchased
//! rewards are single-use codes drawn from a per-product inventory.
//!
//! ## Module Structure
//!
//! ```text
//! src/
//! ├── lib.rs         - Crate root with re-exports
//! ├── main.rs        - Server entrypoint
//! ├── config.rs      - Configuration management
//! ├── error.rs       - Reject reasons and store errors
//! ├── audit.rs       - Bounded audit trail of policy decisions
//! ├── gateway.rs     - Action pipeline (risk → guard → ledger)
//! ├── risk/          - Origin risk assessment
//! │   ├── assessor.rs   - Scoring, client address resolution
//! │   ├── classifier.rs - VPN / Tor / datacenter range tables
//! │   └── cache.rs      - TTL-bounded classification cache
//! ├── guard/         - Per-identity rate limit and suspicion
//! │   ├── activity.rs - Decision logic
//! │   └── state.rs    - Per-identity state and store
//! ├── ledger/        - Point balances
//! │   ├── balance.rs - Balance model and grant delta
//! │   └── rewards.rs - Atomic grants, milestones
//! ├── inventory/     - Redemption codes
//! │   ├── models.rs - Codes, orders, import normalization
//! │   └── codes.rs  - Allocation, reveal, consumption
//! ├── api/           - HTTP API endpoints
//! │   ├── actions.rs    - Click, ad reward, balance
//! │   ├── risk.rs       - Origin risk check
//! │   ├── store.rs      - Purchases, reveal, mark used
//! │   ├── admin.rs      - Inventory and monitoring
//! │   └── middleware.rs - Headers, size limit, logging
//! └── database/      - Store contracts, PostgreSQL and in-memory stores
//! ```

pub mod api;
pub mod audit;
pub mod config;
pub mod database;
pub mod error;
pub mod gateway;
pub mod guard;
pub mod inventory;
pub mod ledger;
pub mod risk;

// Re-export main types for convenience
pub use audit::{AuditEntry, AuditEventType, AuditLogger, AuditSeverity};
pub use config::GateConfig;
pub use database::{DatabasePool, InventoryStore, LedgerStore, MemoryStore};
pub use error::{RejectReason, StoreError};
pub use gateway::{ActionGateway, ActionOutcome, ActionRequest, GatewayPolicy};
pub use guard::{ActivityGuard, ActivityStore, GuardDecision, GuardPolicy, MemoryActivityStore};
pub use inventory::{CodeInventory, ImportSummary, Order, RedemptionCode};
pub use ledger::{ActionKind, Balance, GrantResult, LedgerSummary, RewardLedger};
pub use risk::{
    OriginClassifier, OriginRecord, RiskAssessor, RiskLevel, StaticRangeClassifier,
};
