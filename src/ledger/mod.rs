//! Reward Ledger
//!
//! Durable point balances. Every grant is a single atomic delta against the
//! store; the ledger itself holds no state.

pub mod balance;
pub mod rewards;

pub use balance::{ActionKind, Balance, GrantDelta, GrantResult, LedgerSummary, TopEarner};
pub use rewards::{is_milestone, RewardLedger};
