//! Behavioral Activity Guard
//!
//! Per-identity rate limiting and bot-pattern detection. Each identity owns
//! a small state (last action, trailing window, suspicion counter) that is
//! read and written as one unit under a lock scoped to that identity.

pub mod activity;
pub mod state;

pub use activity::{ActivityGuard, GuardDecision, GuardPolicy};
pub use state::{ActivityStore, IdentityActivityState, MemoryActivityStore};
