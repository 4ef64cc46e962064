//! Request-origin risk assessment
//!
//! Classifies the address behind a request as VPN / proxy / Tor / datacenter
//! and scores it 0-100. Pure with respect to per-user state: the only
//! mutable piece is the TTL-bounded classification cache.
//!
//! ```text
//! headers + peer ──► client_address ──► OriginCache ──hit──► OriginRecord
//!                                           │ miss
//!                                           ▼
//!                          OriginClassifier + HeaderRules ──► score ──► cache
//! ```

mod assessor;
mod cache;
mod classifier;

pub use assessor::{
    client_address, is_non_routable, ClientAddress, HeaderRules, OriginRecord, RiskAssessor,
    RiskLevel, VPN_SCORE_THRESHOLD,
};
pub use cache::{MemoryOriginCache, OriginCache};
pub use classifier::{
    Classification, ClassifyError, HostingPattern, OriginClassifier, RangeCategory, RangeEntry,
    StaticRangeClassifier,
};
