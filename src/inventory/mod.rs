//! Redemption Code Inventory
//!
//! Single-use codes per product. A code is bound to exactly one order in the
//! same storage operation that marks it used, and an order's flags only ever
//! move from false to true.

pub mod codes;
pub mod models;

pub use codes::CodeInventory;
pub use models::{normalize_codes, ImportSummary, Order, RedemptionCode};
