//! Durable store contracts
//!
//! Both contracts are implemented by the PostgreSQL repositories and by
//! [`MemoryStore`](crate::database::MemoryStore).

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

use crate::error::StoreError;
use crate::inventory::{ImportSummary, Order, RedemptionCode};
use crate::ledger::{Balance, GrantDelta, LedgerSummary};

#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Apply `delta` as one atomic increment and return the balance after it.
    /// A missing identity yields [`StoreError::NotFound`] without mutation.
    async fn apply_grant(&self, identity: &str, delta: &GrantDelta) -> Result<Balance, StoreError>;

    async fn balance(&self, identity: &str) -> Result<Balance, StoreError>;

    /// Provision a zero balance for `identity`; existing balances are kept
    async fn ensure_identity(&self, identity: &str) -> Result<Balance, StoreError>;

    /// Totals over all balances. Activity counts from `active_since`, today's
    /// points from accumulators reset on `local_date`, and `top` earners.
    async fn summary(
        &self,
        active_since: DateTime<Utc>,
        local_date: NaiveDate,
        top: usize,
    ) -> Result<LedgerSummary, StoreError>;
}

#[async_trait]
pub trait InventoryStore: Send + Sync {
    /// Insert codes for a product, skipping values it already has
    async fn insert_codes(
        &self,
        product_id: &str,
        codes: &[String],
    ) -> Result<ImportSummary, StoreError>;

    /// Mark one unused code used and bind it to `order_id`
    async fn allocate(&self, product_id: &str, order_id: Uuid) -> Result<RedemptionCode, StoreError>;

    /// Conditional debit, order creation and code allocation as one unit
    async fn fulfill(&self, identity: &str, product_id: &str, cost: i64) -> Result<Order, StoreError>;

    /// Set `revealed` on an order owned by `identity`
    async fn mark_revealed(&self, order_id: Uuid, identity: &str) -> Result<Order, StoreError>;

    /// Set `used` on an order owned by `identity`; true to false is rejected
    async fn mark_used(&self, order_id: Uuid, identity: &str, used: bool) -> Result<Order, StoreError>;

    /// Delete a code that is not bound to an order
    async fn delete_code(&self, code_id: Uuid) -> Result<(), StoreError>;

    async fn orders(&self, identity: &str) -> Result<Vec<Order>, StoreError>;

    async fn codes(&self, product_id: &str) -> Result<Vec<RedemptionCode>, StoreError>;

    async fn available(&self, product_id: &str) -> Result<i64, StoreError>;
}
