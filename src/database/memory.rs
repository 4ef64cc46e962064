//! In-memory store used when PostgreSQL is disabled and in tests

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use uuid::Uuid;

use crate::database::{InventoryStore, LedgerStore};
use crate::error::StoreError;
use crate::inventory::{ImportSummary, Order, RedemptionCode};
use crate::ledger::{Balance, GrantDelta, LedgerSummary, TopEarner};

#[derive(Debug, Default)]
struct MemoryState {
    balances: HashMap<String, Balance>,
    orders: HashMap<Uuid, Order>,
    /// Insertion order doubles as allocation order
    codes: Vec<RedemptionCode>,
}

impl MemoryState {
    fn allocate(&mut self, product_id: &str, order_id: Uuid) -> Result<RedemptionCode, StoreError> {
        let code = self
            .codes
            .iter_mut()
            .find(|c| c.product_id == product_id && !c.used)
            .ok_or_else(|| StoreError::OutOfStock(product_id.to_string()))?;
        code.used = true;
        code.order_id = Some(order_id);
        code.consumed_at = Some(Utc::now());
        Ok(code.clone())
    }

    fn owned_order(&mut self, order_id: Uuid, identity: &str) -> Result<&mut Order, StoreError> {
        self.orders
            .get_mut(&order_id)
            .filter(|o| o.identity_id == identity)
            .ok_or(StoreError::NotFound)
    }
}

/// Single-lock store. Every operation runs entirely under the lock, which
/// gives it the same atomicity as one SQL statement or transaction.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a zero balance for `identity` if it has none
    pub fn register_identity(&self, identity: &str) {
        self.state
            .lock()
            .balances
            .entry(identity.to_string())
            .or_insert_with(|| Balance::new(identity));
    }

    /// Add spendable and lifetime points outside the action flow
    pub fn credit(&self, identity: &str, points: i64) {
        let mut state = self.state.lock();
        let balance = state
            .balances
            .entry(identity.to_string())
            .or_insert_with(|| Balance::new(identity));
        balance.points += points;
        balance.lifetime_points += points;
    }

    pub fn balance_of(&self, identity: &str) -> Option<Balance> {
        self.state.lock().balances.get(identity).cloned()
    }
}

#[async_trait]
impl LedgerStore for MemoryStore {
    async fn apply_grant(&self, identity: &str, delta: &GrantDelta) -> Result<Balance, StoreError> {
        let mut state = self.state.lock();
        let balance = state.balances.get_mut(identity).ok_or(StoreError::NotFound)?;
        balance.apply(delta);
        Ok(balance.clone())
    }

    async fn balance(&self, identity: &str) -> Result<Balance, StoreError> {
        self.balance_of(identity).ok_or(StoreError::NotFound)
    }

    async fn ensure_identity(&self, identity: &str) -> Result<Balance, StoreError> {
        self.register_identity(identity);
        self.balance(identity).await
    }

    async fn summary(
        &self,
        active_since: DateTime<Utc>,
        local_date: NaiveDate,
        top: usize,
    ) -> Result<LedgerSummary, StoreError> {
        let state = self.state.lock();
        let mut summary = LedgerSummary::default();

        for balance in state.balances.values() {
            summary.total_identities += 1;
            summary.total_clicks += balance.clicks;
            summary.total_ad_views += balance.ad_views;
            summary.total_points += balance.points;
            if balance.last_activity_at.is_some_and(|at| at >= active_since) {
                summary.active_identities += 1;
            }
            if balance.daily_reset_on == Some(local_date) {
                summary.points_today += balance.daily_points;
            }
        }

        let mut ranked: Vec<&Balance> = state.balances.values().collect();
        ranked.sort_by(|a, b| {
            b.points
                .cmp(&a.points)
                .then_with(|| a.identity_id.cmp(&b.identity_id))
        });
        summary.top_earners = ranked
            .into_iter()
            .take(top)
            .map(|b| TopEarner {
                identity_id: b.identity_id.clone(),
                points: b.points,
                lifetime_points: b.lifetime_points,
                clicks: b.clicks,
            })
            .collect();

        Ok(summary)
    }
}

#[async_trait]
impl InventoryStore for MemoryStore {
    async fn insert_codes(
        &self,
        product_id: &str,
        codes: &[String],
    ) -> Result<ImportSummary, StoreError> {
        let mut state = self.state.lock();
        let mut summary = ImportSummary::default();

        for code in codes {
            let exists = state
                .codes
                .iter()
                .any(|c| c.product_id == product_id && &c.code == code);
            if exists {
                summary.skipped += 1;
                continue;
            }
            state.codes.push(RedemptionCode {
                id: Uuid::new_v4(),
                product_id: product_id.to_string(),
                code: code.clone(),
                used: false,
                order_id: None,
                consumed_at: None,
                created_at: Utc::now(),
            });
            summary.inserted += 1;
        }

        Ok(summary)
    }

    async fn allocate(&self, product_id: &str, order_id: Uuid) -> Result<RedemptionCode, StoreError> {
        self.state.lock().allocate(product_id, order_id)
    }

    async fn fulfill(&self, identity: &str, product_id: &str, cost: i64) -> Result<Order, StoreError> {
        let mut state = self.state.lock();

        let available = state
            .balances
            .get(identity)
            .map(|b| b.points)
            .ok_or(StoreError::NotFound)?;
        if available < cost {
            return Err(StoreError::InsufficientPoints {
                available,
                required: cost,
            });
        }

        // Allocation is the last fallible step, so nothing needs undoing.
        let order_id = Uuid::new_v4();
        let code = state.allocate(product_id, order_id)?;

        if let Some(balance) = state.balances.get_mut(identity) {
            balance.points -= cost;
        }

        let order = Order {
            id: order_id,
            identity_id: identity.to_string(),
            product_id: product_id.to_string(),
            cost,
            code_id: Some(code.id),
            code: Some(code.code),
            revealed: false,
            used: false,
            created_at: Utc::now(),
        };
        state.orders.insert(order_id, order.clone());
        Ok(order)
    }

    async fn mark_revealed(&self, order_id: Uuid, identity: &str) -> Result<Order, StoreError> {
        let mut state = self.state.lock();
        let order = state.owned_order(order_id, identity)?;
        order.revealed = true;
        Ok(order.clone())
    }

    async fn mark_used(&self, order_id: Uuid, identity: &str, used: bool) -> Result<Order, StoreError> {
        let mut state = self.state.lock();
        let order = state.owned_order(order_id, identity)?;
        if order.used && !used {
            return Err(StoreError::InvalidTransition("used codes cannot be marked unused"));
        }
        order.used |= used;
        Ok(order.clone())
    }

    async fn delete_code(&self, code_id: Uuid) -> Result<(), StoreError> {
        let mut state = self.state.lock();
        let index = state
            .codes
            .iter()
            .position(|c| c.id == code_id)
            .ok_or(StoreError::NotFound)?;
        if state.codes[index].used {
            return Err(StoreError::CodeInUse);
        }
        state.codes.remove(index);
        Ok(())
    }

    async fn orders(&self, identity: &str) -> Result<Vec<Order>, StoreError> {
        let state = self.state.lock();
        let mut orders: Vec<Order> = state
            .orders
            .values()
            .filter(|o| o.identity_id == identity)
            .cloned()
            .collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(orders)
    }

    async fn codes(&self, product_id: &str) -> Result<Vec<RedemptionCode>, StoreError> {
        let state = self.state.lock();
        Ok(state
            .codes
            .iter()
            .filter(|c| c.product_id == product_id)
            .cloned()
            .collect())
    }

    async fn available(&self, product_id: &str) -> Result<i64, StoreError> {
        let state = self.state.lock();
        Ok(state
            .codes
            .iter()
            .filter(|c| c.product_id == product_id && !c.used)
            .count() as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::ActionKind;

    #[tokio::test]
    async fn test_missing_identity_leaves_store_untouched() {
        let store = MemoryStore::new();
        let delta = GrantDelta {
            kind: ActionKind::Click,
            points: 10,
            at: Utc::now(),
            local_date: Utc::now().date_naive(),
        };

        assert!(matches!(
            store.apply_grant("ghost", &delta).await,
            Err(StoreError::NotFound)
        ));
        assert!(store.balance_of("ghost").is_none());
    }

    #[tokio::test]
    async fn test_allocate_never_reuses_a_code() {
        let store = MemoryStore::new();
        store
            .insert_codes("gift_card", &["AAAA".to_string(), "BBBB".to_string()])
            .await
            .unwrap();

        let order_id = Uuid::new_v4();
        let first = store.allocate("gift_card", order_id).await.unwrap();
        let second = store.allocate("gift_card", Uuid::new_v4()).await.unwrap();
        assert_ne!(first.id, second.id);
        assert!(first.used);
        assert_eq!(first.order_id, Some(order_id));
        assert!(first.consumed_at.is_some());

        let listed = store.codes("gift_card").await.unwrap();
        assert!(listed.iter().all(|c| c.consumed_at.is_some()));
        assert!(matches!(
            store.allocate("gift_card", Uuid::new_v4()).await,
            Err(StoreError::OutOfStock(_))
        ));
    }

    #[tokio::test]
    async fn test_same_code_allowed_in_other_product() {
        let store = MemoryStore::new();
        let codes = vec!["AAAA".to_string()];
        store.insert_codes("gift_card", &codes).await.unwrap();
        let summary = store.insert_codes("game_credit", &codes).await.unwrap();
        assert_eq!(summary.inserted, 1);
    }
}
