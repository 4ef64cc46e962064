//! Code Inventory - allocation, reveal and consumption of redemption codes

use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::database::InventoryStore;
use crate::error::StoreError;
use crate::inventory::{normalize_codes, ImportSummary, Order, RedemptionCode};

pub struct CodeInventory {
    store: Arc<dyn InventoryStore>,
}

impl CodeInventory {
    pub fn new(store: Arc<dyn InventoryStore>) -> Self {
        Self { store }
    }

    /// Bulk import from newline-separated text
    pub async fn import_codes(
        &self,
        product_id: &str,
        raw: &str,
    ) -> Result<ImportSummary, StoreError> {
        let (codes, repeats) = normalize_codes(raw.lines());
        let mut summary = self.store.insert_codes(product_id, &codes).await?;
        summary.skipped += repeats;

        info!(
            product_id,
            inserted = summary.inserted,
            skipped = summary.skipped,
            "Redemption codes imported"
        );
        Ok(summary)
    }

    /// Claim one unused code of `product_id` for `order_id`
    pub async fn allocate(
        &self,
        product_id: &str,
        order_id: Uuid,
    ) -> Result<RedemptionCode, StoreError> {
        let code = self.store.allocate(product_id, order_id).await?;
        debug!(product_id, order_id = %order_id, code_id = %code.id, "Code allocated");
        Ok(code)
    }

    /// Debit `cost`, create the order and bind a code to it, all or nothing
    pub async fn fulfill(
        &self,
        identity: &str,
        product_id: &str,
        cost: i64,
    ) -> Result<Order, StoreError> {
        if cost <= 0 {
            return Err(StoreError::InvalidAmount(cost));
        }
        let order = self.store.fulfill(identity, product_id, cost).await?;
        info!(product_id, order_id = %order.id, cost, "Order fulfilled");
        Ok(order.redacted())
    }

    /// Mark the order revealed and return it with its code
    pub async fn reveal(&self, order_id: Uuid, identity: &str) -> Result<Order, StoreError> {
        self.store.mark_revealed(order_id, identity).await
    }

    pub async fn set_consumed(
        &self,
        order_id: Uuid,
        identity: &str,
        used: bool,
    ) -> Result<Order, StoreError> {
        let order = self.store.mark_used(order_id, identity, used).await?;
        Ok(order.redacted())
    }

    pub async fn delete_code(&self, code_id: Uuid) -> Result<(), StoreError> {
        self.store.delete_code(code_id).await?;
        info!(code_id = %code_id, "Redemption code deleted");
        Ok(())
    }

    /// Purchases of `identity`, newest first
    pub async fn orders(&self, identity: &str) -> Result<Vec<Order>, StoreError> {
        let orders = self.store.orders(identity).await?;
        Ok(orders.into_iter().map(Order::redacted).collect())
    }

    pub async fn codes(&self, product_id: &str) -> Result<Vec<RedemptionCode>, StoreError> {
        self.store.codes(product_id).await
    }

    pub async fn available(&self, product_id: &str) -> Result<i64, StoreError> {
        self.store.available(product_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::MemoryStore;

    async fn stocked(codes: &str) -> (Arc<MemoryStore>, CodeInventory) {
        let store = Arc::new(MemoryStore::new());
        store.register_identity("user_1");
        store.credit("user_1", 1000);
        let inventory = CodeInventory::new(store.clone());
        inventory.import_codes("gift_card", codes).await.unwrap();
        (store, inventory)
    }

    #[tokio::test]
    async fn test_import_reports_duplicates() {
        let (_, inventory) = stocked("AAAA\nBBBB").await;
        let summary = inventory
            .import_codes("gift_card", "BBBB\nCCCC\n\nCCCC\n")
            .await
            .unwrap();

        assert_eq!(summary, ImportSummary { inserted: 1, skipped: 2 });
        assert_eq!(inventory.available("gift_card").await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_fulfill_debits_and_binds_code() {
        let (store, inventory) = stocked("AAAA").await;
        let order = inventory.fulfill("user_1", "gift_card", 400).await.unwrap();

        assert!(order.code_id.is_some());
        assert!(order.code.is_none());
        assert_eq!(store.balance_of("user_1").unwrap().points, 600);
        assert_eq!(store.balance_of("user_1").unwrap().lifetime_points, 1000);
        assert_eq!(inventory.available("gift_card").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_fulfill_rolls_back_when_out_of_stock() {
        let (store, inventory) = stocked("AAAA").await;
        inventory.fulfill("user_1", "gift_card", 100).await.unwrap();

        let err = inventory.fulfill("user_1", "gift_card", 100).await.unwrap_err();
        assert!(matches!(err, StoreError::OutOfStock(_)));
        assert_eq!(store.balance_of("user_1").unwrap().points, 900);
        assert_eq!(inventory.orders("user_1").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_fulfill_insufficient_points() {
        let (_, inventory) = stocked("AAAA").await;
        let err = inventory.fulfill("user_1", "gift_card", 5000).await.unwrap_err();
        assert!(matches!(
            err,
            StoreError::InsufficientPoints { available: 1000, required: 5000 }
        ));
        assert_eq!(inventory.available("gift_card").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_reveal_and_consume() {
        let (_, inventory) = stocked("AAAA").await;
        let order = inventory.fulfill("user_1", "gift_card", 100).await.unwrap();

        let revealed = inventory.reveal(order.id, "user_1").await.unwrap();
        assert_eq!(revealed.code.as_deref(), Some("AAAA"));

        let used = inventory.set_consumed(order.id, "user_1", true).await.unwrap();
        assert!(used.used);

        // Setting it again is a no-op
        assert!(inventory.set_consumed(order.id, "user_1", true).await.unwrap().used);

        let err = inventory.set_consumed(order.id, "user_1", false).await.unwrap_err();
        assert!(matches!(err, StoreError::InvalidTransition(_)));
    }

    #[tokio::test]
    async fn test_foreign_order_is_not_found() {
        let (store, inventory) = stocked("AAAA").await;
        store.register_identity("user_2");
        let order = inventory.fulfill("user_1", "gift_card", 100).await.unwrap();

        let err = inventory.reveal(order.id, "user_2").await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound));
        assert!(inventory.orders("user_1").await.unwrap()[0].code.is_none());
    }

    #[tokio::test]
    async fn test_delete_only_unused_codes() {
        let (_, inventory) = stocked("AAAA\nBBBB").await;
        inventory.fulfill("user_1", "gift_card", 100).await.unwrap();

        let codes = inventory.codes("gift_card").await.unwrap();
        let used = codes.iter().find(|c| c.used).unwrap();
        let unused = codes.iter().find(|c| !c.used).unwrap();

        assert!(matches!(
            inventory.delete_code(used.id).await.unwrap_err(),
            StoreError::CodeInUse
        ));
        inventory.delete_code(unused.id).await.unwrap();
        assert!(matches!(
            inventory.delete_code(unused.id).await.unwrap_err(),
            StoreError::NotFound
        ));
    }
}
