//! Inventory Repository - PostgreSQL operations for codes and orders using sqlx

use async_trait::async_trait;
use chrono::Utc;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use tracing::debug;
use uuid::Uuid;

use crate::database::InventoryStore;
use crate::error::StoreError;
use crate::inventory::{ImportSummary, Order, RedemptionCode};

/// Order columns joined with the bound code value; `o` is the order relation
const ORDER_SELECT: &str = "o.id, o.identity_id, o.product_id, o.cost, o.code_id, c.code, \
                            o.revealed, o.used, o.created_at";

fn order_from_row(row: &PgRow) -> Order {
    Order {
        id: row.get("id"),
        identity_id: row.get("identity_id"),
        product_id: row.get("product_id"),
        cost: row.get("cost"),
        code_id: row.get("code_id"),
        code: row.get("code"),
        revealed: row.get("revealed"),
        used: row.get("used"),
        created_at: row.get("created_at"),
    }
}

fn code_from_row(row: &PgRow) -> RedemptionCode {
    RedemptionCode {
        id: row.get("id"),
        product_id: row.get("product_id"),
        code: row.get("code"),
        used: row.get("used"),
        order_id: row.get("order_id"),
        consumed_at: row.get("consumed_at"),
        created_at: row.get("created_at"),
    }
}

/// Claims the oldest unused code of a product. Concurrent allocators skip
/// rows another transaction holds instead of waiting on them.
const ALLOCATE_SQL: &str = r#"
    UPDATE inventory.codes
    SET used = TRUE, order_id = $2, consumed_at = NOW()
    WHERE id = (
        SELECT id FROM inventory.codes
        WHERE product_id = $1 AND used = FALSE
        ORDER BY created_at, id
        LIMIT 1
        FOR UPDATE SKIP LOCKED
    )
    RETURNING id, product_id, code, used, order_id, consumed_at, created_at
"#;

pub struct InventoryRepository {
    pool: PgPool,
}

impl InventoryRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Conditional flag update scoped by order id and owner
    async fn set_order_flag(
        &self,
        column: &'static str,
        order_id: Uuid,
        identity: &str,
    ) -> Result<Order, StoreError> {
        let row = sqlx::query(&format!(
            r#"
            WITH o AS (
                UPDATE inventory.orders
                SET {column} = TRUE
                WHERE id = $1 AND identity_id = $2
                RETURNING *
            )
            SELECT {ORDER_SELECT}
            FROM o LEFT JOIN inventory.codes c ON c.id = o.code_id
            "#
        ))
        .bind(order_id)
        .bind(identity)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(StoreError::NotFound)?;

        Ok(order_from_row(&row))
    }

    async fn owned_order(&self, order_id: Uuid, identity: &str) -> Result<Order, StoreError> {
        let row = sqlx::query(&format!(
            r#"
            SELECT {ORDER_SELECT}
            FROM inventory.orders o LEFT JOIN inventory.codes c ON c.id = o.code_id
            WHERE o.id = $1 AND o.identity_id = $2
            "#
        ))
        .bind(order_id)
        .bind(identity)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(StoreError::NotFound)?;

        Ok(order_from_row(&row))
    }
}

#[async_trait]
impl InventoryStore for InventoryRepository {
    async fn insert_codes(
        &self,
        product_id: &str,
        codes: &[String],
    ) -> Result<ImportSummary, StoreError> {
        let mut tx = self.pool.begin().await?;
        let mut summary = ImportSummary::default();

        for code in codes {
            let result = sqlx::query(
                r#"
                INSERT INTO inventory.codes (id, product_id, code, used, created_at)
                VALUES ($1, $2, $3, FALSE, $4)
                ON CONFLICT (product_id, code) DO NOTHING
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(product_id)
            .bind(code)
            .bind(Utc::now())
            .execute(&mut *tx)
            .await?;

            if result.rows_affected() == 0 {
                summary.skipped += 1;
            } else {
                summary.inserted += 1;
            }
        }

        tx.commit().await?;
        Ok(summary)
    }

    async fn allocate(&self, product_id: &str, order_id: Uuid) -> Result<RedemptionCode, StoreError> {
        let row = sqlx::query(ALLOCATE_SQL)
            .bind(product_id)
            .bind(order_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StoreError::OutOfStock(product_id.to_string()))?;

        Ok(code_from_row(&row))
    }

    async fn fulfill(&self, identity: &str, product_id: &str, cost: i64) -> Result<Order, StoreError> {
        let mut tx = self.pool.begin().await?;

        let debited = sqlx::query(
            r#"
            UPDATE rewards.balances
            SET points = points - $2
            WHERE identity_id = $1 AND points >= $2
            RETURNING points
            "#,
        )
        .bind(identity)
        .bind(cost)
        .fetch_optional(&mut *tx)
        .await?;

        if debited.is_none() {
            let current = sqlx::query("SELECT points FROM rewards.balances WHERE identity_id = $1")
                .bind(identity)
                .fetch_optional(&mut *tx)
                .await?;
            tx.rollback().await?;
            return Err(match current {
                Some(row) => StoreError::InsufficientPoints {
                    available: row.get("points"),
                    required: cost,
                },
                None => StoreError::NotFound,
            });
        }

        let order_id = Uuid::new_v4();
        let code = match sqlx::query(ALLOCATE_SQL)
            .bind(product_id)
            .bind(order_id)
            .fetch_optional(&mut *tx)
            .await?
        {
            Some(row) => code_from_row(&row),
            None => {
                tx.rollback().await?;
                return Err(StoreError::OutOfStock(product_id.to_string()));
            }
        };

        let row = sqlx::query(
            r#"
            INSERT INTO inventory.orders
            (id, identity_id, product_id, cost, code_id, revealed, used, created_at)
            VALUES ($1, $2, $3, $4, $5, FALSE, FALSE, $6)
            RETURNING id, identity_id, product_id, cost, code_id, revealed, used, created_at
            "#,
        )
        .bind(order_id)
        .bind(identity)
        .bind(product_id)
        .bind(cost)
        .bind(code.id)
        .bind(Utc::now())
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        debug!(order_id = %order_id, code_id = %code.id, "Order committed");

        Ok(Order {
            id: row.get("id"),
            identity_id: row.get("identity_id"),
            product_id: row.get("product_id"),
            cost: row.get("cost"),
            code_id: row.get("code_id"),
            code: Some(code.code),
            revealed: row.get("revealed"),
            used: row.get("used"),
            created_at: row.get("created_at"),
        })
    }

    async fn mark_revealed(&self, order_id: Uuid, identity: &str) -> Result<Order, StoreError> {
        self.set_order_flag("revealed", order_id, identity).await
    }

    async fn mark_used(&self, order_id: Uuid, identity: &str, used: bool) -> Result<Order, StoreError> {
        if used {
            return self.set_order_flag("used", order_id, identity).await;
        }
        let order = self.owned_order(order_id, identity).await?;
        if order.used {
            return Err(StoreError::InvalidTransition("used codes cannot be marked unused"));
        }
        Ok(order)
    }

    async fn delete_code(&self, code_id: Uuid) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM inventory.codes WHERE id = $1 AND used = FALSE")
            .bind(code_id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() > 0 {
            return Ok(());
        }

        let exists = sqlx::query("SELECT 1 FROM inventory.codes WHERE id = $1")
            .bind(code_id)
            .fetch_optional(&self.pool)
            .await?;
        Err(if exists.is_some() {
            StoreError::CodeInUse
        } else {
            StoreError::NotFound
        })
    }

    async fn orders(&self, identity: &str) -> Result<Vec<Order>, StoreError> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {ORDER_SELECT}
            FROM inventory.orders o LEFT JOIN inventory.codes c ON c.id = o.code_id
            WHERE o.identity_id = $1
            ORDER BY o.created_at DESC
            "#
        ))
        .bind(identity)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(order_from_row).collect())
    }

    async fn codes(&self, product_id: &str) -> Result<Vec<RedemptionCode>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, product_id, code, used, order_id, consumed_at, created_at
            FROM inventory.codes
            WHERE product_id = $1
            ORDER BY created_at, id
            "#,
        )
        .bind(product_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(code_from_row).collect())
    }

    async fn available(&self, product_id: &str) -> Result<i64, StoreError> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS available FROM inventory.codes WHERE product_id = $1 AND used = FALSE",
        )
        .bind(product_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.get("available"))
    }
}
