//! Database Connection Pool using sqlx

use sqlx::postgres::{PgPool, PgPoolOptions};
use std::sync::Arc;
use tracing::info;

use crate::config::DatabaseConfig;
use crate::database::balances::BalanceRepository;
use crate::database::inventory::InventoryRepository;
use crate::error::StoreError;

const SCHEMA: &[(&str, &str)] = &[
    ("rewards schema", "CREATE SCHEMA IF NOT EXISTS rewards"),
    ("inventory schema", "CREATE SCHEMA IF NOT EXISTS inventory"),
    (
        "rewards.balances",
        r#"
        CREATE TABLE IF NOT EXISTS rewards.balances (
            identity_id TEXT PRIMARY KEY,
            points BIGINT NOT NULL DEFAULT 0,
            lifetime_points BIGINT NOT NULL DEFAULT 0,
            clicks BIGINT NOT NULL DEFAULT 0,
            ad_views BIGINT NOT NULL DEFAULT 0,
            daily_points BIGINT NOT NULL DEFAULT 0,
            daily_reset_on DATE,
            last_activity_at TIMESTAMPTZ,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
    ),
    (
        "inventory.codes",
        r#"
        CREATE TABLE IF NOT EXISTS inventory.codes (
            id UUID PRIMARY KEY,
            product_id TEXT NOT NULL,
            code TEXT NOT NULL,
            used BOOLEAN NOT NULL DEFAULT FALSE,
            order_id UUID UNIQUE,
            consumed_at TIMESTAMPTZ,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            UNIQUE (product_id, code)
        )
        "#,
    ),
    (
        "codes consumed_at",
        "ALTER TABLE inventory.codes ADD COLUMN IF NOT EXISTS consumed_at TIMESTAMPTZ",
    ),
    (
        "inventory.orders",
        r#"
        CREATE TABLE IF NOT EXISTS inventory.orders (
            id UUID PRIMARY KEY,
            identity_id TEXT NOT NULL,
            product_id TEXT NOT NULL,
            cost BIGINT NOT NULL,
            code_id UUID UNIQUE REFERENCES inventory.codes (id),
            revealed BOOLEAN NOT NULL DEFAULT FALSE,
            used BOOLEAN NOT NULL DEFAULT FALSE,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
    ),
    (
        "orders identity index",
        "CREATE INDEX IF NOT EXISTS orders_identity_created_idx \
         ON inventory.orders (identity_id, created_at DESC)",
    ),
    (
        "codes availability index",
        "CREATE INDEX IF NOT EXISTS codes_product_unused_idx \
         ON inventory.codes (product_id, created_at) WHERE used = FALSE",
    ),
];

pub struct DatabasePool {
    pool: PgPool,
    balances: Arc<BalanceRepository>,
    inventory: Arc<InventoryRepository>,
}

impl DatabasePool {
    pub async fn new(config: &DatabaseConfig) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect(&config.postgres_url)
            .await
            .map_err(|e| StoreError::Unavailable(format!("Failed to connect to PostgreSQL: {}", e)))?;

        info!("Connected to PostgreSQL");

        Ok(Self {
            balances: Arc::new(BalanceRepository::new(pool.clone())),
            inventory: Arc::new(InventoryRepository::new(pool.clone())),
            pool,
        })
    }

    pub async fn init_schema(&self) -> Result<(), StoreError> {
        info!("Initializing database schema...");

        for (name, ddl) in SCHEMA {
            sqlx::query(ddl)
                .execute(&self.pool)
                .await
                .map_err(|e| StoreError::Unavailable(format!("Failed to create {}: {}", name, e)))?;
        }

        info!("Database schema initialized");
        Ok(())
    }

    pub fn balances(&self) -> Arc<BalanceRepository> {
        self.balances.clone()
    }

    pub fn inventory(&self) -> Arc<InventoryRepository> {
        self.inventory.clone()
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}
