//! PostgreSQL Database Module
//!
//! Store contracts for balances and the code inventory, their PostgreSQL
//! repositories, and an in-memory implementation of the same contracts.

pub mod balances;
pub mod inventory;
pub mod memory;
pub mod pool;
pub mod store;

pub use balances::BalanceRepository;
pub use inventory::InventoryRepository;
pub use memory::MemoryStore;
pub use pool::DatabasePool;
pub use store::{InventoryStore, LedgerStore};
