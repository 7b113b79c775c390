// ============================================================================
// Ledger Store Contract
// ============================================================================
//
// The write coordinator talks to the persistent store only through these two
// traits. A unit of work is an all-or-nothing grouping of store operations;
// dropping one without calling `commit` discards everything it wrote.
//
// ============================================================================

pub mod memory;
pub mod mysql;

use crate::core::{NewLedgerEntry, Result};
use async_trait::async_trait;

pub use memory::{FaultPoint, InMemoryLedgerStore};
pub use mysql::MySqlLedgerStore;

#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Open a new atomic unit of work.
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>>;
}

#[async_trait]
pub trait UnitOfWork: Send {
    /// Sum of `amount` over the user's rows visible to this unit of work.
    ///
    /// A user with no rows has an aggregate of zero.
    async fn aggregate(&mut self, user_id: i64) -> Result<i64>;

    async fn insert(&mut self, entry: &NewLedgerEntry) -> Result<()>;

    async fn commit(self: Box<Self>) -> Result<()>;

    async fn rollback(self: Box<Self>) -> Result<()>;
}
