// ============================================================================
// Bounded Ledger Library
// ============================================================================

pub mod config;
pub mod coordinator;
pub mod core;
pub mod storage;
pub mod web;

// Re-export main types for convenience
pub use crate::config::{AppConfig, ConfigError, StoreUrl};
pub use coordinator::WriteCoordinator;
pub use crate::core::{
    DEFAULT_AMOUNT_LIMIT, FailureCause, LedgerEntry, NewLedgerEntry, Outcome, StoreError,
    TransactionRequest,
};
pub use storage::{FaultPoint, InMemoryLedgerStore, LedgerStore, MySqlLedgerStore, UnitOfWork};
pub use web::{AppState, WebError, build_router};

use std::sync::Arc;

/// Open the store named by `config` and wrap it in a coordinator.
///
/// # Examples
///
/// ```
/// # use bounded_ledger::{AppConfig, open_coordinator};
/// # use clap::Parser;
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let config = AppConfig::try_parse_from(["bounded-ledger", "--database-url", "memory://"])?;
/// let coordinator = open_coordinator(&config).await?;
/// assert_eq!(coordinator.cap(), 1000);
/// # Ok(())
/// # }
/// ```
pub async fn open_coordinator(config: &AppConfig) -> anyhow::Result<Arc<WriteCoordinator>> {
    config.validate()?;

    let store: Arc<dyn LedgerStore> = match config.store_url()? {
        StoreUrl::Memory => Arc::new(InMemoryLedgerStore::new()),
        StoreUrl::MySql(url) => Arc::new(
            MySqlLedgerStore::connect(&url, config.db_max_connections, config.acquire_timeout())
                .await?,
        ),
    };

    Ok(Arc::new(WriteCoordinator::with_cap(store, config.amount_limit)))
}
