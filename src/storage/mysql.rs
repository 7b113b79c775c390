use super::{LedgerStore, UnitOfWork};
use crate::core::{NewLedgerEntry, Result, StoreError};
use async_trait::async_trait;
use sqlx::mysql::{MySql, MySqlPool, MySqlPoolOptions};
use std::time::Duration;

const AGGREGATE_SQL: &str =
    "SELECT CAST(COALESCE(SUM(amount), 0) AS SIGNED) FROM transactions WHERE user_id = ?";

const INSERT_SQL: &str =
    "INSERT INTO transactions (user_id, amount, description) VALUES (?, ?, ?)";

/// Ledger store backed by a MySQL-compatible server.
///
/// Expects a `transactions` table with `user_id`, `amount` and `description`
/// columns (see `sql/schema.sql`).
#[derive(Clone)]
pub struct MySqlLedgerStore {
    pool: MySqlPool,
}

impl MySqlLedgerStore {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    pub async fn connect(
        database_url: &str,
        max_connections: u32,
        acquire_timeout: Duration,
    ) -> Result<Self> {
        let pool = MySqlPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(acquire_timeout)
            .connect(database_url)
            .await
            .map_err(map_sqlx_error)?;

        Ok(Self::new(pool))
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl LedgerStore for MySqlLedgerStore {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>> {
        let tx = self.pool.begin().await.map_err(map_sqlx_error)?;
        Ok(Box::new(MySqlUnitOfWork { tx }))
    }
}

/// Wraps a sqlx transaction, which rolls back on drop if never committed.
struct MySqlUnitOfWork {
    tx: sqlx::Transaction<'static, MySql>,
}

#[async_trait]
impl UnitOfWork for MySqlUnitOfWork {
    async fn aggregate(&mut self, user_id: i64) -> Result<i64> {
        sqlx::query_scalar::<_, i64>(AGGREGATE_SQL)
            .bind(user_id)
            .fetch_one(&mut *self.tx)
            .await
            .map_err(map_sqlx_error)
    }

    async fn insert(&mut self, entry: &NewLedgerEntry) -> Result<()> {
        sqlx::query(INSERT_SQL)
            .bind(entry.user_id)
            .bind(entry.amount)
            .bind(&entry.description)
            .execute(&mut *self.tx)
            .await
            .map_err(map_sqlx_error)?;

        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        self.tx
            .commit()
            .await
            .map_err(|err| StoreError::Transaction(err.to_string()))
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        self.tx
            .rollback()
            .await
            .map_err(|err| StoreError::Transaction(err.to_string()))
    }
}

fn map_sqlx_error(error: sqlx::Error) -> StoreError {
    match error {
        sqlx::Error::Database(db_error) => {
            if db_error.is_unique_violation()
                || db_error.is_foreign_key_violation()
                || db_error.is_check_violation()
            {
                StoreError::ConstraintViolation(db_error.to_string())
            } else {
                StoreError::Query(db_error.to_string())
            }
        }
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
            StoreError::Connection(error.to_string())
        }
        other => StoreError::Query(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_errors_map_to_connection_errors() {
        assert!(matches!(
            map_sqlx_error(sqlx::Error::PoolTimedOut),
            StoreError::Connection(_)
        ));
        assert!(matches!(
            map_sqlx_error(sqlx::Error::PoolClosed),
            StoreError::Connection(_)
        ));
    }

    #[test]
    fn decode_errors_map_to_query_errors() {
        assert!(matches!(
            map_sqlx_error(sqlx::Error::RowNotFound),
            StoreError::Query(_)
        ));
    }
}
