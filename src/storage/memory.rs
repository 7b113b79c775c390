use super::{LedgerStore, UnitOfWork};
use crate::core::{LedgerEntry, NewLedgerEntry, Result, StoreError};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::RwLock;

/// Store operation that can be made to fail on demand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FaultPoint {
    Begin,
    Aggregate,
    Insert,
    Commit,
    Rollback,
    /// Panics instead of returning an error.
    PanicOnInsert,
}

impl fmt::Display for FaultPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FaultPoint::Begin => "begin",
            FaultPoint::Aggregate => "aggregate",
            FaultPoint::Insert => "insert",
            FaultPoint::Commit => "commit",
            FaultPoint::Rollback => "rollback",
            FaultPoint::PanicOnInsert => "panic-on-insert",
        };
        f.write_str(name)
    }
}

/// In-process transactional ledger store.
///
/// Units of work buffer their inserts and publish them atomically on commit,
/// so uncommitted rows are never visible to other units of work. Cloning
/// shares the underlying rows.
#[derive(Clone, Default)]
pub struct InMemoryLedgerStore {
    /// Committed rows in commit order
    rows: Arc<RwLock<Vec<LedgerEntry>>>,
    next_id: Arc<AtomicU64>,
    /// Faults armed for the next matching operation
    faults: Arc<Mutex<HashSet<FaultPoint>>>,
}

impl InMemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm a fault. It fires once, on the next matching operation.
    pub fn inject(&self, fault: FaultPoint) -> Result<()> {
        self.faults.lock()?.insert(fault);
        Ok(())
    }

    /// Disarm every pending fault.
    pub fn clear_faults(&self) -> Result<()> {
        self.faults.lock()?.clear();
        Ok(())
    }

    pub async fn entries(&self) -> Vec<LedgerEntry> {
        self.rows.read().await.clone()
    }

    pub async fn entries_for(&self, user_id: i64) -> Vec<LedgerEntry> {
        self.rows
            .read()
            .await
            .iter()
            .filter(|entry| entry.user_id == user_id)
            .cloned()
            .collect()
    }

    /// Sum of committed amounts for `user_id`.
    pub async fn committed_total(&self, user_id: i64) -> i64 {
        self.rows
            .read()
            .await
            .iter()
            .filter(|entry| entry.user_id == user_id)
            .map(|entry| entry.amount)
            .sum()
    }

    fn take_fault(&self, fault: FaultPoint) -> Result<bool> {
        Ok(self.faults.lock()?.remove(&fault))
    }

    fn fail_if_armed(&self, fault: FaultPoint) -> Result<()> {
        if self.take_fault(fault)? {
            return Err(StoreError::Injected(format!("{} failure", fault)));
        }
        Ok(())
    }
}

#[async_trait]
impl LedgerStore for InMemoryLedgerStore {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>> {
        self.fail_if_armed(FaultPoint::Begin)?;
        Ok(Box::new(MemoryUnitOfWork {
            store: self.clone(),
            pending: Vec::new(),
            state: UnitState::Active,
        }))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum UnitState {
    Active,
    Committed,
    RolledBack,
}

struct MemoryUnitOfWork {
    store: InMemoryLedgerStore,
    pending: Vec<NewLedgerEntry>,
    state: UnitState,
}

impl MemoryUnitOfWork {
    fn ensure_active(&self) -> Result<()> {
        if self.state != UnitState::Active {
            return Err(StoreError::Transaction("Unit of work is not active".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl UnitOfWork for MemoryUnitOfWork {
    async fn aggregate(&mut self, user_id: i64) -> Result<i64> {
        self.ensure_active()?;
        self.store.fail_if_armed(FaultPoint::Aggregate)?;

        let rows = self.store.rows.read().await;
        let committed = rows
            .iter()
            .filter(|entry| entry.user_id == user_id)
            .map(|entry| entry.amount);
        let pending = self
            .pending
            .iter()
            .filter(|entry| entry.user_id == user_id)
            .map(|entry| entry.amount);

        committed
            .chain(pending)
            .try_fold(0i64, |total, amount| total.checked_add(amount))
            .ok_or_else(|| StoreError::Query(format!("SUM(amount) overflow for user {}", user_id)))
    }

    async fn insert(&mut self, entry: &NewLedgerEntry) -> Result<()> {
        self.ensure_active()?;
        if self.store.take_fault(FaultPoint::PanicOnInsert)? {
            panic!("injected panic while inserting for user {}", entry.user_id);
        }
        self.store.fail_if_armed(FaultPoint::Insert)?;

        self.pending.push(entry.clone());
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let mut this = self;
        this.ensure_active()?;
        // A failed commit leaves the unit active; dropping it discards the rows.
        this.store.fail_if_armed(FaultPoint::Commit)?;

        let pending = std::mem::take(&mut this.pending);
        {
            let mut rows = this.store.rows.write().await;
            for entry in pending {
                rows.push(LedgerEntry {
                    id: this.store.next_id.fetch_add(1, Ordering::SeqCst) + 1,
                    user_id: entry.user_id,
                    amount: entry.amount,
                    description: entry.description,
                    created_at: Utc::now(),
                });
            }
        }
        this.state = UnitState::Committed;

        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        let mut this = self;
        this.ensure_active()?;
        this.pending.clear();
        this.state = UnitState::RolledBack;
        this.store.fail_if_armed(FaultPoint::Rollback)
    }
}

impl Drop for MemoryUnitOfWork {
    fn drop(&mut self) {
        if self.state == UnitState::Active && !self.pending.is_empty() {
            tracing::debug!(
                discarded = self.pending.len(),
                "unit of work dropped without commit, discarding pending rows"
            );
        }
    }
}
