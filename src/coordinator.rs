// ============================================================================
// Ledger Write Coordinator
// ============================================================================
//
// Every submission runs begin -> aggregate -> cap check -> insert -> commit
// while holding one process-wide lock, so no two writers can interleave the
// read of a user's aggregate with another writer's insert. The lock covers
// all users, which is a superset of the per-user exclusion the cap needs.
//
// Once the lock is acquired the section runs in its own task that owns the
// guard. Dropping the caller's future (client disconnect, timeout) cannot
// release the lock while a statement is still in flight.
//
// ============================================================================

use crate::core::{
    DEFAULT_AMOUNT_LIMIT, FailureCause, NewLedgerEntry, Outcome, StoreError, TransactionRequest,
    within_cap,
};
use crate::storage::{LedgerStore, UnitOfWork};
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{Instrument, debug, error, info};

/// Cheap to clone; clones share the store and the write section.
#[derive(Clone)]
pub struct WriteCoordinator {
    store: Arc<dyn LedgerStore>,
    cap: i64,
    /// Exclusive section guarding steps begin..commit
    write_lock: Arc<Mutex<()>>,
}

impl WriteCoordinator {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self::with_cap(store, DEFAULT_AMOUNT_LIMIT)
    }

    pub fn with_cap(store: Arc<dyn LedgerStore>, cap: i64) -> Self {
        Self {
            store,
            cap,
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn cap(&self) -> i64 {
        self.cap
    }

    /// Record `request` if it keeps the user's total within the cap.
    ///
    /// Never panics and never leaves a unit of work open: store errors and
    /// panics raised inside the exclusive section are rolled back, logged and
    /// reported as [`Outcome::InternalFailure`].
    ///
    /// Cancelling the returned future before the section is entered abandons
    /// the request. After that the section runs to completion in the
    /// background and only the caller's view of the outcome is lost.
    #[tracing::instrument(
        name = "submit",
        skip(self, request),
        fields(user_id = request.user_id, amount = request.amount)
    )]
    pub async fn submit(&self, request: TransactionRequest) -> Outcome {
        let section = Arc::clone(&self.write_lock).lock_owned().await;

        let coordinator = self.clone();
        let task = tokio::spawn(
            async move { coordinator.run_section(section, request).await }.in_current_span(),
        );

        match task.await {
            Ok(outcome) => outcome,
            Err(err) if err.is_panic() => {
                let message = panic_message(err.into_panic().as_ref());
                error!(panic = %message, "write section task panicked");
                Outcome::InternalFailure(FailureCause::Panic(message))
            }
            Err(err) => {
                error!(error = %err, "write section task was cancelled");
                Outcome::InternalFailure(FailureCause::Interrupted(err.to_string()))
            }
        }
    }

    /// Runs the decision procedure while `_section` is held, then logs the
    /// outcome. The guard is released when this returns.
    async fn run_section(
        &self,
        _section: OwnedMutexGuard<()>,
        request: TransactionRequest,
    ) -> Outcome {
        let user_id = request.user_id;

        let mut open_unit: Option<Box<dyn UnitOfWork>> = None;
        let decided = AssertUnwindSafe(self.decide(request, &mut open_unit))
            .catch_unwind()
            .await;

        let outcome = match decided {
            Ok(outcome) => outcome,
            Err(payload) => {
                if let Some(unit) = open_unit.take() {
                    roll_back(unit, user_id).await;
                }
                Outcome::InternalFailure(FailureCause::Panic(panic_message(payload.as_ref())))
            }
        };

        match &outcome {
            Outcome::Created => debug!(user_id, "transaction committed"),
            Outcome::CapExceeded { cap } => {
                info!(user_id, cap, "transaction rejected, cap exceeded")
            }
            Outcome::InternalFailure(cause) => error!(
                user_id,
                stage = cause.stage(),
                error = %cause,
                "transaction failed"
            ),
        }

        outcome
    }

    /// The transactional decision procedure. Runs inside the exclusive section.
    ///
    /// The open unit of work lives in `open_unit` so the caller can still roll
    /// it back if this future panics.
    async fn decide(
        &self,
        request: TransactionRequest,
        open_unit: &mut Option<Box<dyn UnitOfWork>>,
    ) -> Outcome {
        let user_id = request.user_id;

        let unit = match self.store.begin().await {
            Ok(unit) => open_unit.insert(unit),
            Err(err) => return Outcome::InternalFailure(FailureCause::Begin(err)),
        };

        let aggregate = match unit.aggregate(user_id).await {
            Ok(aggregate) => aggregate,
            Err(err) => {
                abort(open_unit, user_id).await;
                return Outcome::InternalFailure(FailureCause::Aggregate(err));
            }
        };

        if !within_cap(aggregate, request.amount, self.cap) {
            abort(open_unit, user_id).await;
            return Outcome::CapExceeded { cap: self.cap };
        }

        let entry = NewLedgerEntry::from(request);
        if let Err(err) = unit.insert(&entry).await {
            abort(open_unit, user_id).await;
            return Outcome::InternalFailure(FailureCause::Insert(err));
        }

        // Commit consumes the unit; a failed commit is discarded by the store.
        let Some(unit) = open_unit.take() else {
            return Outcome::InternalFailure(FailureCause::Commit(StoreError::Transaction(
                "no open unit of work to commit".into(),
            )));
        };
        match unit.commit().await {
            Ok(()) => Outcome::Created,
            Err(err) => Outcome::InternalFailure(FailureCause::Commit(err)),
        }
    }
}

async fn abort(open_unit: &mut Option<Box<dyn UnitOfWork>>, user_id: i64) {
    if let Some(unit) = open_unit.take() {
        roll_back(unit, user_id).await;
    }
}

/// Best-effort rollback. Failures are logged and never change the outcome.
async fn roll_back(unit: Box<dyn UnitOfWork>, user_id: i64) {
    match AssertUnwindSafe(unit.rollback()).catch_unwind().await {
        Ok(Ok(())) => debug!(user_id, "unit of work rolled back"),
        Ok(Err(err)) => error!(user_id, error = %err, "rollback failed"),
        Err(payload) => error!(
            user_id,
            panic = %panic_message(payload.as_ref()),
            "rollback panicked"
        ),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{FaultPoint, InMemoryLedgerStore};

    fn request(user_id: i64, amount: i64) -> TransactionRequest {
        TransactionRequest {
            user_id,
            amount,
            description: "test".to_string(),
        }
    }

    #[test]
    fn test_panic_message_extraction() {
        let owned: Box<dyn Any + Send> = Box::new(String::from("owned"));
        let borrowed: Box<dyn Any + Send> = Box::new("borrowed");
        let other: Box<dyn Any + Send> = Box::new(7u8);

        assert_eq!(panic_message(owned.as_ref()), "owned");
        assert_eq!(panic_message(borrowed.as_ref()), "borrowed");
        assert_eq!(panic_message(other.as_ref()), "unknown panic payload");
    }

    #[tokio::test]
    async fn test_custom_cap_is_reported() {
        let store = InMemoryLedgerStore::new();
        let coordinator = WriteCoordinator::with_cap(Arc::new(store.clone()), 50);

        assert!(coordinator.submit(request(1, 50)).await.is_created());
        match coordinator.submit(request(1, 1)).await {
            Outcome::CapExceeded { cap } => assert_eq!(cap, 50),
            other => panic!("expected cap rejection, got {other:?}"),
        }
        assert_eq!(store.committed_total(1).await, 50);
    }

    #[tokio::test]
    async fn test_failure_cause_records_stage() {
        let store = InMemoryLedgerStore::new();
        let coordinator = WriteCoordinator::new(Arc::new(store.clone()));

        store.inject(FaultPoint::Aggregate).unwrap();
        match coordinator.submit(request(1, 10)).await {
            Outcome::InternalFailure(cause) => assert_eq!(cause.stage(), "aggregate"),
            other => panic!("expected internal failure, got {other:?}"),
        }
    }
}
