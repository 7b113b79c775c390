use thiserror::Error;

/// Failures reported by a [`LedgerStore`](crate::storage::LedgerStore) backend.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Query error: {0}")]
    Query(String),

    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    #[error("Transaction error: {0}")]
    Transaction(String),

    #[error("Lock error: {0}")]
    LockError(String),

    #[error("Injected fault: {0}")]
    Injected(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;

impl<T> From<std::sync::PoisonError<T>> for StoreError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        Self::LockError(err.to_string())
    }
}

/// Which stage of the write protocol failed.
///
/// Carried by [`Outcome::InternalFailure`](super::Outcome::InternalFailure) for
/// server-side logging. Never rendered into a response body.
#[derive(Error, Debug)]
pub enum FailureCause {
    #[error("failed to begin unit of work: {0}")]
    Begin(#[source] StoreError),

    #[error("failed to read aggregate: {0}")]
    Aggregate(#[source] StoreError),

    #[error("failed to insert ledger entry: {0}")]
    Insert(#[source] StoreError),

    #[error("failed to commit unit of work: {0}")]
    Commit(#[source] StoreError),

    #[error("panic inside write section: {0}")]
    Panic(String),

    #[error("write section task did not finish: {0}")]
    Interrupted(String),
}

impl FailureCause {
    pub fn stage(&self) -> &'static str {
        match self {
            Self::Begin(_) => "begin",
            Self::Aggregate(_) => "aggregate",
            Self::Insert(_) => "insert",
            Self::Commit(_) => "commit",
            Self::Panic(_) => "panic",
            Self::Interrupted(_) => "interrupted",
        }
    }
}
