pub mod error;
pub mod types;

pub use error::{FailureCause, Result, StoreError};
pub use types::{
    DEFAULT_AMOUNT_LIMIT, LedgerEntry, NewLedgerEntry, Outcome, TransactionRequest, within_cap,
};
