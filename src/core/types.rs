use super::FailureCause;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Ceiling on the sum of committed amounts for any single user.
pub const DEFAULT_AMOUNT_LIMIT: i64 = 1000;

/// Inbound payload of `POST /transactions`.
///
/// All three fields are required. The sign of `amount` is not validated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRequest {
    pub user_id: i64,
    pub amount: i64,
    pub description: String,
}

/// Row to be inserted inside a unit of work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewLedgerEntry {
    pub user_id: i64,
    pub amount: i64,
    pub description: String,
}

impl From<TransactionRequest> for NewLedgerEntry {
    fn from(request: TransactionRequest) -> Self {
        Self {
            user_id: request.user_id,
            amount: request.amount,
            description: request.description,
        }
    }
}

/// Committed ledger row. Immutable once committed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: u64,
    pub user_id: i64,
    pub amount: i64,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

/// Result of a submission that reached the write coordinator.
///
/// Malformed payloads never get this far; the HTTP layer answers them itself.
#[derive(Debug)]
pub enum Outcome {
    Created,
    CapExceeded { cap: i64 },
    InternalFailure(FailureCause),
}

impl Outcome {
    pub fn is_created(&self) -> bool {
        matches!(self, Outcome::Created)
    }

    pub fn is_cap_exceeded(&self) -> bool {
        matches!(self, Outcome::CapExceeded { .. })
    }

    pub fn is_internal_failure(&self) -> bool {
        matches!(self, Outcome::InternalFailure(_))
    }
}

/// Whether `aggregate + amount` stays within `cap`. Equal to the cap is allowed.
///
/// Computed in `i128` so no pair of `i64` inputs can overflow.
pub fn within_cap(aggregate: i64, amount: i64, cap: i64) -> bool {
    i128::from(aggregate) + i128::from(amount) <= i128::from(cap)
}
