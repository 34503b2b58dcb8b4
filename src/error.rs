//! Ledger Error Types
//!
//! One error type for every store and for the transfer executor. Any error
//! aborts the current unit of work; nothing is recovered internally.

use thiserror::Error;

use crate::core_types::{AccountId, Amount};

/// SQLSTATE codes the PostgreSQL store maps explicitly.
pub mod sqlstate {
    pub const SERIALIZATION_FAILURE: &str = "40001";
    pub const DEADLOCK_DETECTED: &str = "40P01";
    pub const LOCK_NOT_AVAILABLE: &str = "55P03";
    pub const FOREIGN_KEY_VIOLATION: &str = "23503";
    pub const CHECK_VIOLATION: &str = "23514";
    pub const NUMERIC_VALUE_OUT_OF_RANGE: &str = "22003";
}

/// Ledger error kinds
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// Same-account transfer, non-positive amount, currency mismatch, bad paging
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Insufficient funds on account {account_id}: balance {balance}, requested {amount}")]
    InsufficientFunds {
        account_id: AccountId,
        balance: Amount,
        amount: Amount,
    },

    /// Lock-wait timeout or serialization failure. The caller may retry the
    /// whole transfer.
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Fatal: {0}")]
    Fatal(String),
}

impl LedgerError {
    /// Get the error code for API responses
    pub fn code(&self) -> &'static str {
        match self {
            LedgerError::InvalidArgument(_) => "INVALID_ARGUMENT",
            LedgerError::NotFound(_) => "NOT_FOUND",
            LedgerError::InsufficientFunds { .. } => "INSUFFICIENT_FUNDS",
            LedgerError::Conflict(_) => "CONFLICT",
            LedgerError::Fatal(_) => "FATAL",
        }
    }

    /// Get HTTP status code suggestion
    pub fn http_status(&self) -> u16 {
        match self {
            LedgerError::InvalidArgument(_) => 400,
            LedgerError::NotFound(_) => 404,
            LedgerError::Conflict(_) => 409,
            LedgerError::InsufficientFunds { .. } => 422,
            LedgerError::Fatal(_) => 500,
        }
    }

    /// Whether re-running the whole transfer may succeed.
    ///
    /// The executor never retries on its own; this is for the caller.
    pub fn is_retryable(&self) -> bool {
        matches!(self, LedgerError::Conflict(_))
    }

    pub(crate) fn account_not_found(id: AccountId) -> Self {
        LedgerError::NotFound(format!("account {id}"))
    }
}

impl From<sqlx::Error> for LedgerError {
    fn from(e: sqlx::Error) -> Self {
        match &e {
            sqlx::Error::RowNotFound => LedgerError::NotFound(e.to_string()),
            sqlx::Error::PoolTimedOut => LedgerError::Conflict(e.to_string()),
            sqlx::Error::Database(db) => match db.code().as_deref() {
                Some(
                    sqlstate::SERIALIZATION_FAILURE
                    | sqlstate::DEADLOCK_DETECTED
                    | sqlstate::LOCK_NOT_AVAILABLE,
                ) => LedgerError::Conflict(db.message().to_string()),
                Some(sqlstate::FOREIGN_KEY_VIOLATION) => {
                    LedgerError::NotFound(db.message().to_string())
                }
                // Balance overflow on `balance + $1`, same kind as the memory store
                Some(sqlstate::CHECK_VIOLATION | sqlstate::NUMERIC_VALUE_OUT_OF_RANGE) => {
                    LedgerError::InvalidArgument(db.message().to_string())
                }
                _ => LedgerError::Fatal(e.to_string()),
            },
            _ => LedgerError::Fatal(e.to_string()),
        }
    }
}

/// Database error double for exercising the SQLSTATE mapping without a server
#[cfg(test)]
pub(crate) mod mock {
    use sqlx::error::{DatabaseError, ErrorKind};
    use std::borrow::Cow;
    use std::error::Error as StdError;
    use std::fmt;

    #[derive(Debug)]
    pub struct MockDbError {
        code: &'static str,
    }

    impl fmt::Display for MockDbError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "mock database error {}", self.code)
        }
    }

    impl StdError for MockDbError {}

    impl DatabaseError for MockDbError {
        fn message(&self) -> &str {
            "mock database error"
        }

        fn code(&self) -> Option<Cow<'_, str>> {
            Some(Cow::Borrowed(self.code))
        }

        fn as_error(&self) -> &(dyn StdError + Send + Sync + 'static) {
            self
        }

        fn as_error_mut(&mut self) -> &mut (dyn StdError + Send + Sync + 'static) {
            self
        }

        fn into_error(self: Box<Self>) -> Box<dyn StdError + Send + Sync + 'static> {
            self
        }

        fn kind(&self) -> ErrorKind {
            ErrorKind::Other
        }
    }

    /// `sqlx::Error::Database` carrying the given SQLSTATE
    pub fn db_error(code: &'static str) -> sqlx::Error {
        sqlx::Error::Database(Box::new(MockDbError { code }))
    }
}
