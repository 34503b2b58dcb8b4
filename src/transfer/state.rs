//! Transfer Executor State Definitions
//!
//! One executor run walks the happy path in order. Any failure after `Start`
//! moves straight to `RolledBack`.

use std::fmt;

use crate::error::LedgerError;

/// Executor states
///
/// ```text
/// START → VALIDATED → TRANSFER_RECORDED → ENTRIES_RECORDED
///       → BALANCES_LOCKED → BALANCES_ADJUSTED → COMMITTED
///
///    (any non-terminal state after START) → ROLLED_BACK
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransferState {
    Start,
    Validated,
    TransferRecorded,
    EntriesRecorded,
    /// Both row locks held, taken in ascending account ID order
    BalancesLocked,
    BalancesAdjusted,
    /// Terminal: all rows visible
    Committed,
    /// Terminal: nothing visible
    RolledBack,
}

impl TransferState {
    /// Check if this is a terminal state (no more transitions possible)
    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(self, TransferState::Committed | TransferState::RolledBack)
    }

    /// Successor on the happy path
    pub fn next(&self) -> Option<TransferState> {
        match self {
            TransferState::Start => Some(TransferState::Validated),
            TransferState::Validated => Some(TransferState::TransferRecorded),
            TransferState::TransferRecorded => Some(TransferState::EntriesRecorded),
            TransferState::EntriesRecorded => Some(TransferState::BalancesLocked),
            TransferState::BalancesLocked => Some(TransferState::BalancesAdjusted),
            TransferState::BalancesAdjusted => Some(TransferState::Committed),
            TransferState::Committed | TransferState::RolledBack => None,
        }
    }

    pub fn can_transition_to(&self, to: TransferState) -> bool {
        match to {
            TransferState::RolledBack => {
                !self.is_terminal() && *self != TransferState::Start
            }
            _ => self.next() == Some(to),
        }
    }

    /// Move to `to`, or fail with `Fatal` on an illegal transition.
    pub fn transition(&mut self, to: TransferState) -> Result<(), LedgerError> {
        if !self.can_transition_to(to) {
            return Err(LedgerError::Fatal(format!(
                "invalid state transition: {self} -> {to}"
            )));
        }
        *self = to;
        Ok(())
    }

    /// Get human-readable state name
    pub fn as_str(&self) -> &'static str {
        match self {
            TransferState::Start => "START",
            TransferState::Validated => "VALIDATED",
            TransferState::TransferRecorded => "TRANSFER_RECORDED",
            TransferState::EntriesRecorded => "ENTRIES_RECORDED",
            TransferState::BalancesLocked => "BALANCES_LOCKED",
            TransferState::BalancesAdjusted => "BALANCES_ADJUSTED",
            TransferState::Committed => "COMMITTED",
            TransferState::RolledBack => "ROLLED_BACK",
        }
    }
}

impl fmt::Display for TransferState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
