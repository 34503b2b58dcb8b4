//! Transfer Types
//!
//! Transfer records, creation parameters and the executor result.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::account::{Account, Page};
use crate::core_types::{AccountId, Amount, TransferId};
use crate::entry::Entry;
use crate::error::LedgerError;

/// Immutable record of one movement of funds
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transfer {
    pub id: TransferId,
    pub from_account_id: AccountId,
    pub to_account_id: AccountId,
    /// Always positive
    pub amount: Amount,
    pub created_at: DateTime<Utc>,
}

/// Transfer request: `amount` moves from `from_account_id` to `to_account_id`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferParams {
    pub from_account_id: AccountId,
    pub to_account_id: AccountId,
    pub amount: Amount,
}

impl TransferParams {
    pub fn new(from_account_id: AccountId, to_account_id: AccountId, amount: Amount) -> Self {
        Self {
            from_account_id,
            to_account_id,
            amount,
        }
    }

    /// Reject same-account and non-positive transfers
    pub fn validate(&self) -> Result<(), LedgerError> {
        if self.from_account_id == self.to_account_id {
            return Err(LedgerError::InvalidArgument(format!(
                "source and destination account are the same ({})",
                self.from_account_id
            )));
        }
        if self.amount <= 0 {
            return Err(LedgerError::InvalidArgument(format!(
                "amount must be greater than zero, got {}",
                self.amount
            )));
        }
        Ok(())
    }

    /// Account IDs in lock order: numerically smaller first.
    ///
    /// Every path that takes balance row locks goes through this, so two
    /// transfers over the same pair can never wait on each other in a cycle.
    pub fn lock_order(&self) -> [AccountId; 2] {
        if self.from_account_id < self.to_account_id {
            [self.from_account_id, self.to_account_id]
        } else {
            [self.to_account_id, self.from_account_id]
        }
    }

    /// Balance delta applied to `account_id` by this transfer
    pub fn delta_for(&self, account_id: AccountId) -> Amount {
        if account_id == self.from_account_id {
            -self.amount
        } else {
            self.amount
        }
    }
}

/// Everything a committed transfer created or changed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferResult {
    pub transfer: Transfer,
    pub from_entry: Entry,
    pub to_entry: Entry,
    pub from_account: Account,
    pub to_account: Account,
}

/// Filter for listing transfers.
///
/// Matches transfers leaving `from_account_id` OR arriving at
/// `to_account_id`; with neither set every transfer matches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ListTransfersParams {
    pub from_account_id: Option<AccountId>,
    pub to_account_id: Option<AccountId>,
    pub page: Page,
}

impl ListTransfersParams {
    pub(crate) fn matches(&self, transfer: &Transfer) -> bool {
        match (self.from_account_id, self.to_account_id) {
            (None, None) => true,
            (from, to) => {
                from == Some(transfer.from_account_id) || to == Some(transfer.to_account_id)
            }
        }
    }
}
