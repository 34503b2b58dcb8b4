//! Entry log model
//!
//! Append-only balance deltas, one per account per transfer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::account::Page;
use crate::core_types::{AccountId, Amount, EntryId};

/// Immutable record of one signed balance delta on one account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    pub id: EntryId,
    pub account_id: AccountId,
    /// Negative for debits, positive for credits
    pub amount: Amount,
    pub created_at: DateTime<Utc>,
}

/// Filter for listing entries of one account
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListEntriesParams {
    pub account_id: AccountId,
    pub page: Page,
}

impl ListEntriesParams {
    pub fn new(account_id: AccountId) -> Self {
        Self {
            account_id,
            page: Page::default(),
        }
    }
}
