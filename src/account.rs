//! Account model
//!
//! Accounts hold the balance rows that the transfer executor locks and
//! adjusts. Balances only change through [`crate::transfer::TransferExecutor`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::core_types::{AccountId, Amount};
use crate::error::LedgerError;

/// Largest page accepted by the list accessors.
pub const MAX_PAGE_SIZE: i64 = 100;

/// Supported currencies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    Usd,
    Eur,
    Cad,
}

impl Currency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Currency::Usd => "USD",
            Currency::Eur => "EUR",
            Currency::Cad => "CAD",
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Currency {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "USD" => Ok(Currency::Usd),
            "EUR" => Ok(Currency::Eur),
            "CAD" => Ok(Currency::Cad),
            other => Err(LedgerError::InvalidArgument(format!(
                "unsupported currency: {other}"
            ))),
        }
    }
}

/// Account row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    pub owner: String,
    pub currency: Currency,
    /// Smallest currency unit
    pub balance: Amount,
    pub created_at: DateTime<Utc>,
}

/// Parameters for opening an account
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateAccountParams {
    pub owner: String,
    pub currency: Currency,
    /// Opening balance, used for seeding. Zero for normal accounts.
    pub balance: Amount,
}

impl CreateAccountParams {
    pub fn new(owner: impl Into<String>, currency: Currency) -> Self {
        Self {
            owner: owner.into(),
            currency,
            balance: 0,
        }
    }

    pub fn with_balance(mut self, balance: Amount) -> Self {
        self.balance = balance;
        self
    }

    pub fn validate(&self) -> Result<(), LedgerError> {
        if self.owner.trim().is_empty() {
            return Err(LedgerError::InvalidArgument(
                "owner must not be empty".to_string(),
            ));
        }
        if self.balance < 0 {
            return Err(LedgerError::InvalidArgument(
                "opening balance must not be negative".to_string(),
            ));
        }
        Ok(())
    }
}

/// Paging window shared by the list accessors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub limit: i64,
    pub offset: i64,
}

impl Page {
    pub fn new(limit: i64, offset: i64) -> Self {
        Self { limit, offset }
    }

    pub fn validate(&self) -> Result<(), LedgerError> {
        if !(1..=MAX_PAGE_SIZE).contains(&self.limit) {
            return Err(LedgerError::InvalidArgument(format!(
                "limit must be between 1 and {MAX_PAGE_SIZE}"
            )));
        }
        if self.offset < 0 {
            return Err(LedgerError::InvalidArgument(
                "offset must not be negative".to_string(),
            ));
        }
        Ok(())
    }

    /// Apply the window to an already ordered iterator.
    pub(crate) fn slice<T>(&self, items: impl Iterator<Item = T>) -> Vec<T> {
        items
            .skip(self.offset as usize)
            .take(self.limit as usize)
            .collect()
    }
}

impl Default for Page {
    fn default() -> Self {
        Self {
            limit: MAX_PAGE_SIZE,
            offset: 0,
        }
    }
}

/// Filter for listing accounts
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListAccountsParams {
    pub owner: Option<String>,
    pub page: Page,
}
