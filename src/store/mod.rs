//! Transactional store boundary
//!
//! The transfer executor only talks to storage through these traits:
//!
//! - [`LedgerStore`]: committed reads, account opening, and `begin()`
//! - [`UnitOfWork`]: everything written by one transfer, committed or rolled
//!   back as a whole
//!
//! # Unit of work contract
//!
//! 1. `get_account_for_update` takes an exclusive row lock held until the unit
//!    of work ends. Lock waits are bounded; timing out is `Conflict`.
//! 2. `add_balance` is only valid on a row locked by this unit of work.
//! 3. Nothing written through the unit of work is visible to other readers
//!    before `commit`.
//! 4. Dropping a unit of work without `commit` rolls it back and releases its
//!    locks, so a cancelled caller needs no compensating action.
//!
//! Lock ordering is NOT the store's job: callers take row locks in ascending
//! account ID order (see [`crate::transfer::TransferParams::lock_order`]).

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use async_trait::async_trait;
use std::sync::Arc;

use crate::account::{Account, CreateAccountParams, ListAccountsParams};
use crate::core_types::{AccountId, Amount, EntryId, TransferId};
use crate::entry::{Entry, ListEntriesParams};
use crate::error::LedgerError;
use crate::transfer::{ListTransfersParams, Transfer, TransferParams};

/// Store of accounts, entries and transfers
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Open a new unit of work
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, LedgerError>;

    async fn create_account(&self, params: CreateAccountParams) -> Result<Account, LedgerError>;

    /// Committed state of one account
    async fn get_account(&self, id: AccountId) -> Result<Account, LedgerError>;

    async fn list_accounts(&self, params: ListAccountsParams) -> Result<Vec<Account>, LedgerError>;

    async fn get_entry(&self, id: EntryId) -> Result<Entry, LedgerError>;

    async fn list_entries(&self, params: ListEntriesParams) -> Result<Vec<Entry>, LedgerError>;

    async fn get_transfer(&self, id: TransferId) -> Result<Transfer, LedgerError>;

    async fn list_transfers(
        &self,
        params: ListTransfersParams,
    ) -> Result<Vec<Transfer>, LedgerError>;
}

/// One atomic unit of work
#[async_trait]
pub trait UnitOfWork: Send {
    /// Read an account as this unit of work sees it, without locking
    async fn get_account(&mut self, id: AccountId) -> Result<Account, LedgerError>;

    /// Read an account and hold its row lock until commit/rollback
    async fn get_account_for_update(&mut self, id: AccountId) -> Result<Account, LedgerError>;

    /// Add `delta` to a locked account's balance and return the new row
    async fn add_balance(&mut self, id: AccountId, delta: Amount) -> Result<Account, LedgerError>;

    /// Append one entry. Fails only if the account does not exist.
    async fn create_entry(
        &mut self,
        account_id: AccountId,
        amount: Amount,
    ) -> Result<Entry, LedgerError>;

    /// Append one transfer record
    async fn create_transfer(&mut self, params: TransferParams) -> Result<Transfer, LedgerError>;

    async fn commit(self: Box<Self>) -> Result<(), LedgerError>;

    async fn rollback(self: Box<Self>) -> Result<(), LedgerError>;
}

#[async_trait]
impl<S> LedgerStore for Arc<S>
where
    S: LedgerStore + ?Sized,
{
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, LedgerError> {
        (**self).begin().await
    }

    async fn create_account(&self, params: CreateAccountParams) -> Result<Account, LedgerError> {
        (**self).create_account(params).await
    }

    async fn get_account(&self, id: AccountId) -> Result<Account, LedgerError> {
        (**self).get_account(id).await
    }

    async fn list_accounts(&self, params: ListAccountsParams) -> Result<Vec<Account>, LedgerError> {
        (**self).list_accounts(params).await
    }

    async fn get_entry(&self, id: EntryId) -> Result<Entry, LedgerError> {
        (**self).get_entry(id).await
    }

    async fn list_entries(&self, params: ListEntriesParams) -> Result<Vec<Entry>, LedgerError> {
        (**self).list_entries(params).await
    }

    async fn get_transfer(&self, id: TransferId) -> Result<Transfer, LedgerError> {
        (**self).get_transfer(id).await
    }

    async fn list_transfers(
        &self,
        params: ListTransfersParams,
    ) -> Result<Vec<Transfer>, LedgerError> {
        (**self).list_transfers(params).await
    }
}
