//! Ledger Core - atomic money transfers between accounts
//!
//! A transfer writes one transfer record, two entries and two balance updates
//! in a single unit of work. Balance rows are locked in ascending account ID
//! order so concurrent transfers over overlapping accounts never deadlock.
//!
//! # Modules
//!
//! - [`core_types`] - ID and amount aliases
//! - [`account`] - Account model, currencies, paging
//! - [`entry`] - Entry log model
//! - [`transfer`] - Transfer records and the [`TransferExecutor`]
//! - [`store`] - Store boundary with in-memory and PostgreSQL implementations
//! - [`error`] - [`LedgerError`]
//! - [`config`] / [`logging`] / [`db`] - Ambient setup

// Core types - must be first!
pub mod core_types;

pub mod account;
pub mod entry;
pub mod error;
pub mod store;
pub mod transfer;

pub mod config;
pub mod db;
pub mod logging;

// Convenient re-exports at crate root
pub use account::{Account, CreateAccountParams, Currency, ListAccountsParams, Page};
pub use core_types::{AccountId, Amount, EntryId, TransferId};
pub use entry::{Entry, ListEntriesParams};
pub use error::LedgerError;
pub use store::{LedgerStore, MemoryStore, PgStore, UnitOfWork};
pub use transfer::{
    ListTransfersParams, Transfer, TransferExecutor, TransferParams, TransferResult,
    TransferState,
};
