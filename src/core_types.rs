//! Core types used throughout the ledger
//!
//! Type aliases shared by the stores and the transfer executor. They map
//! directly onto the `BIGINT` columns of the persisted tables.

/// Account ID - assigned by the store, immutable after creation.
///
/// # Constraints:
/// - **Unique**: One row per ID
/// - **Totally ordered**: The transfer executor locks the smaller ID first,
///   so every store must hand out IDs that compare consistently
pub type AccountId = i64;

/// Entry ID - unique within the entry log
pub type EntryId = i64;

/// Transfer ID - unique within the transfer record store
pub type TransferId = i64;

/// Money amount in the smallest currency unit (cents for USD).
///
/// Signed: entries carry negative deltas for debits.
pub type Amount = i64;
