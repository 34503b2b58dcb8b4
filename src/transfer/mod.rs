//! Transfer execution
//!
//! # State Machine
//!
//! ```text
//! START → VALIDATED → TRANSFER_RECORDED → ENTRIES_RECORDED
//!       → BALANCES_LOCKED → BALANCES_ADJUSTED → COMMITTED
//!                  ↓ (any failure)
//!             ROLLED_BACK
//! ```
//!
//! # Safety Invariants
//!
//! 1. **All-or-nothing**: the transfer record, both entries and both balance
//!    updates share one unit of work
//! 2. **Lock order**: balance rows are locked smaller account ID first
//! 3. **No overdraft**: a transfer that leaves the source negative is rolled back
//! 4. **No internal retry**: `Conflict` goes back to the caller

pub mod executor;
pub mod state;
pub mod types;

pub use executor::TransferExecutor;
pub use state::TransferState;
pub use types::{ListTransfersParams, Transfer, TransferParams, TransferResult};
