//! Transfer Executor
//!
//! Moves money between two accounts as one unit of work: one transfer record,
//! two entries, two balance updates, all committed together or not at all.
//!
//! # Lock ordering
//!
//! Balance rows are always locked in ascending account ID order, whichever
//! side is the source. Two transfers over the same pair, in either direction,
//! therefore never wait on each other in a cycle. This rule is the only
//! deadlock avoidance there is; nothing else may lock balance rows.
//!
//! # Retries
//!
//! The executor never retries. A [`LedgerError::Conflict`] (lock wait timeout,
//! serialization failure) leaves no trace, and the caller may re-issue the
//! whole transfer.

use std::sync::Arc;
use tracing::{debug, info, warn};

use super::state::TransferState;
use super::types::{TransferParams, TransferResult};
use crate::account::Account;
use crate::core_types::AccountId;
use crate::error::LedgerError;
use crate::store::{LedgerStore, UnitOfWork};

/// Executes transfers against any [`LedgerStore`]
#[derive(Clone)]
pub struct TransferExecutor {
    store: Arc<dyn LedgerStore>,
}

impl TransferExecutor {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    /// Committed state of one account
    pub async fn get_account(&self, id: AccountId) -> Result<Account, LedgerError> {
        self.store.get_account(id).await
    }

    /// Move `params.amount` from `params.from_account_id` to
    /// `params.to_account_id`.
    ///
    /// On error nothing is visible: the unit of work is rolled back, and if
    /// this future is dropped before completion the unit of work rolls back
    /// on drop.
    pub async fn transfer(&self, params: TransferParams) -> Result<TransferResult, LedgerError> {
        let mut state = TransferState::Start;
        params.validate()?;
        state.transition(TransferState::Validated)?;

        let mut uow = self.store.begin().await?;

        let outcome = Self::run(uow.as_mut(), params, &mut state).await;
        let result = match outcome {
            Ok(result) => result,
            Err(e) => {
                if let Err(rollback_err) = uow.rollback().await {
                    warn!(error = %rollback_err, "Rollback failed; unit of work dropped");
                }
                Self::rolled_back(&mut state, &params, &e);
                return Err(e);
            }
        };

        if let Err(e) = uow.commit().await {
            Self::rolled_back(&mut state, &params, &e);
            return Err(e);
        }
        state.transition(TransferState::Committed)?;

        info!(
            transfer_id = result.transfer.id,
            from = params.from_account_id,
            to = params.to_account_id,
            amount = params.amount,
            "Transfer committed"
        );
        Ok(result)
    }

    async fn run(
        uow: &mut dyn UnitOfWork,
        params: TransferParams,
        state: &mut TransferState,
    ) -> Result<TransferResult, LedgerError> {
        let transfer = uow.create_transfer(params).await?;
        Self::advance(state, TransferState::TransferRecorded)?;

        let from_entry = uow
            .create_entry(params.from_account_id, -params.amount)
            .await?;
        let to_entry = uow
            .create_entry(params.to_account_id, params.amount)
            .await?;
        Self::advance(state, TransferState::EntriesRecorded)?;

        let [first, second] = params.lock_order();
        uow.get_account_for_update(first).await?;
        let first_account = uow.add_balance(first, params.delta_for(first)).await?;
        uow.get_account_for_update(second).await?;
        Self::advance(state, TransferState::BalancesLocked)?;
        let second_account = uow.add_balance(second, params.delta_for(second)).await?;
        Self::advance(state, TransferState::BalancesAdjusted)?;

        let (from_account, to_account) = if first == params.from_account_id {
            (first_account, second_account)
        } else {
            (second_account, first_account)
        };

        if from_account.currency != to_account.currency {
            return Err(LedgerError::InvalidArgument(format!(
                "currency mismatch: account {} is {}, account {} is {}",
                from_account.id, from_account.currency, to_account.id, to_account.currency
            )));
        }
        if from_account.balance < 0 {
            return Err(LedgerError::InsufficientFunds {
                account_id: from_account.id,
                balance: from_account.balance + params.amount,
                amount: params.amount,
            });
        }

        Ok(TransferResult {
            transfer,
            from_entry,
            to_entry,
            from_account,
            to_account,
        })
    }

    fn advance(state: &mut TransferState, to: TransferState) -> Result<(), LedgerError> {
        state.transition(to)?;
        debug!(state = %state, "Transfer state advanced");
        Ok(())
    }

    fn rolled_back(state: &mut TransferState, params: &TransferParams, error: &LedgerError) {
        let reached = *state;
        if state.transition(TransferState::RolledBack).is_err() {
            warn!(state = %reached, "Rollback from unexpected state");
        }
        warn!(
            from = params.from_account_id,
            to = params.to_account_id,
            amount = params.amount,
            state = %reached,
            code = error.code(),
            error = %error,
            "Transfer rolled back"
        );
    }
}
