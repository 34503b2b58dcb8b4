//! PostgreSQL ledger store
//!
//! Row locks are `SELECT ... FOR NO KEY UPDATE`: entry and transfer inserts
//! take `KEY SHARE` locks on the referenced account rows through their
//! foreign keys, and `NO KEY UPDATE` does not conflict with those.
//! Every unit of work sets a transaction-local `lock_timeout`.

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgRow};
use sqlx::{Postgres, Row, Transaction};
use std::collections::HashSet;
use std::time::Duration;

use super::{LedgerStore, UnitOfWork};
use crate::account::{Account, CreateAccountParams, ListAccountsParams};
use crate::core_types::{AccountId, Amount, EntryId, TransferId};
use crate::db::Database;
use crate::entry::{Entry, ListEntriesParams};
use crate::error::{LedgerError, sqlstate};
use crate::transfer::{ListTransfersParams, Transfer, TransferParams};

/// Bundled schema, applied by [`PgStore::migrate`]
pub const SCHEMA: &str = include_str!("../../migrations/0001_init.sql");

const ACCOUNT_COLUMNS: &str = "id, owner, balance, currency, created_at";
const ENTRY_COLUMNS: &str = "id, account_id, amount, created_at";
const TRANSFER_COLUMNS: &str = "id, from_account_id, to_account_id, amount, created_at";

fn account_from_row(row: &PgRow) -> Result<Account, LedgerError> {
    let currency: String = row.try_get("currency")?;
    Ok(Account {
        id: row.try_get("id")?,
        owner: row.try_get("owner")?,
        currency: currency
            .parse()
            .map_err(|_| LedgerError::Fatal(format!("unknown currency in accounts: {currency}")))?,
        balance: row.try_get("balance")?,
        created_at: row.try_get("created_at")?,
    })
}

fn entry_from_row(row: &PgRow) -> Result<Entry, LedgerError> {
    Ok(Entry {
        id: row.try_get("id")?,
        account_id: row.try_get("account_id")?,
        amount: row.try_get("amount")?,
        created_at: row.try_get("created_at")?,
    })
}

fn transfer_from_row(row: &PgRow) -> Result<Transfer, LedgerError> {
    Ok(Transfer {
        id: row.try_get("id")?,
        from_account_id: row.try_get("from_account_id")?,
        to_account_id: row.try_get("to_account_id")?,
        amount: row.try_get("amount")?,
        created_at: row.try_get("created_at")?,
    })
}

/// A failed COMMIT is fatal unless the server reports a serialization failure.
fn commit_error(e: sqlx::Error) -> LedgerError {
    if let sqlx::Error::Database(db) = &e
        && db.code().as_deref() == Some(sqlstate::SERIALIZATION_FAILURE)
    {
        return LedgerError::Conflict(db.message().to_string());
    }
    LedgerError::Fatal(format!("commit failed: {e}"))
}

/// Ledger store backed by PostgreSQL
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
    lock_timeout: Duration,
}

impl PgStore {
    pub fn new(pool: PgPool, lock_timeout: Duration) -> Self {
        Self { pool, lock_timeout }
    }

    pub fn from_database(db: &Database, lock_timeout: Duration) -> Self {
        Self::new(db.pool().clone(), lock_timeout)
    }

    /// Apply the bundled schema (idempotent)
    pub async fn migrate(&self) -> Result<(), LedgerError> {
        sqlx::raw_sql(SCHEMA).execute(&self.pool).await?;
        tracing::info!("Ledger schema applied");
        Ok(())
    }
}

#[async_trait]
impl LedgerStore for PgStore {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, LedgerError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("SELECT set_config('lock_timeout', $1, true)")
            .bind(format!("{}ms", self.lock_timeout.as_millis()))
            .execute(&mut *tx)
            .await?;

        Ok(Box::new(PgUnitOfWork {
            tx,
            locked: HashSet::new(),
        }))
    }

    async fn create_account(&self, params: CreateAccountParams) -> Result<Account, LedgerError> {
        params.validate()?;

        let row = sqlx::query(&format!(
            "INSERT INTO accounts (owner, balance, currency) VALUES ($1, $2, $3) \
             RETURNING {ACCOUNT_COLUMNS}"
        ))
        .bind(&params.owner)
        .bind(params.balance)
        .bind(params.currency.as_str())
        .fetch_one(&self.pool)
        .await?;

        let account = account_from_row(&row)?;
        tracing::debug!(account_id = account.id, owner = %account.owner, "Account created");
        Ok(account)
    }

    async fn get_account(&self, id: AccountId) -> Result<Account, LedgerError> {
        let row = sqlx::query(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE id = $1 LIMIT 1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| LedgerError::account_not_found(id))?;

        account_from_row(&row)
    }

    async fn list_accounts(&self, params: ListAccountsParams) -> Result<Vec<Account>, LedgerError> {
        params.page.validate()?;

        let rows = sqlx::query(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts \
             WHERE ($1::varchar IS NULL OR owner = $1) \
             ORDER BY id LIMIT $2 OFFSET $3"
        ))
        .bind(params.owner.as_deref())
        .bind(params.page.limit)
        .bind(params.page.offset)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(account_from_row).collect()
    }

    async fn get_entry(&self, id: EntryId) -> Result<Entry, LedgerError> {
        let row = sqlx::query(&format!(
            "SELECT {ENTRY_COLUMNS} FROM entries WHERE id = $1 LIMIT 1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| LedgerError::NotFound(format!("entry {id}")))?;

        entry_from_row(&row)
    }

    async fn list_entries(&self, params: ListEntriesParams) -> Result<Vec<Entry>, LedgerError> {
        params.page.validate()?;

        let rows = sqlx::query(&format!(
            "SELECT {ENTRY_COLUMNS} FROM entries WHERE account_id = $1 \
             ORDER BY id LIMIT $2 OFFSET $3"
        ))
        .bind(params.account_id)
        .bind(params.page.limit)
        .bind(params.page.offset)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(entry_from_row).collect()
    }

    async fn get_transfer(&self, id: TransferId) -> Result<Transfer, LedgerError> {
        let row = sqlx::query(&format!(
            "SELECT {TRANSFER_COLUMNS} FROM transfers WHERE id = $1 LIMIT 1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| LedgerError::NotFound(format!("transfer {id}")))?;

        transfer_from_row(&row)
    }

    async fn list_transfers(
        &self,
        params: ListTransfersParams,
    ) -> Result<Vec<Transfer>, LedgerError> {
        params.page.validate()?;

        let rows = sqlx::query(&format!(
            "SELECT {TRANSFER_COLUMNS} FROM transfers \
             WHERE ($1::bigint IS NULL AND $2::bigint IS NULL) \
                OR from_account_id = $1 OR to_account_id = $2 \
             ORDER BY id LIMIT $3 OFFSET $4"
        ))
        .bind(params.from_account_id)
        .bind(params.to_account_id)
        .bind(params.page.limit)
        .bind(params.page.offset)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(transfer_from_row).collect()
    }
}

/// Unit of work over one PostgreSQL transaction.
///
/// Dropping the transaction without commit rolls it back, and the server
/// releases its row locks.
pub struct PgUnitOfWork {
    tx: Transaction<'static, Postgres>,
    locked: HashSet<AccountId>,
}

#[async_trait]
impl UnitOfWork for PgUnitOfWork {
    async fn get_account(&mut self, id: AccountId) -> Result<Account, LedgerError> {
        let row = sqlx::query(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE id = $1 LIMIT 1"
        ))
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await?
        .ok_or_else(|| LedgerError::account_not_found(id))?;

        account_from_row(&row)
    }

    async fn get_account_for_update(&mut self, id: AccountId) -> Result<Account, LedgerError> {
        let row = sqlx::query(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE id = $1 LIMIT 1 FOR NO KEY UPDATE"
        ))
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await?
        .ok_or_else(|| LedgerError::account_not_found(id))?;

        self.locked.insert(id);
        account_from_row(&row)
    }

    async fn add_balance(&mut self, id: AccountId, delta: Amount) -> Result<Account, LedgerError> {
        if !self.locked.contains(&id) {
            return Err(LedgerError::Fatal(format!(
                "balance adjustment on account {id} without holding its row lock"
            )));
        }

        let row = sqlx::query(&format!(
            "UPDATE accounts SET balance = balance + $1 WHERE id = $2 RETURNING {ACCOUNT_COLUMNS}"
        ))
        .bind(delta)
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await?
        .ok_or_else(|| LedgerError::account_not_found(id))?;

        account_from_row(&row)
    }

    async fn create_entry(
        &mut self,
        account_id: AccountId,
        amount: Amount,
    ) -> Result<Entry, LedgerError> {
        let row = sqlx::query(&format!(
            "INSERT INTO entries (account_id, amount) VALUES ($1, $2) RETURNING {ENTRY_COLUMNS}"
        ))
        .bind(account_id)
        .bind(amount)
        .fetch_one(&mut *self.tx)
        .await?;

        entry_from_row(&row)
    }

    async fn create_transfer(&mut self, params: TransferParams) -> Result<Transfer, LedgerError> {
        params.validate()?;

        let row = sqlx::query(&format!(
            "INSERT INTO transfers (from_account_id, to_account_id, amount) \
             VALUES ($1, $2, $3) RETURNING {TRANSFER_COLUMNS}"
        ))
        .bind(params.from_account_id)
        .bind(params.to_account_id)
        .bind(params.amount)
        .fetch_one(&mut *self.tx)
        .await?;

        transfer_from_row(&row)
    }

    async fn commit(self: Box<Self>) -> Result<(), LedgerError> {
        self.tx.commit().await.map_err(commit_error)
    }

    async fn rollback(self: Box<Self>) -> Result<(), LedgerError> {
        self.tx.rollback().await?;
        Ok(())
    }
}
