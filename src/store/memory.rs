//! In-memory ledger store
//!
//! Committed rows live behind one `RwLock`. Each account has its own async
//! mutex that plays the role of the row lock: a unit of work keeps the owned
//! guard until it commits or is dropped. Writes are buffered in the unit of
//! work and published to the tables in a single critical section on commit.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::{debug, warn};

use super::{LedgerStore, UnitOfWork};
use crate::account::{Account, CreateAccountParams, ListAccountsParams};
use crate::core_types::{AccountId, Amount, EntryId, TransferId};
use crate::entry::{Entry, ListEntriesParams};
use crate::error::LedgerError;
use crate::transfer::{ListTransfersParams, Transfer, TransferParams};

/// Default bound on a row lock wait
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Default)]
struct Tables {
    accounts: BTreeMap<AccountId, Account>,
    entries: BTreeMap<EntryId, Entry>,
    transfers: BTreeMap<TransferId, Transfer>,
}

type RowLock = Arc<AsyncMutex<()>>;

#[derive(Debug)]
struct Shared {
    tables: RwLock<Tables>,
    row_locks: Mutex<HashMap<AccountId, RowLock>>,
    next_account_id: AtomicI64,
    next_entry_id: AtomicI64,
    next_transfer_id: AtomicI64,
    lock_timeout: Duration,
}

impl Shared {
    fn read(&self) -> Result<RwLockReadGuard<'_, Tables>, LedgerError> {
        self.tables
            .read()
            .map_err(|_| LedgerError::Fatal("tables lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Tables>, LedgerError> {
        self.tables
            .write()
            .map_err(|_| LedgerError::Fatal("tables lock poisoned".to_string()))
    }

    fn row_lock(&self, id: AccountId) -> Result<RowLock, LedgerError> {
        let locks = self
            .row_locks
            .lock()
            .map_err(|_| LedgerError::Fatal("row lock table poisoned".to_string()))?;
        locks
            .get(&id)
            .cloned()
            .ok_or_else(|| LedgerError::account_not_found(id))
    }

    fn committed_account(&self, id: AccountId) -> Result<Account, LedgerError> {
        self.read()?
            .accounts
            .get(&id)
            .cloned()
            .ok_or_else(|| LedgerError::account_not_found(id))
    }

    fn account_exists(&self, id: AccountId) -> Result<bool, LedgerError> {
        Ok(self.read()?.accounts.contains_key(&id))
    }
}

/// In-process transactional store.
///
/// Cheap to clone; clones share the same tables.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    shared: Arc<Shared>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_lock_timeout(DEFAULT_LOCK_TIMEOUT)
    }

    pub fn with_lock_timeout(lock_timeout: Duration) -> Self {
        Self {
            shared: Arc::new(Shared {
                tables: RwLock::new(Tables::default()),
                row_locks: Mutex::new(HashMap::new()),
                next_account_id: AtomicI64::new(1),
                next_entry_id: AtomicI64::new(1),
                next_transfer_id: AtomicI64::new(1),
                lock_timeout,
            }),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LedgerStore for MemoryStore {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, LedgerError> {
        Ok(Box::new(MemoryUnitOfWork {
            shared: Arc::clone(&self.shared),
            held: HashMap::new(),
            accounts: HashMap::new(),
            entries: Vec::new(),
            transfers: Vec::new(),
        }))
    }

    async fn create_account(&self, params: CreateAccountParams) -> Result<Account, LedgerError> {
        params.validate()?;

        let account = Account {
            id: self.shared.next_account_id.fetch_add(1, Ordering::SeqCst),
            owner: params.owner,
            currency: params.currency,
            balance: params.balance,
            created_at: Utc::now(),
        };

        // Register the row lock before the row becomes visible.
        self.shared
            .row_locks
            .lock()
            .map_err(|_| LedgerError::Fatal("row lock table poisoned".to_string()))?
            .insert(account.id, Arc::new(AsyncMutex::new(())));
        self.shared
            .write()?
            .accounts
            .insert(account.id, account.clone());

        debug!(account_id = account.id, owner = %account.owner, "Account created");
        Ok(account)
    }

    async fn get_account(&self, id: AccountId) -> Result<Account, LedgerError> {
        self.shared.committed_account(id)
    }

    async fn list_accounts(&self, params: ListAccountsParams) -> Result<Vec<Account>, LedgerError> {
        params.page.validate()?;
        let tables = self.shared.read()?;
        let matching = tables
            .accounts
            .values()
            .filter(|a| params.owner.as_deref().is_none_or(|owner| a.owner == owner))
            .cloned();
        Ok(params.page.slice(matching))
    }

    async fn get_entry(&self, id: EntryId) -> Result<Entry, LedgerError> {
        self.shared
            .read()?
            .entries
            .get(&id)
            .cloned()
            .ok_or_else(|| LedgerError::NotFound(format!("entry {id}")))
    }

    async fn list_entries(&self, params: ListEntriesParams) -> Result<Vec<Entry>, LedgerError> {
        params.page.validate()?;
        let tables = self.shared.read()?;
        let matching = tables
            .entries
            .values()
            .filter(|e| e.account_id == params.account_id)
            .cloned();
        Ok(params.page.slice(matching))
    }

    async fn get_transfer(&self, id: TransferId) -> Result<Transfer, LedgerError> {
        self.shared
            .read()?
            .transfers
            .get(&id)
            .cloned()
            .ok_or_else(|| LedgerError::NotFound(format!("transfer {id}")))
    }

    async fn list_transfers(
        &self,
        params: ListTransfersParams,
    ) -> Result<Vec<Transfer>, LedgerError> {
        params.page.validate()?;
        let tables = self.shared.read()?;
        let matching = tables
            .transfers
            .values()
            .filter(|t| params.matches(t))
            .cloned();
        Ok(params.page.slice(matching))
    }
}

/// Unit of work over a [`MemoryStore`].
///
/// Dropping it without `commit` discards the buffered rows and releases every
/// row lock it holds.
pub struct MemoryUnitOfWork {
    shared: Arc<Shared>,
    held: HashMap<AccountId, OwnedMutexGuard<()>>,
    /// Locked rows as this unit of work sees them
    accounts: HashMap<AccountId, Account>,
    entries: Vec<Entry>,
    transfers: Vec<Transfer>,
}

#[async_trait]
impl UnitOfWork for MemoryUnitOfWork {
    async fn get_account(&mut self, id: AccountId) -> Result<Account, LedgerError> {
        match self.accounts.get(&id) {
            Some(account) => Ok(account.clone()),
            None => self.shared.committed_account(id),
        }
    }

    async fn get_account_for_update(&mut self, id: AccountId) -> Result<Account, LedgerError> {
        if let Some(account) = self.accounts.get(&id) {
            return Ok(account.clone());
        }

        let row_lock = self.shared.row_lock(id)?;
        let guard = tokio::time::timeout(self.shared.lock_timeout, row_lock.lock_owned())
            .await
            .map_err(|_| {
                warn!(account_id = id, timeout = ?self.shared.lock_timeout, "Row lock wait timed out");
                LedgerError::Conflict(format!("lock wait timeout on account {id}"))
            })?;

        // Read after locking: every committed writer of this row held the lock.
        let account = self.shared.committed_account(id)?;
        self.held.insert(id, guard);
        self.accounts.insert(id, account.clone());
        debug!(account_id = id, "Row lock acquired");
        Ok(account)
    }

    async fn add_balance(&mut self, id: AccountId, delta: Amount) -> Result<Account, LedgerError> {
        let Some(account) = self.accounts.get_mut(&id) else {
            if self.shared.account_exists(id)? {
                return Err(LedgerError::Fatal(format!(
                    "balance adjustment on account {id} without holding its row lock"
                )));
            }
            return Err(LedgerError::account_not_found(id));
        };

        account.balance = account.balance.checked_add(delta).ok_or_else(|| {
            LedgerError::InvalidArgument(format!("balance overflow on account {id}"))
        })?;
        Ok(account.clone())
    }

    async fn create_entry(
        &mut self,
        account_id: AccountId,
        amount: Amount,
    ) -> Result<Entry, LedgerError> {
        if !self.shared.account_exists(account_id)? {
            return Err(LedgerError::account_not_found(account_id));
        }

        let entry = Entry {
            id: self.shared.next_entry_id.fetch_add(1, Ordering::SeqCst),
            account_id,
            amount,
            created_at: Utc::now(),
        };
        self.entries.push(entry.clone());
        Ok(entry)
    }

    async fn create_transfer(&mut self, params: TransferParams) -> Result<Transfer, LedgerError> {
        params.validate()?;
        for id in [params.from_account_id, params.to_account_id] {
            if !self.shared.account_exists(id)? {
                return Err(LedgerError::account_not_found(id));
            }
        }

        let transfer = Transfer {
            id: self.shared.next_transfer_id.fetch_add(1, Ordering::SeqCst),
            from_account_id: params.from_account_id,
            to_account_id: params.to_account_id,
            amount: params.amount,
            created_at: Utc::now(),
        };
        self.transfers.push(transfer.clone());
        Ok(transfer)
    }

    async fn commit(self: Box<Self>) -> Result<(), LedgerError> {
        let MemoryUnitOfWork {
            shared,
            held,
            accounts,
            entries,
            transfers,
        } = *self;

        {
            let mut tables = shared.write()?;
            tables.accounts.extend(accounts);
            tables.entries.extend(entries.into_iter().map(|e| (e.id, e)));
            tables
                .transfers
                .extend(transfers.into_iter().map(|t| (t.id, t)));
        }

        // Row locks are released only once the new balances are visible.
        drop(held);
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), LedgerError> {
        debug!(
            locks = self.held.len(),
            entries = self.entries.len(),
            transfers = self.transfers.len(),
            "Unit of work rolled back"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::{Currency, Page};

    async fn seeded(balances: &[Amount]) -> (MemoryStore, Vec<Account>) {
        let store = MemoryStore::with_lock_timeout(Duration::from_millis(200));
        let mut accounts = Vec::new();
        for (i, balance) in balances.iter().enumerate() {
            let account = store
                .create_account(
                    CreateAccountParams::new(format!("owner{i}"), Currency::Usd)
                        .with_balance(*balance),
                )
                .await
                .unwrap();
            accounts.push(account);
        }
        (store, accounts)
    }

    #[tokio::test]
    async fn test_create_and_get_account() {
        let (store, accounts) = seeded(&[100]).await;
        let fetched = store.get_account(accounts[0].id).await.unwrap();
        assert_eq!(fetched, accounts[0]);
        assert_eq!(fetched.balance, 100);

        let missing = store.get_account(999).await.unwrap_err();
        assert!(matches!(missing, LedgerError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_list_accounts_by_owner() {
        let store = MemoryStore::new();
        for owner in ["alice", "bob", "alice"] {
            store
                .create_account(CreateAccountParams::new(owner, Currency::Eur))
                .await
                .unwrap();
        }

        let alice = store
            .list_accounts(ListAccountsParams {
                owner: Some("alice".to_string()),
                page: Page::new(10, 0),
            })
            .await
            .unwrap();
        assert_eq!(alice.len(), 2);
        assert!(alice.iter().all(|a| a.owner == "alice"));
        assert!(alice[0].id < alice[1].id);

        let paged = store
            .list_accounts(ListAccountsParams {
                owner: None,
                page: Page::new(1, 2),
            })
            .await
            .unwrap();
        assert_eq!(paged.len(), 1);
        assert_eq!(paged[0].owner, "alice");
    }

    #[tokio::test]
    async fn test_writes_invisible_until_commit() {
        let (store, accounts) = seeded(&[100, 0]).await;
        let (a, b) = (accounts[0].id, accounts[1].id);

        let mut uow = store.begin().await.unwrap();
        let transfer = uow
            .create_transfer(TransferParams::new(a, b, 10))
            .await
            .unwrap();
        let entry = uow.create_entry(a, -10).await.unwrap();
        uow.get_account_for_update(a).await.unwrap();
        let updated = uow.add_balance(a, -10).await.unwrap();
        assert_eq!(updated.balance, 90);
        assert_eq!(uow.get_account(a).await.unwrap().balance, 90);

        assert_eq!(store.get_account(a).await.unwrap().balance, 100);
        assert!(store.get_transfer(transfer.id).await.is_err());
        assert!(store.get_entry(entry.id).await.is_err());

        uow.commit().await.unwrap();

        assert_eq!(store.get_account(a).await.unwrap().balance, 90);
        assert_eq!(store.get_transfer(transfer.id).await.unwrap(), transfer);
        assert_eq!(store.get_entry(entry.id).await.unwrap(), entry);
    }

    #[tokio::test]
    async fn test_rollback_discards_writes() {
        let (store, accounts) = seeded(&[100, 0]).await;
        let (a, b) = (accounts[0].id, accounts[1].id);

        let mut uow = store.begin().await.unwrap();
        uow.create_transfer(TransferParams::new(a, b, 10))
            .await
            .unwrap();
        uow.get_account_for_update(a).await.unwrap();
        uow.add_balance(a, -10).await.unwrap();
        uow.rollback().await.unwrap();

        assert_eq!(store.get_account(a).await.unwrap().balance, 100);
        let transfers = store
            .list_transfers(ListTransfersParams::default())
            .await
            .unwrap();
        assert!(transfers.is_empty());
    }

    #[tokio::test]
    async fn test_dropped_unit_of_work_releases_lock() {
        let (store, accounts) = seeded(&[100]).await;
        let a = accounts[0].id;

        {
            let mut uow = store.begin().await.unwrap();
            uow.get_account_for_update(a).await.unwrap();
            uow.add_balance(a, 50).await.unwrap();
        }

        let mut uow = store.begin().await.unwrap();
        let locked = uow.get_account_for_update(a).await.unwrap();
        assert_eq!(locked.balance, 100);
    }

    #[tokio::test]
    async fn test_lock_wait_times_out_with_conflict() {
        let (store, accounts) = seeded(&[100]).await;
        let a = accounts[0].id;

        let mut holder = store.begin().await.unwrap();
        holder.get_account_for_update(a).await.unwrap();

        let mut waiter = store.begin().await.unwrap();
        let err = waiter.get_account_for_update(a).await.unwrap_err();
        assert!(matches!(err, LedgerError::Conflict(_)));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_waiter_sees_committed_balance() {
        let (store, accounts) = seeded(&[100]).await;
        let a = accounts[0].id;

        let mut holder = store.begin().await.unwrap();
        holder.get_account_for_update(a).await.unwrap();
        holder.add_balance(a, -40).await.unwrap();

        let waiter_store = store.clone();
        let waiter = tokio::spawn(async move {
            let mut uow = waiter_store.begin().await.unwrap();
            uow.get_account_for_update(a).await.unwrap()
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        holder.commit().await.unwrap();

        let seen = waiter.await.unwrap();
        assert_eq!(seen.balance, 60);
    }

    #[tokio::test]
    async fn test_add_balance_requires_lock() {
        let (store, accounts) = seeded(&[100]).await;
        let mut uow = store.begin().await.unwrap();

        let err = uow.add_balance(accounts[0].id, 5).await.unwrap_err();
        assert!(matches!(err, LedgerError::Fatal(_)));

        let err = uow.add_balance(999, 5).await.unwrap_err();
        assert!(matches!(err, LedgerError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_create_entry_requires_account() {
        let (store, _) = seeded(&[]).await;
        let mut uow = store.begin().await.unwrap();
        let err = uow.create_entry(42, 10).await.unwrap_err();
        assert!(matches!(err, LedgerError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_create_transfer_validation() {
        let (store, accounts) = seeded(&[100, 0]).await;
        let (a, b) = (accounts[0].id, accounts[1].id);
        let mut uow = store.begin().await.unwrap();

        assert!(matches!(
            uow.create_transfer(TransferParams::new(a, a, 10)).await,
            Err(LedgerError::InvalidArgument(_))
        ));
        assert!(matches!(
            uow.create_transfer(TransferParams::new(a, b, 0)).await,
            Err(LedgerError::InvalidArgument(_))
        ));
        assert!(matches!(
            uow.create_transfer(TransferParams::new(a, 999, 10)).await,
            Err(LedgerError::NotFound(_))
        ));

        let transfer = uow
            .create_transfer(TransferParams::new(a, b, 10))
            .await
            .unwrap();
        assert_eq!(transfer.from_account_id, a);
        assert_eq!(transfer.to_account_id, b);
        assert_eq!(transfer.amount, 10);
        assert!(transfer.id > 0);
    }

    #[tokio::test]
    async fn test_balance_overflow_rejected() {
        let (store, accounts) = seeded(&[i64::MAX]).await;
        let mut uow = store.begin().await.unwrap();
        uow.get_account_for_update(accounts[0].id).await.unwrap();
        let err = uow.add_balance(accounts[0].id, 1).await.unwrap_err();
        assert!(matches!(err, LedgerError::InvalidArgument(_)));
    }
}
