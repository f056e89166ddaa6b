//! In-memory relational store for tests. A transaction works on a private copy
//! of the committed rows and publishes it on commit.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::async_trait;

use crate::accounts::repo::AccountRepository;
use crate::accounts::repo_types::{Account, NewAccount};
use crate::db::{RelationalStore, StoreTx};

#[derive(Debug, Clone, Default)]
struct Rows {
    last_id: i64,
    accounts: BTreeMap<i64, Account>,
}

#[derive(Default)]
struct Counters {
    begun: AtomicUsize,
    committed: AtomicUsize,
    rolled_back: AtomicUsize,
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    rows: Arc<Mutex<Rows>>,
    counters: Arc<Counters>,
    fail_writes: Arc<AtomicBool>,
    begin_delay: Arc<Mutex<Option<Duration>>>,
    commit_delay: Arc<Mutex<Option<Duration>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every insert/update/delete fail until switched off again.
    pub fn fail_writes(&self, on: bool) {
        self.fail_writes.store(on, Ordering::SeqCst);
    }

    pub fn stall_begin(&self, delay: Duration) {
        *self.begin_delay.lock().unwrap() = Some(delay);
    }

    /// Delay every commit before the staged rows are published.
    pub fn stall_commit(&self, delay: Duration) {
        *self.commit_delay.lock().unwrap() = Some(delay);
    }

    pub fn row_count(&self) -> usize {
        self.rows.lock().unwrap().accounts.len()
    }

    pub fn stored(&self, id: i64) -> Option<Account> {
        self.rows.lock().unwrap().accounts.get(&id).cloned()
    }

    pub fn commits(&self) -> usize {
        self.counters.committed.load(Ordering::SeqCst)
    }

    pub fn rollbacks(&self) -> usize {
        self.counters.rolled_back.load(Ordering::SeqCst)
    }

    /// Transactions neither committed nor rolled back explicitly.
    pub fn unfinished(&self) -> usize {
        self.counters.begun.load(Ordering::SeqCst) - self.commits() - self.rollbacks()
    }
}

#[async_trait]
impl RelationalStore for MemoryStore {
    async fn begin(&self) -> anyhow::Result<Box<dyn StoreTx>> {
        let delay = *self.begin_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.counters.begun.fetch_add(1, Ordering::SeqCst);
        let staged = self.rows.lock().unwrap().clone();
        Ok(Box::new(MemoryTx {
            staged,
            store: self.clone(),
        }))
    }
}

struct MemoryTx {
    staged: Rows,
    store: MemoryStore,
}

impl MemoryTx {
    fn check_writable(&self) -> anyhow::Result<()> {
        if self.store.fail_writes.load(Ordering::SeqCst) {
            anyhow::bail!("simulated write failure");
        }
        Ok(())
    }
}

#[async_trait]
impl AccountRepository for MemoryTx {
    async fn insert_account(&mut self, account: &NewAccount) -> anyhow::Result<i64> {
        self.check_writable()?;
        self.staged.last_id += 1;
        let id = self.staged.last_id;
        self.staged
            .accounts
            .insert(id, account.clone().into_account(id));
        Ok(id)
    }

    async fn update_account(&mut self, account: &Account) -> anyhow::Result<u64> {
        self.check_writable()?;
        match self.staged.accounts.get_mut(&account.id) {
            Some(row) => {
                *row = account.clone();
                Ok(1)
            }
            None => Ok(0),
        }
    }

    async fn find_by_id(&mut self, id: i64) -> anyhow::Result<Option<Account>> {
        Ok(self.staged.accounts.get(&id).cloned())
    }

    async fn find_by_username(&mut self, username: &str) -> anyhow::Result<Option<Account>> {
        Ok(self
            .staged
            .accounts
            .values()
            .find(|a| a.username == username)
            .cloned())
    }

    async fn find_all(&mut self) -> anyhow::Result<Vec<Account>> {
        Ok(self.staged.accounts.values().cloned().collect())
    }

    async fn delete_by_id(&mut self, id: i64) -> anyhow::Result<u64> {
        self.check_writable()?;
        Ok(self.staged.accounts.remove(&id).map_or(0, |_| 1))
    }
}

#[async_trait]
impl StoreTx for MemoryTx {
    async fn commit(self: Box<Self>) -> anyhow::Result<()> {
        let MemoryTx { staged, store } = *self;
        let delay = *store.commit_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        *store.rows.lock().unwrap() = staged;
        store.counters.committed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> anyhow::Result<()> {
        self.store.counters.rolled_back.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
