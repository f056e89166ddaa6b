use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use email_address::EmailAddress;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use super::password::hash_password_blocking;
use super::repo_types::{Account, NewAccount};
use crate::db::{RelationalStore, StoreTx};
use crate::error::AccountError;
use crate::objects::snapshot::SnapshotExporter;

pub const MIN_PASSWORD_CHARS: usize = 8;

/// RFC 5322 address syntax. Single-label domains such as `localhost` pass.
pub(crate) fn is_valid_email(email: &str) -> bool {
    EmailAddress::is_valid(email)
}

fn validate_credentials(username: &str, password: &str, email: &str) -> Result<(), AccountError> {
    if username.trim().is_empty() {
        return Err(AccountError::InvalidInput("username is required".into()));
    }
    if !is_valid_email(email) {
        return Err(AccountError::InvalidInput(format!("invalid email: {email:?}")));
    }
    if password.chars().count() < MIN_PASSWORD_CHARS {
        return Err(AccountError::InvalidInput(format!(
            "password must contain at least {MIN_PASSWORD_CHARS} characters"
        )));
    }
    Ok(())
}

/// Rolls back `tx` and hands back `err`. A failed rollback is only logged;
/// the transaction is dropped either way.
async fn abort(tx: Box<dyn StoreTx>, err: AccountError) -> AccountError {
    if let Err(e) = tx.rollback().await {
        error!(error = %e, "rollback failed");
    }
    err
}

/// Sole entry point for account reads and writes.
///
/// Every operation runs as one transaction under a process-wide lock, so two
/// operations never interleave and the username check cannot race a write.
/// Successful creates and updates schedule a detached snapshot export.
pub struct AccountManager {
    lock: Mutex<()>,
    store: Arc<dyn RelationalStore>,
    exporter: Option<SnapshotExporter>,
    op_timeout: Duration,
}

impl AccountManager {
    pub fn new(
        store: Arc<dyn RelationalStore>,
        exporter: Option<SnapshotExporter>,
        op_timeout: Duration,
    ) -> Self {
        Self {
            lock: Mutex::new(()),
            store,
            exporter,
            op_timeout,
        }
    }

    /// Runs `work` while holding the global lock and commits the transaction
    /// it hands back. Only `work` is bounded by the store deadline; on expiry
    /// it is dropped, and with it any open transaction. The commit runs to
    /// completion once started.
    async fn serialized<T, F>(&self, op: &'static str, work: F) -> Result<T, AccountError>
    where
        F: Future<Output = Result<(Box<dyn StoreTx>, T), AccountError>>,
    {
        let _guard = self.lock.lock().await;
        let result = match tokio::time::timeout(self.op_timeout, work).await {
            Ok(Ok((tx, value))) => tx
                .commit()
                .await
                .map(|()| value)
                .map_err(AccountError::Persistence),
            Ok(Err(e)) => Err(e),
            Err(_) => {
                error!(op, timeout = ?self.op_timeout, "store operation timed out");
                Err(AccountError::Persistence(anyhow::anyhow!(
                    "{op} did not finish within {:?}",
                    self.op_timeout
                )))
            }
        };
        let outcome = match &result {
            Ok(_) => "ok",
            Err(e) => e.kind(),
        };
        metrics::counter!("account_operations_total", "op" => op, "outcome" => outcome).increment(1);
        result
    }

    async fn begin(&self) -> Result<Box<dyn StoreTx>, AccountError> {
        self.store.begin().await.map_err(AccountError::Persistence)
    }

    fn export(&self, account: &Account) {
        if let Some(exporter) = &self.exporter {
            exporter.spawn(account.clone());
        }
    }

    pub async fn add_user(&self, username: &str, password: &str, email: &str) -> Result<Account, AccountError> {
        info!(%username, "creating account");
        let account = self
            .serialized("add_user", async {
                validate_credentials(username, password, email)?;

                let mut tx = self.begin().await?;
                match tx.find_by_username(username).await {
                    Ok(None) => {}
                    Ok(Some(_)) => {
                        warn!(%username, "username already taken");
                        return Err(abort(
                            tx,
                            AccountError::Conflict(format!("username {username:?} is already taken")),
                        )
                        .await);
                    }
                    Err(e) => return Err(abort(tx, AccountError::Persistence(e)).await),
                }

                let password_hash = match hash_password_blocking(password.to_string()).await {
                    Ok(h) => h,
                    Err(e) => return Err(abort(tx, AccountError::Persistence(e)).await),
                };
                let new = NewAccount {
                    username: username.to_string(),
                    email: email.to_string(),
                    password_hash,
                };
                let id = match tx.insert_account(&new).await {
                    Ok(id) => id,
                    Err(e) => {
                        error!(error = %e, %username, "insert account failed");
                        return Err(abort(tx, AccountError::Persistence(e)).await);
                    }
                };
                Ok((tx, new.into_account(id)))
            })
            .await?;

        info!(user_id = account.id, username = %account.username, "account created");
        self.export(&account);
        Ok(account)
    }

    /// Full replace: username, email and a freshly salted hash of `password`.
    /// Taking a username held by another account is a conflict; keeping one's
    /// own username is not.
    pub async fn update_user(
        &self,
        id: i64,
        username: &str,
        password: &str,
        email: &str,
    ) -> Result<Account, AccountError> {
        info!(user_id = id, %username, "updating account");
        let account = self
            .serialized("update_user", async {
                validate_credentials(username, password, email)?;

                let mut tx = self.begin().await?;
                match tx.find_by_id(id).await {
                    Ok(Some(_)) => {}
                    Ok(None) => {
                        return Err(abort(tx, AccountError::NotFound(format!("account {id} not found"))).await)
                    }
                    Err(e) => return Err(abort(tx, AccountError::Persistence(e)).await),
                }
                match tx.find_by_username(username).await {
                    Ok(Some(holder)) if holder.id != id => {
                        warn!(user_id = id, %username, holder = holder.id, "username already taken");
                        return Err(abort(
                            tx,
                            AccountError::Conflict(format!("username {username:?} is already taken")),
                        )
                        .await);
                    }
                    Ok(_) => {}
                    Err(e) => return Err(abort(tx, AccountError::Persistence(e)).await),
                }

                let password_hash = match hash_password_blocking(password.to_string()).await {
                    Ok(h) => h,
                    Err(e) => return Err(abort(tx, AccountError::Persistence(e)).await),
                };
                let account = Account {
                    id,
                    username: username.to_string(),
                    email: email.to_string(),
                    password_hash,
                };
                if let Err(e) = tx.update_account(&account).await {
                    error!(error = %e, user_id = id, "update account failed");
                    return Err(abort(tx, AccountError::Persistence(e)).await);
                }
                Ok((tx, account))
            })
            .await?;

        info!(user_id = account.id, username = %account.username, "account updated");
        self.export(&account);
        Ok(account)
    }

    pub async fn find_user_by_id(&self, id: i64) -> Result<Account, AccountError> {
        debug!(user_id = id, "looking up account by id");
        self.serialized("find_user_by_id", async {
            let mut tx = self.begin().await?;
            match tx.find_by_id(id).await {
                Ok(Some(account)) => Ok((tx, account)),
                Ok(None) => Err(abort(tx, AccountError::NotFound(format!("account {id} not found"))).await),
                Err(e) => Err(abort(tx, AccountError::Persistence(e)).await),
            }
        })
        .await
    }

    pub async fn find_user_by_name(&self, username: &str) -> Result<Account, AccountError> {
        debug!(%username, "looking up account by username");
        self.serialized("find_user_by_name", async {
            let mut tx = self.begin().await?;
            match tx.find_by_username(username).await {
                Ok(Some(account)) => Ok((tx, account)),
                Ok(None) => Err(abort(
                    tx,
                    AccountError::NotFound(format!("account {username:?} not found")),
                )
                .await),
                Err(e) => Err(abort(tx, AccountError::Persistence(e)).await),
            }
        })
        .await
    }

    /// An empty store is reported as `NotFound`, not as an empty list.
    pub async fn find_all_users(&self) -> Result<Vec<Account>, AccountError> {
        debug!("listing accounts");
        self.serialized("find_all_users", async {
            let mut tx = self.begin().await?;
            match tx.find_all().await {
                Ok(accounts) if accounts.is_empty() => {
                    Err(abort(tx, AccountError::NotFound("no accounts found".into())).await)
                }
                Ok(accounts) => Ok((tx, accounts)),
                Err(e) => Err(abort(tx, AccountError::Persistence(e)).await),
            }
        })
        .await
    }

    /// Deleting an id that does not exist succeeds without touching any row.
    pub async fn delete_user_by_id(&self, id: i64) -> Result<(), AccountError> {
        info!(user_id = id, "deleting account");
        self.serialized("delete_user_by_id", async {
            let mut tx = self.begin().await?;
            match tx.delete_by_id(id).await {
                Ok(rows) => {
                    debug!(user_id = id, rows, "account delete staged");
                    Ok((tx, ()))
                }
                Err(e) => {
                    error!(error = %e, user_id = id, "delete account failed");
                    Err(abort(tx, AccountError::Persistence(e)).await)
                }
            }
        })
        .await
    }
}
