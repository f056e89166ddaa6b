use anyhow::Context;
use axum::async_trait;

use crate::accounts::repo_types::{Account, NewAccount};
use crate::db::PgTx;

/// Account-shaped operations against an already open transaction.
/// Implementors never begin, commit or roll back on their own.
#[async_trait]
pub trait AccountRepository: Send {
    /// Insert a new account and return the generated id.
    async fn insert_account(&mut self, account: &NewAccount) -> anyhow::Result<i64>;
    /// Replace username, email and password hash of the row with `account.id`.
    async fn update_account(&mut self, account: &Account) -> anyhow::Result<u64>;
    async fn find_by_id(&mut self, id: i64) -> anyhow::Result<Option<Account>>;
    async fn find_by_username(&mut self, username: &str) -> anyhow::Result<Option<Account>>;
    async fn find_all(&mut self) -> anyhow::Result<Vec<Account>>;
    async fn delete_by_id(&mut self, id: i64) -> anyhow::Result<u64>;
}

#[async_trait]
impl AccountRepository for PgTx {
    async fn insert_account(&mut self, account: &NewAccount) -> anyhow::Result<i64> {
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO users (username, email, password_hash)
            VALUES ($1, $2, $3)
            RETURNING id
            "#,
        )
        .bind(&account.username)
        .bind(&account.email)
        .bind(&account.password_hash)
        .fetch_one(&mut *self.tx)
        .await
        .context("insert account")?;
        Ok(id)
    }

    async fn update_account(&mut self, account: &Account) -> anyhow::Result<u64> {
        let res = sqlx::query(
            r#"
            UPDATE users
               SET username = $2, email = $3, password_hash = $4
             WHERE id = $1
            "#,
        )
        .bind(account.id)
        .bind(&account.username)
        .bind(&account.email)
        .bind(&account.password_hash)
        .execute(&mut *self.tx)
        .await
        .context("update account")?;
        Ok(res.rows_affected())
    }

    async fn find_by_id(&mut self, id: i64) -> anyhow::Result<Option<Account>> {
        let account = sqlx::query_as::<_, Account>(
            r#"
            SELECT id, username, email, password_hash
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await
        .context("select account by id")?;
        Ok(account)
    }

    async fn find_by_username(&mut self, username: &str) -> anyhow::Result<Option<Account>> {
        let account = sqlx::query_as::<_, Account>(
            r#"
            SELECT id, username, email, password_hash
            FROM users
            WHERE username = $1
            LIMIT 1
            "#,
        )
        .bind(username)
        .fetch_optional(&mut *self.tx)
        .await
        .context("select account by username")?;
        Ok(account)
    }

    async fn find_all(&mut self) -> anyhow::Result<Vec<Account>> {
        let rows = sqlx::query_as::<_, Account>(
            r#"
            SELECT id, username, email, password_hash
            FROM users
            ORDER BY id
            "#,
        )
        .fetch_all(&mut *self.tx)
        .await
        .context("select all accounts")?;
        Ok(rows)
    }

    async fn delete_by_id(&mut self, id: i64) -> anyhow::Result<u64> {
        let res = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&mut *self.tx)
            .await
            .context("delete account")?;
        Ok(res.rows_affected())
    }
}
