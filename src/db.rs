use anyhow::Context;
use axum::async_trait;
use sqlx::{postgres::PgPoolOptions, PgPool, Postgres, Transaction};

use crate::accounts::repo::AccountRepository;
use crate::config::DbConfig;

/// A relational store that hands out one transaction handle per unit of work.
#[async_trait]
pub trait RelationalStore: Send + Sync {
    async fn begin(&self) -> anyhow::Result<Box<dyn StoreTx>>;
}

/// An open transaction. Dropping it without `commit` rolls the work back.
#[async_trait]
pub trait StoreTx: AccountRepository {
    async fn commit(self: Box<Self>) -> anyhow::Result<()>;
    async fn rollback(self: Box<Self>) -> anyhow::Result<()>;
}

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(cfg: &DbConfig) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(cfg.max_connections)
            .connect(&cfg.url)
            .await
            .context("connect to database")?;
        tracing::info!("database connected");
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl RelationalStore for PgStore {
    async fn begin(&self) -> anyhow::Result<Box<dyn StoreTx>> {
        let tx = self.pool.begin().await.context("begin transaction")?;
        Ok(Box::new(PgTx { tx }))
    }
}

pub struct PgTx {
    pub(crate) tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl StoreTx for PgTx {
    async fn commit(self: Box<Self>) -> anyhow::Result<()> {
        self.tx.commit().await.context("commit transaction")
    }

    async fn rollback(self: Box<Self>) -> anyhow::Result<()> {
        self.tx.rollback().await.context("rollback transaction")
    }
}
