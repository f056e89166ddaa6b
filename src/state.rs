use std::sync::Arc;

use governor::DefaultDirectRateLimiter;
use metrics_exporter_prometheus::PrometheusHandle;
use tracing::warn;

use crate::accounts::services::AccountManager;
use crate::config::AppConfig;
use crate::db::{PgStore, RelationalStore};
use crate::middleware::{build_limiter, install_recorder};
use crate::objects::services::{with_deadline, ObjectStorage, BLOB_DEADLINE};
use crate::objects::snapshot::SnapshotExporter;
use crate::storage::{BlobStore, S3Storage};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub accounts: Arc<AccountManager>,
    pub objects: ObjectStorage,
    pub limiter: Arc<DefaultDirectRateLimiter>,
    pub metrics: PrometheusHandle,
}

impl AppState {
    pub async fn init() -> anyhow::Result<Self> {
        let config = Arc::new(AppConfig::from_env()?);

        let store = PgStore::connect(&config.db).await?;
        if let Err(e) = sqlx::migrate!("./migrations").run(store.pool()).await {
            warn!(error = %e, "schema migration failed; continuing");
        }

        let blobs = Arc::new(S3Storage::new(&config.storage).await?) as Arc<dyn BlobStore>;
        let metrics = install_recorder()?;

        let state = Self::from_parts(config, Arc::new(store), blobs, metrics);
        if let Err(e) = with_deadline(BLOB_DEADLINE, state.objects.ensure_default_bucket()).await {
            warn!(error = %e, bucket = state.objects.default_bucket(), "unable to ensure default bucket");
        }
        Ok(state)
    }

    pub fn from_parts(
        config: Arc<AppConfig>,
        store: Arc<dyn RelationalStore>,
        blobs: Arc<dyn BlobStore>,
        metrics: PrometheusHandle,
    ) -> Self {
        let objects = ObjectStorage::new(blobs, config.storage.bucket.clone());
        let exporter = SnapshotExporter::new(objects.clone());
        let accounts = Arc::new(AccountManager::new(store, Some(exporter), config.db.op_timeout));
        let limiter = build_limiter(&config.http);
        Self {
            config,
            accounts,
            objects,
            limiter,
            metrics,
        }
    }

    /// State over in-memory fakes; nothing touches the network.
    #[cfg(test)]
    pub fn fake(
        store: crate::accounts::memory::MemoryStore,
        blobs: Arc<dyn BlobStore>,
    ) -> Self {
        use metrics_exporter_prometheus::PrometheusBuilder;

        let config = Arc::new(AppConfig::from_lookup(|_| None).expect("default config"));
        let metrics = PrometheusBuilder::new().build_recorder().handle();
        Self::from_parts(config, Arc::new(store), blobs, metrics)
    }
}
