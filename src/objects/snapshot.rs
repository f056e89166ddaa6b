use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use bytes::Bytes;
use serde::Serialize;
use time::OffsetDateTime;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::services::{with_deadline, ObjectStorage};
use crate::accounts::repo_types::Account;
use crate::error::StorageError;

/// Fixed upload deadline for one export, independent of any request.
pub const EXPORT_TIMEOUT: Duration = Duration::from_secs(5);
const SNAPSHOT_PREFIX: &str = "users";

/// Snapshot body. Unlike the API view, it carries the password hash.
#[derive(Debug, Serialize)]
struct AccountSnapshot<'a> {
    id: i64,
    username: &'a str,
    email: &'a str,
    password_hash: &'a str,
}

impl<'a> From<&'a Account> for AccountSnapshot<'a> {
    fn from(a: &'a Account) -> Self {
        Self {
            id: a.id,
            username: &a.username,
            email: &a.email,
            password_hash: &a.password_hash,
        }
    }
}

static LAST_STAMP: AtomicU64 = AtomicU64::new(0);

/// Wall-clock nanoseconds, bumped so that no two calls in this process return the same value.
fn unique_stamp() -> u64 {
    let now = u64::try_from(OffsetDateTime::now_utc().unix_timestamp_nanos()).unwrap_or_default();
    let prev = LAST_STAMP
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| Some(now.max(last + 1)))
        .unwrap_or_else(|last| last);
    now.max(prev + 1)
}

pub fn snapshot_object_name(account_id: i64) -> String {
    format!("{SNAPSHOT_PREFIX}/user-{account_id}-{}.json", unique_stamp())
}

/// Mirrors accounts into object storage as write-once JSON snapshots.
#[derive(Clone)]
pub struct SnapshotExporter {
    storage: ObjectStorage,
    timeout: Duration,
}

impl SnapshotExporter {
    pub fn new(storage: ObjectStorage) -> Self {
        Self {
            storage,
            timeout: EXPORT_TIMEOUT,
        }
    }

    /// Serialises `account` and uploads it into `bucket`, returning the object name.
    pub async fn export_snapshot(&self, bucket: &str, account: &Account) -> Result<String, StorageError> {
        if account.id <= 0 {
            return Err(StorageError::InvalidInput(
                "account has no identifier; nothing to export".into(),
            ));
        }
        let payload = serde_json::to_vec(&AccountSnapshot::from(account))
            .map_err(|e| StorageError::InvalidInput(format!("serialize snapshot: {e}")))?;
        let object_name = snapshot_object_name(account.id);

        with_deadline(
            self.timeout,
            self.storage.upload_object(
                Some(bucket),
                &object_name,
                Bytes::from(payload),
                Some("application/json"),
            ),
        )
        .await?;
        Ok(object_name)
    }

    /// Fire-and-forget export into the default bucket. The task is not tied to
    /// the caller; failures are logged and dropped.
    pub fn spawn(&self, account: Account) -> JoinHandle<()> {
        let exporter = self.clone();
        tokio::spawn(async move {
            let bucket = exporter.storage.default_bucket().to_string();
            match exporter.export_snapshot(&bucket, &account).await {
                Ok(object) => {
                    metrics::counter!("snapshot_exports_total", "outcome" => "ok").increment(1);
                    debug!(user_id = account.id, %bucket, %object, "snapshot exported");
                }
                Err(e) => {
                    metrics::counter!("snapshot_exports_total", "outcome" => "error").increment(1);
                    warn!(user_id = account.id, %bucket, error = %e, "snapshot export failed");
                }
            }
        })
    }
}
