use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tracing::{info, instrument};

use crate::error::StorageError;
use crate::storage::BlobStore;

/// Deadline for a single call chain against object storage.
pub const BLOB_DEADLINE: Duration = Duration::from_secs(5);
/// Used when a presign request carries no positive expiry.
pub const DEFAULT_PRESIGN_EXPIRY: Duration = Duration::from_secs(15 * 60);
/// Longest expiry S3 signature v4 accepts.
pub const MAX_PRESIGN_EXPIRY: Duration = Duration::from_secs(7 * 24 * 60 * 60);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub bucket: String,
    pub object_name: String,
    pub etag: String,
    pub size: u64,
}

/// Bucket-aware facade over a [`BlobStore`] with a configured default bucket.
#[derive(Clone)]
pub struct ObjectStorage {
    blobs: Arc<dyn BlobStore>,
    default_bucket: String,
}

impl ObjectStorage {
    pub fn new(blobs: Arc<dyn BlobStore>, default_bucket: impl Into<String>) -> Self {
        Self {
            blobs,
            default_bucket: default_bucket.into(),
        }
    }

    pub fn default_bucket(&self) -> &str {
        &self.default_bucket
    }

    fn bucket_or_default(&self, bucket: Option<&str>) -> Result<String, StorageError> {
        match bucket.map(str::trim).filter(|b| !b.is_empty()) {
            Some(b) => Ok(b.to_string()),
            None if !self.default_bucket.is_empty() => Ok(self.default_bucket.clone()),
            None => Err(StorageError::InvalidInput("bucket name is required".into())),
        }
    }

    pub async fn ensure_default_bucket(&self) -> Result<(), StorageError> {
        let bucket = self.bucket_or_default(None)?;
        self.blobs
            .ensure_bucket(&bucket)
            .await
            .map_err(StorageError::Dependency)
    }

    #[instrument(skip(self, content), fields(size = content.len()))]
    pub async fn upload_object(
        &self,
        bucket: Option<&str>,
        object_name: &str,
        content: Bytes,
        content_type: Option<&str>,
    ) -> Result<StoredObject, StorageError> {
        let bucket = self.bucket_or_default(bucket)?;
        if object_name.trim().is_empty() {
            return Err(StorageError::InvalidInput("object name is required".into()));
        }
        let content_type = content_type
            .filter(|ct| !ct.is_empty())
            .unwrap_or("application/octet-stream");

        self.blobs
            .ensure_bucket(&bucket)
            .await
            .map_err(StorageError::Dependency)?;
        let put = self
            .blobs
            .put_object(&bucket, object_name, content, content_type)
            .await
            .map_err(StorageError::Dependency)?;

        info!(%bucket, object = %object_name, etag = %put.etag, "object uploaded");
        Ok(StoredObject {
            bucket,
            object_name: object_name.to_string(),
            etag: put.etag,
            size: put.size,
        })
    }

    /// Returns the URL together with the expiry actually applied.
    #[instrument(skip(self))]
    pub async fn presigned_url(
        &self,
        bucket: Option<&str>,
        object_name: &str,
        expiry_seconds: i64,
    ) -> Result<(String, Duration), StorageError> {
        let bucket = self.bucket_or_default(bucket)?;
        if object_name.trim().is_empty() {
            return Err(StorageError::InvalidInput("object name is required".into()));
        }
        let expiry = match u64::try_from(expiry_seconds) {
            Ok(secs) if secs > 0 => Duration::from_secs(secs),
            _ => DEFAULT_PRESIGN_EXPIRY,
        };
        if expiry > MAX_PRESIGN_EXPIRY {
            return Err(StorageError::InvalidInput(format!(
                "expiry must not exceed {} seconds",
                MAX_PRESIGN_EXPIRY.as_secs()
            )));
        }

        self.blobs
            .ensure_bucket(&bucket)
            .await
            .map_err(StorageError::Dependency)?;
        let url = self
            .blobs
            .presign_get(&bucket, object_name, expiry)
            .await
            .map_err(StorageError::Dependency)?;
        Ok((url, expiry))
    }
}

/// Bounds `fut` by `deadline`; expiry counts as the dependency being unavailable.
pub async fn with_deadline<T, F>(deadline: Duration, fut: F) -> Result<T, StorageError>
where
    F: Future<Output = Result<T, StorageError>>,
{
    tokio::time::timeout(deadline, fut).await.unwrap_or_else(|_| {
        Err(StorageError::Dependency(anyhow::anyhow!(
            "object storage did not answer within {deadline:?}"
        )))
    })
}
