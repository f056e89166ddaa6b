use std::time::Duration;

use anyhow::Context;
use aws_config::{defaults, BehaviorVersion};
use aws_credential_types::Credentials;
use aws_sdk_s3::{
    config::{Builder as S3ConfigBuilder, Region},
    presigning::PresigningConfig,
    types::{BucketLocationConstraint, CreateBucketConfiguration},
    Client,
};
use aws_smithy_types::byte_stream::ByteStream;
use axum::async_trait;
use bytes::Bytes;
use tracing::{debug, info};

use crate::config::StorageConfig;

/// Result of a successful upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PutInfo {
    pub etag: String,
    pub size: u64,
}

#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Create `bucket` unless it already exists.
    async fn ensure_bucket(&self, bucket: &str) -> anyhow::Result<()>;
    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: Bytes,
        content_type: &str,
    ) -> anyhow::Result<PutInfo>;
    async fn presign_get(&self, bucket: &str, key: &str, expires_in: Duration) -> anyhow::Result<String>;
}

/// S3-compatible object storage (MinIO in development).
#[derive(Clone)]
pub struct S3Storage {
    client: Client,
    region: String,
}

impl S3Storage {
    pub async fn new(cfg: &StorageConfig) -> anyhow::Result<Self> {
        let shared = defaults(BehaviorVersion::latest())
            .region(Region::new(cfg.region.clone()))
            .credentials_provider(Credentials::new(
                &cfg.access_key,
                &cfg.secret_key,
                None,
                None,
                "static",
            ))
            .endpoint_url(&cfg.endpoint)
            .load()
            .await;

        let conf = S3ConfigBuilder::from(&shared)
            .endpoint_url(&cfg.endpoint)
            .force_path_style(true)
            .build();

        info!(endpoint = %cfg.endpoint, "object storage client configured");
        Ok(Self {
            client: Client::from_conf(conf),
            region: cfg.region.clone(),
        })
    }
}

#[async_trait]
impl BlobStore for S3Storage {
    async fn ensure_bucket(&self, bucket: &str) -> anyhow::Result<()> {
        match self.client.head_bucket().bucket(bucket).send().await {
            Ok(_) => return Ok(()),
            Err(e) if e.as_service_error().is_some_and(|se| se.is_not_found()) => {}
            Err(e) => return Err(e).with_context(|| format!("s3 head_bucket {bucket}")),
        }

        let mut req = self.client.create_bucket().bucket(bucket);
        if self.region != "us-east-1" {
            req = req.create_bucket_configuration(
                CreateBucketConfiguration::builder()
                    .location_constraint(BucketLocationConstraint::from(self.region.as_str()))
                    .build(),
            );
        }
        match req.send().await {
            Ok(_) => {
                info!(%bucket, "bucket created");
                Ok(())
            }
            // Lost a race with another creator.
            Err(e)
                if e.as_service_error()
                    .is_some_and(|se| se.is_bucket_already_owned_by_you()) =>
            {
                Ok(())
            }
            Err(e) => Err(e).with_context(|| format!("s3 create_bucket {bucket}")),
        }
    }

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: Bytes,
        content_type: &str,
    ) -> anyhow::Result<PutInfo> {
        let size = body.len() as u64;
        let out = self
            .client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(ByteStream::from(body))
            .content_type(content_type)
            .send()
            .await
            .with_context(|| format!("s3 put_object {bucket}/{key}"))?;
        let etag = out.e_tag().unwrap_or_default().trim_matches('"').to_string();
        debug!(%bucket, %key, %etag, size, "object stored");
        Ok(PutInfo { etag, size })
    }

    async fn presign_get(&self, bucket: &str, key: &str, expires_in: Duration) -> anyhow::Result<String> {
        let presigned = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .presigned(PresigningConfig::expires_in(expires_in)?)
            .await
            .with_context(|| format!("s3 presign_get {bucket}/{key}"))?;
        Ok(presigned.uri().to_string())
    }
}
