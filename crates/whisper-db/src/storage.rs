//! MinIO / S3-compatible presigning client.
//!
//! The relay never proxies blob bytes: uploads and downloads go straight
//! to object storage via time-limited presigned URLs. Wraps `aws-sdk-s3`.

use anyhow::{Context, Result};
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::{
    Client,
    config::{Builder as S3Builder, Credentials, Region},
};
use std::time::Duration;
use whisper_common::config::StorageConfig;

/// S3/MinIO presigning client.
#[derive(Clone)]
pub struct StorageClient {
    inner: Client,
    bucket: String,
}

impl StorageClient {
    /// Initialise client from config.
    pub fn new(cfg: &StorageConfig) -> Result<Self> {
        let creds = Credentials::new(
            &cfg.access_key,
            &cfg.secret_key,
            None, // session token
            None, // expiry
            "whisper-storage",
        );

        let s3_cfg = S3Builder::new()
            .endpoint_url(&cfg.endpoint)
            .credentials_provider(creds)
            .region(Region::new(cfg.region.clone()))
            // Force path-style URLs (required for MinIO)
            .force_path_style(true)
            .build();

        Ok(Self { inner: Client::from_conf(s3_cfg), bucket: cfg.bucket.clone() })
    }

    /// Create the bucket if it does not exist yet.
    pub async fn ensure_bucket(&self) -> Result<()> {
        let exists = self.inner.head_bucket().bucket(&self.bucket).send().await.is_ok();
        if !exists {
            self.inner
                .create_bucket()
                .bucket(&self.bucket)
                .send()
                .await
                .with_context(|| format!("Failed to create bucket {}", self.bucket))?;
            tracing::info!(bucket = %self.bucket, "Created storage bucket");
        }
        Ok(())
    }

    /// Presigned PUT URL for a client-side upload.
    pub async fn presigned_put_url(
        &self,
        key: &str,
        content_type: &str,
        expiry_secs: u64,
    ) -> Result<String> {
        let presigning_cfg = PresigningConfig::expires_in(Duration::from_secs(expiry_secs))
            .context("Failed to build presigning config")?;

        let req = self
            .inner
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .presigned(presigning_cfg)
            .await
            .with_context(|| format!("Failed to presign upload for {key}"))?;

        Ok(req.uri().to_string())
    }

    /// Presigned GET URL for a granted download.
    pub async fn presigned_get_url(&self, key: &str, expiry_secs: u64) -> Result<String> {
        let presigning_cfg = PresigningConfig::expires_in(Duration::from_secs(expiry_secs))
            .context("Failed to build presigning config")?;

        let req = self
            .inner
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .presigned(presigning_cfg)
            .await
            .with_context(|| format!("Failed to presign download for {key}"))?;

        Ok(req.uri().to_string())
    }
}
