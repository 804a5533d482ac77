use crate::config::S3Config;
use anyhow::{Context, Result};
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client as S3Client;
use std::collections::HashMap;
use tracing::{debug, info, instrument};

/// Object content with the content type it was stored under
#[derive(Debug, Clone, PartialEq)]
pub struct StoredObject {
    pub bytes: Vec<u8>,
    pub content_type: String,
}

/// Key/value object storage holding photo bytes
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store `bytes` under `key` and return the URL it is reachable at
    async fn put(
        &self,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
        metadata: HashMap<String, String>,
    ) -> Result<String>;

    async fn get(&self, key: &str) -> Result<StoredObject>;

    async fn delete(&self, key: &str) -> Result<()>;

    /// URL an object under `key` is (or would be) reachable at
    fn url_for(&self, key: &str) -> String;
}

/// S3-backed photo storage
pub struct S3ObjectStore {
    client: S3Client,
    bucket: String,
    config: S3Config,
}

impl S3ObjectStore {
    /// Build a client for the configured bucket. Credentials come from the
    /// default AWS provider chain.
    pub async fn new(config: &S3Config) -> Result<Self> {
        let shared = aws_config::defaults(BehaviorVersion::latest())
            .region(aws_config::Region::new(config.region.clone()))
            .load()
            .await;

        let mut builder = aws_sdk_s3::config::Builder::from(&shared);
        if let Some(endpoint) = config.endpoint_url.as_deref() {
            builder = builder.endpoint_url(endpoint);
        }
        builder = builder.force_path_style(config.force_path_style);

        info!(
            bucket = %config.bucket,
            region = %config.region,
            endpoint = config.endpoint_url.as_deref().unwrap_or("aws"),
            "Photo bucket client ready"
        );

        Ok(Self {
            client: S3Client::from_conf(builder.build()),
            bucket: config.bucket.clone(),
            config: config.clone(),
        })
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    #[instrument(skip(self, bytes, metadata), fields(bucket = %self.bucket, size_bytes = bytes.len()))]
    async fn put(
        &self,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
        metadata: HashMap<String, String>,
    ) -> Result<String> {
        debug!(key = %key, "Uploading photo to S3");

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(bytes))
            .content_type(content_type)
            .set_metadata(Some(metadata))
            .send()
            .await
            .context("Failed to upload photo to S3")?;

        Ok(self.url_for(key))
    }

    #[instrument(skip(self), fields(bucket = %self.bucket))]
    async fn get(&self, key: &str) -> Result<StoredObject> {
        let response = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .context("Failed to fetch photo from S3")?;

        let content_type = response
            .content_type()
            .unwrap_or("application/octet-stream")
            .to_string();

        let bytes = response
            .body
            .collect()
            .await
            .context("Failed to read photo body")?
            .into_bytes()
            .to_vec();

        Ok(StoredObject {
            bytes,
            content_type,
        })
    }

    #[instrument(skip(self), fields(bucket = %self.bucket))]
    async fn delete(&self, key: &str) -> Result<()> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .context("Failed to delete photo from S3")?;

        debug!(key = %key, "Photo deleted from S3");
        Ok(())
    }

    fn url_for(&self, key: &str) -> String {
        public_url(&self.config, key)
    }
}

/// Public URL of an object in the configured bucket
pub fn public_url(config: &S3Config, key: &str) -> String {
    if let Some(ref base) = config.public_url_base {
        return format!("{}/{}", base.trim_end_matches('/'), key);
    }

    match config.endpoint_url {
        Some(ref endpoint) if config.force_path_style => {
            format!("{}/{}/{}", endpoint.trim_end_matches('/'), config.bucket, key)
        }
        Some(ref endpoint) => {
            let (scheme, host) = endpoint
                .split_once("://")
                .unwrap_or(("https", endpoint.as_str()));
            format!(
                "{}://{}.{}/{}",
                scheme,
                config.bucket,
                host.trim_end_matches('/'),
                key
            )
        }
        None => format!(
            "https://{}.s3.{}.amazonaws.com/{}",
            config.bucket, config.region, key
        ),
    }
}

/// Get content type for a photo extension
pub fn content_type_for_extension(extension: &str) -> &'static str {
    match extension.to_lowercase().as_str() {
        "jpeg" | "jpg" => "image/jpeg",
        "png" => "image/png",
        "webp" => "image/webp",
        "bmp" => "image/bmp",
        "gif" => "image/gif",
        "tif" | "tiff" => "image/tiff",
        "heic" | "heif" => "image/heif",
        _ => "application/octet-stream",
    }
}
