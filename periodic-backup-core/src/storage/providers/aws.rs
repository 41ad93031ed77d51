//! AWS S3 object store client
//!
//! Works against AWS S3 and S3-compatible services (MinIO, Wasabi, ...) when
//! a custom endpoint is configured. Credentials come from the standard AWS
//! environment chain.

use async_trait::async_trait;
use aws_sdk_s3::error::{DisplayErrorContext, SdkError};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use bytes::Bytes;
use std::path::Path;
use tracing::{debug, info};

use crate::storage::ObjectStoreClient;
use crate::{PeriodicBackupError, Result};

#[derive(Debug, Clone)]
pub struct S3ObjectStore {
    client: Client,
}

impl S3ObjectStore {
    /// Create a client from the environment, optionally overriding region and endpoint
    pub async fn new(region: Option<&str>, endpoint: Option<&str>) -> Result<Self> {
        let mut loader = aws_config::from_env();
        if let Some(region) = region {
            loader = loader.region(aws_sdk_s3::config::Region::new(region.to_string()));
        }
        let aws_config = loader.load().await;

        let mut s3_config_builder = aws_sdk_s3::config::Builder::from(&aws_config);
        if let Some(endpoint) = endpoint {
            s3_config_builder = s3_config_builder.endpoint_url(endpoint).force_path_style(true);
        }

        let client = Client::from_conf(s3_config_builder.build());
        info!(
            "S3 object store initialized: region={:?}, endpoint={:?}",
            region, endpoint
        );

        Ok(Self { client })
    }

    pub fn from_client(client: Client) -> Self {
        Self { client }
    }
}

fn transfer_error<E, R>(context: String, err: SdkError<E, R>) -> PeriodicBackupError
where
    E: std::error::Error + 'static,
    R: std::fmt::Debug,
{
    PeriodicBackupError::transfer(context, DisplayErrorContext(err))
}

#[async_trait]
impl ObjectStoreClient for S3ObjectStore {
    async fn list_keys(&self, bucket: &str) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        let mut continuation: Option<String> = None;

        loop {
            let response = self
                .client
                .list_objects_v2()
                .bucket(bucket)
                .set_continuation_token(continuation.take())
                .send()
                .await
                .map_err(|e| transfer_error(format!("list {}", bucket), e))?;

            keys.extend(
                response
                    .contents()
                    .iter()
                    .filter_map(|object| object.key().map(str::to_string)),
            );

            match response.next_continuation_token() {
                Some(token) if response.is_truncated().unwrap_or(false) => {
                    continuation = Some(token.to_string());
                }
                _ => break,
            }
        }

        debug!("Listed {} keys in bucket {}", keys.len(), bucket);
        Ok(keys)
    }

    async fn put(&self, bucket: &str, key: &str, data: Bytes) -> Result<()> {
        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(ByteStream::from(data))
            .send()
            .await
            .map_err(|e| transfer_error(format!("put {}/{}", bucket, key), e))?;
        Ok(())
    }

    async fn put_file(&self, bucket: &str, key: &str, source: &Path) -> Result<()> {
        let body = ByteStream::from_path(source)
            .await
            .map_err(|e| PeriodicBackupError::transfer(format!("read {}", source.display()), e))?;

        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(body)
            .send()
            .await
            .map_err(|e| transfer_error(format!("put {}/{}", bucket, key), e))?;
        Ok(())
    }

    async fn get(&self, bucket: &str, key: &str) -> Result<Bytes> {
        let response = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| transfer_error(format!("get {}/{}", bucket, key), e))?;

        let data = response
            .body
            .collect()
            .await
            .map_err(|e| {
                PeriodicBackupError::transfer(format!("read body {}/{}", bucket, key), e)
            })?;
        Ok(data.into_bytes())
    }

    async fn delete(&self, bucket: &str, key: &str) -> Result<()> {
        self.client
            .delete_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| transfer_error(format!("delete {}/{}", bucket, key), e))?;
        Ok(())
    }

    async fn bucket_exists(&self, bucket: &str) -> Result<bool> {
        match self.client.head_bucket().bucket(bucket).send().await {
            Ok(_) => Ok(true),
            Err(SdkError::ServiceError(err)) if err.err().is_not_found() => Ok(false),
            Err(err) => Err(transfer_error(format!("head {}", bucket), err)),
        }
    }
}
