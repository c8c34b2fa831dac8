//! `object_store` backed client.
//!
//! Builds one shared handle at startup (S3-compatible endpoint, or a local
//! directory for `file://` endpoints) and adapts it to [`ObjectStoreClient`].

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt};
use object_store::aws::AmazonS3Builder;
use object_store::buffered::BufWriter;
use object_store::local::LocalFileSystem;
use object_store::path::Path as ObjectPath;
use object_store::{Attribute, Attributes, ObjectStore};
use tokio::io::{AsyncRead, AsyncWriteExt};
use tokio_util::sync::CancellationToken;

use super::{ByteStream, ObjectStoreClient};
use crate::config::BucketConfig;
use crate::error::{StoreError, SyncError};

/// Adapter from any `object_store` backend to [`ObjectStoreClient`].
#[derive(Debug, Clone)]
pub struct S3Store {
    inner: Arc<dyn ObjectStore>,
    content_types: bool,
}

impl S3Store {
    pub fn new(inner: Arc<dyn ObjectStore>) -> Self {
        Self {
            inner,
            content_types: true,
        }
    }

    /// Wrap a backend that cannot store object attributes, such as a local
    /// directory. Content types are dropped on upload.
    pub fn without_content_types(inner: Arc<dyn ObjectStore>) -> Self {
        Self {
            inner,
            content_types: false,
        }
    }

    /// Connect using the bucket section of the configuration.
    pub fn from_config(config: &BucketConfig) -> Result<Self, SyncError> {
        if let Some(dir) = config.endpoint.strip_prefix("file://") {
            let root = PathBuf::from(dir).join(&config.bucket);
            std::fs::create_dir_all(&root).map_err(|e| SyncError::Store(e.into()))?;
            let local = LocalFileSystem::new_with_prefix(&root)
                .map_err(|e| SyncError::Store(e.into()))?;
            tracing::debug!("using local directory store at {}", root.display());
            return Ok(Self::without_content_types(Arc::new(local)));
        }

        let s3 = AmazonS3Builder::new()
            .with_endpoint(endpoint_url(&config.endpoint, config.secure))
            .with_allow_http(!config.secure)
            .with_region(&config.region)
            .with_bucket_name(&config.bucket)
            .with_access_key_id(&config.access_key)
            .with_secret_access_key(&config.secret_key)
            .build()
            .map_err(|e| SyncError::Store(e.into()))?;

        tracing::debug!(
            "using S3 endpoint {} bucket {}",
            config.endpoint,
            config.bucket
        );
        Ok(Self::new(Arc::new(s3)))
    }

    pub fn inner(&self) -> &Arc<dyn ObjectStore> {
        &self.inner
    }
}

/// Prepend a scheme to bare `host[:port]` endpoints.
fn endpoint_url(endpoint: &str, secure: bool) -> String {
    if endpoint.contains("://") {
        endpoint.to_string()
    } else if secure {
        format!("https://{}", endpoint)
    } else {
        format!("http://{}", endpoint)
    }
}

fn object_path(key: &str) -> Result<ObjectPath, StoreError> {
    ObjectPath::parse(key).map_err(|e| StoreError::InvalidKey {
        key: key.to_string(),
        reason: e.to_string(),
    })
}

fn map_backend(key: &str, err: object_store::Error) -> StoreError {
    match err {
        object_store::Error::NotFound { .. } => StoreError::NotFound {
            key: key.to_string(),
        },
        other => StoreError::Backend(other),
    }
}

#[async_trait]
impl ObjectStoreClient for S3Store {
    async fn put(
        &self,
        key: &str,
        body: &mut (dyn AsyncRead + Send + Unpin),
        size: u64,
        content_type: &str,
        cancel: &CancellationToken,
    ) -> Result<u64, StoreError> {
        let path = object_path(key)?;

        let mut writer = BufWriter::new(Arc::clone(&self.inner), path);
        if self.content_types {
            let mut attributes = Attributes::new();
            attributes.insert(Attribute::ContentType, content_type.to_string().into());
            writer = writer.with_attributes(attributes);
        }

        let copied = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            copied = tokio::io::copy(body, &mut writer) => Some(copied),
        };
        let copied = match copied {
            Some(Ok(n)) => n,
            Some(Err(e)) => {
                let _ = writer.abort().await;
                return Err(e.into());
            }
            None => {
                // Drops the pending multipart upload.
                let _ = writer.abort().await;
                return Err(StoreError::Cancelled);
            }
        };

        if copied != size {
            let _ = writer.abort().await;
            return Err(StoreError::SizeMismatch {
                key: key.to_string(),
                declared: size,
                actual: copied,
            });
        }

        writer.shutdown().await?;
        Ok(copied)
    }

    async fn get(&self, key: &str) -> Result<ByteStream, StoreError> {
        let path = object_path(key)?;
        let result = self.inner.get(&path).await.map_err(|e| map_backend(key, e))?;

        let key = key.to_string();
        Ok(result
            .into_stream()
            .map_err(move |e| map_backend(&key, e))
            .boxed())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        let path = object_path(prefix)?;
        let keys = self
            .inner
            .list(Some(&path))
            .map_ok(|meta| meta.location.to_string())
            .try_collect::<Vec<_>>()
            .await?;
        Ok(keys)
    }
}
