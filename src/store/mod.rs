//! Object store interface consumed by the transfer workers.
//!
//! The engine only needs three calls: stream a file up, stream an object
//! down, and list keys under a prefix. [`S3Store`] implements them on top of
//! the `object_store` crate, so any backend it supports (S3-compatible
//! services, local directories, in-memory) can sit behind the engine.

pub mod s3;

use std::fmt::Debug;
use std::path::Path;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use tokio::io::AsyncRead;
use tokio_util::sync::CancellationToken;

use crate::error::StoreError;

pub use s3::S3Store;

/// Content type used when the extension says nothing useful.
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Extensions that game engines use for opaque save blobs. Some of them
/// collide with unrelated registered types, so they are pinned to binary.
const OPAQUE_SAVE_EXTENSIONS: &[&str] = &["sav", "save", "sl2", "srm", "state"];

/// Body of a downloaded object, delivered chunk by chunk.
pub type ByteStream = BoxStream<'static, Result<Bytes, StoreError>>;

/// A store the engine can move save files to and from.
///
/// Implementations are shared by every worker of a run, so they must be
/// usable concurrently through `&self`.
#[async_trait]
pub trait ObjectStoreClient: Send + Sync + Debug {
    /// Stream `size` bytes from `body` into `key`. Returns the bytes written.
    ///
    /// On cancellation nothing may become visible under `key`, and the call
    /// returns [`StoreError::Cancelled`].
    async fn put(
        &self,
        key: &str,
        body: &mut (dyn AsyncRead + Send + Unpin),
        size: u64,
        content_type: &str,
        cancel: &CancellationToken,
    ) -> Result<u64, StoreError>;

    /// Open the body of `key` for reading.
    async fn get(&self, key: &str) -> Result<ByteStream, StoreError>;

    /// Every key below `prefix`, recursively. Matching is per path segment,
    /// so `game/saves` does not match `game/saves2/x`.
    async fn list(&self, prefix: &str) -> Result<Vec<String>, StoreError>;
}

/// Infer a content type from a file's extension.
pub fn content_type_for(path: &Path) -> String {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase());

    match ext.as_deref() {
        Some(ext) if OPAQUE_SAVE_EXTENSIONS.contains(&ext) => DEFAULT_CONTENT_TYPE.to_string(),
        _ => mime_guess::from_path(path)
            .first_raw()
            .unwrap_or(DEFAULT_CONTENT_TYPE)
            .to_string(),
    }
}
