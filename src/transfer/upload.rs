//! Local file -> object store.

use tokio::fs::File;
use tokio::io::BufReader;
use tokio_util::sync::CancellationToken;

use super::job::{TransferJob, DATA_CHUNK_SIZE};
use crate::error::{StoreError, TransferErrorKind};
use crate::store::{content_type_for, ObjectStoreClient};

/// Stream one local file to its key, declaring the exact size up front.
pub async fn upload_file(
    store: &dyn ObjectStoreClient,
    job: &TransferJob,
    cancel: &CancellationToken,
) -> Result<u64, TransferErrorKind> {
    let file = File::open(&job.local_path)
        .await
        .map_err(TransferErrorKind::Open)?;
    let size = file
        .metadata()
        .await
        .map_err(TransferErrorKind::Stat)?
        .len();
    let content_type = content_type_for(&job.local_path);
    let mut reader = BufReader::with_capacity(DATA_CHUNK_SIZE, file);

    tracing::debug!(
        "starting upload of {} to {} ({} bytes, {})",
        job.local_path.display(),
        job.key,
        size,
        content_type
    );

    let written = store
        .put(&job.key, &mut reader, size, &content_type, cancel)
        .await
        .map_err(|e| match e {
            StoreError::Cancelled => TransferErrorKind::Cancelled,
            other => TransferErrorKind::Store(other),
        })?;

    tracing::debug!(key = %job.key, size = written, path = %job.relative, "uploaded");
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::S3Store;
    use object_store::memory::InMemory;
    use object_store::path::Path as ObjectPath;
    use object_store::ObjectStore;
    use std::sync::Arc;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_upload_file() {
        let tmp = TempDir::new().unwrap();
        let local = tmp.path().join("slot1.sav");
        std::fs::write(&local, vec![7u8; 1000]).unwrap();

        let memory = Arc::new(InMemory::new());
        let store = S3Store::new(memory.clone());
        let job = TransferJob::upload(local, "g/r/slot1.sav".into(), "g/r");

        let n = upload_file(&store, &job, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(n, 1000);

        let meta = memory
            .head(&ObjectPath::parse("g/r/slot1.sav").unwrap())
            .await
            .unwrap();
        assert_eq!(meta.size, 1000);
    }

    #[tokio::test]
    async fn test_upload_missing_file_is_open_error() {
        let tmp = TempDir::new().unwrap();
        let store = S3Store::new(Arc::new(InMemory::new()));
        let job = TransferJob::upload(tmp.path().join("gone"), "g/r/gone".into(), "g/r");

        let err = upload_file(&store, &job, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, TransferErrorKind::Open(_)));
    }

    #[tokio::test]
    async fn test_upload_cancelled() {
        let tmp = TempDir::new().unwrap();
        let local = tmp.path().join("a.txt");
        std::fs::write(&local, "abc").unwrap();
        let store = S3Store::new(Arc::new(InMemory::new()));
        let job = TransferJob::upload(local, "g/r/a.txt".into(), "g/r");

        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = upload_file(&store, &job, &cancel).await.unwrap_err();
        assert!(matches!(err, TransferErrorKind::Cancelled));
    }
}
