//! Object store -> local file.
//!
//! Bytes land in a uniquely named temporary sibling first and are renamed
//! over the target once the whole body has been written, so a failed download
//! never leaves a truncated save behind.

use std::ffi::OsString;
use std::path::Path;

use futures::StreamExt;
use tempfile::{Builder, TempPath};
use tokio::fs::{self, File};
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio_util::sync::CancellationToken;

use super::job::{TransferJob, DATA_CHUNK_SIZE};
use crate::error::TransferErrorKind;
use crate::store::{ByteStream, ObjectStoreClient};

const TEMP_SUFFIX: &str = ".savepoint.tmp";

/// Create `.<name>.XXXXXX.savepoint.tmp` next to `target`. The returned
/// [`TempPath`] deletes the file when dropped unless persisted.
fn create_temp_sibling(dir: &Path, target: &Path) -> std::io::Result<(File, TempPath)> {
    let mut prefix = OsString::from(".");
    prefix.push(target.file_name().unwrap_or_default());
    prefix.push(".");

    let mut builder = Builder::new();
    builder.prefix(&prefix).suffix(TEMP_SUFFIX);
    // Same mode as File::create; umask still applies.
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        builder.permissions(std::fs::Permissions::from_mode(0o666));
    }

    let (file, path) = builder.tempfile_in(dir)?.into_parts();
    Ok((File::from_std(file), path))
}

/// Fetch one object into its local path, creating parent directories.
pub async fn download_object(
    store: &dyn ObjectStoreClient,
    job: &TransferJob,
    cancel: &CancellationToken,
) -> Result<u64, TransferErrorKind> {
    let mut body = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Err(TransferErrorKind::Cancelled),
        result = store.get(&job.key) => result.map_err(TransferErrorKind::Store)?,
    };

    tracing::debug!(
        "starting download of {} to {}",
        job.key,
        job.local_path.display()
    );

    let dir = job.local_path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir)
        .await
        .map_err(|source| TransferErrorKind::Create {
            path: dir.to_path_buf(),
            source,
        })?;

    let (file, temp_path) =
        create_temp_sibling(dir, &job.local_path).map_err(|source| TransferErrorKind::Create {
            path: dir.to_path_buf(),
            source,
        })?;

    let mut writer = BufWriter::with_capacity(DATA_CHUNK_SIZE, file);
    let written = copy_body(&mut body, &mut writer, cancel).await?;
    writer
        .into_inner()
        .sync_all()
        .await
        .map_err(TransferErrorKind::Io)?;

    temp_path
        .persist(&job.local_path)
        .map_err(|e| TransferErrorKind::Create {
            path: job.local_path.clone(),
            source: e.error,
        })?;

    tracing::debug!(
        key = %job.key,
        size = written,
        path = %job.local_path.display(),
        "downloaded"
    );
    Ok(written)
}

/// Copy chunks until the body ends, checking for cancellation between reads.
async fn copy_body(
    body: &mut ByteStream,
    writer: &mut BufWriter<File>,
    cancel: &CancellationToken,
) -> Result<u64, TransferErrorKind> {
    let mut written = 0u64;
    loop {
        let chunk = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(TransferErrorKind::Cancelled),
            chunk = body.next() => chunk,
        };

        match chunk {
            None => break,
            Some(Err(e)) => return Err(TransferErrorKind::Store(e)),
            Some(Ok(bytes)) => {
                writer
                    .write_all(&bytes)
                    .await
                    .map_err(TransferErrorKind::Io)?;
                written += bytes.len() as u64;
            }
        }
    }
    writer.flush().await.map_err(TransferErrorKind::Io)?;
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::S3Store;
    use object_store::memory::InMemory;
    use object_store::path::Path as ObjectPath;
    use object_store::{ObjectStore, PutPayload};
    use std::sync::Arc;
    use tempfile::TempDir;

    async fn seeded(key: &str, body: &'static [u8]) -> S3Store {
        let memory = Arc::new(InMemory::new());
        memory
            .put(&ObjectPath::parse(key).unwrap(), PutPayload::from_static(body))
            .await
            .unwrap();
        S3Store::new(memory)
    }

    #[tokio::test]
    async fn test_download_creates_parents() {
        let tmp = TempDir::new().unwrap();
        let store = seeded("g/r/deep/nested/c.txt", b"twenty bytes of data").await;
        let target = tmp.path().join("r/deep/nested/c.txt");
        let job = TransferJob::download("g/r/deep/nested/c.txt".into(), target.clone(), "g/r");

        let n = download_object(&store, &job, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(n, 20);
        assert_eq!(std::fs::read(&target).unwrap(), b"twenty bytes of data");
        let names: Vec<_> = std::fs::read_dir(target.parent().unwrap())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(names, vec![std::ffi::OsString::from("c.txt")]);
    }

    #[tokio::test]
    async fn test_download_overwrites_existing() {
        let tmp = TempDir::new().unwrap();
        let store = seeded("g/r/a.sav", b"new").await;
        let target = tmp.path().join("a.sav");
        std::fs::write(&target, b"old contents that are longer").unwrap();
        let job = TransferJob::download("g/r/a.sav".into(), target.clone(), "g/r");

        download_object(&store, &job, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(std::fs::read(&target).unwrap(), b"new");
    }

    #[tokio::test]
    async fn test_download_missing_key_keeps_local_file() {
        let tmp = TempDir::new().unwrap();
        let store = S3Store::new(Arc::new(InMemory::new()));
        let target = tmp.path().join("a.sav");
        std::fs::write(&target, b"keep me").unwrap();
        let job = TransferJob::download("g/r/a.sav".into(), target.clone(), "g/r");

        let err = download_object(&store, &job, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, TransferErrorKind::Store(_)));
        assert_eq!(std::fs::read(&target).unwrap(), b"keep me");
    }

    #[tokio::test]
    async fn test_download_cancelled_before_start() {
        let tmp = TempDir::new().unwrap();
        let store = seeded("g/r/a.sav", b"data").await;
        let target = tmp.path().join("a.sav");
        let job = TransferJob::download("g/r/a.sav".into(), target.clone(), "g/r");

        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = download_object(&store, &job, &cancel).await.unwrap_err();
        assert!(matches!(err, TransferErrorKind::Cancelled));
        assert!(!target.exists());
    }

    #[tokio::test]
    async fn test_temp_names_never_collide_with_targets() {
        let tmp = TempDir::new().unwrap();
        let memory = Arc::new(InMemory::new());
        for (key, body) in [
            ("g/r/a.sav", b"real save".as_slice()),
            ("g/r/a.sav.savepoint.tmp", b"lookalike".as_slice()),
        ] {
            memory
                .put(
                    &ObjectPath::parse(key).unwrap(),
                    PutPayload::from(body.to_vec()),
                )
                .await
                .unwrap();
        }
        let store = S3Store::new(memory);
        let cancel = CancellationToken::new();

        let a = TransferJob::download("g/r/a.sav".into(), tmp.path().join("a.sav"), "g/r");
        let b = TransferJob::download(
            "g/r/a.sav.savepoint.tmp".into(),
            tmp.path().join("a.sav.savepoint.tmp"),
            "g/r",
        );
        let (ra, rb) = tokio::join!(
            download_object(&store, &a, &cancel),
            download_object(&store, &b, &cancel)
        );
        ra.unwrap();
        rb.unwrap();

        assert_eq!(std::fs::read(tmp.path().join("a.sav")).unwrap(), b"real save");
        assert_eq!(
            std::fs::read(tmp.path().join("a.sav.savepoint.tmp")).unwrap(),
            b"lookalike"
        );
        assert_eq!(std::fs::read_dir(tmp.path()).unwrap().count(), 2);
    }
}
