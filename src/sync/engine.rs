//! Upload and download orchestration for one game.
//!
//! Each run goes Idle -> Enumerating -> Transferring -> Completed. Enumeration
//! streams jobs into the pool while workers are already draining it, so the
//! first transfers start before the full file list is known.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::error::{AggregateError, Result, SyncError, TransferError, TransferErrorKind};
use crate::game::Game;
use crate::keys::KeyMapper;
use crate::store::ObjectStoreClient;
use crate::transfer::job::JobSender;
use crate::transfer::{
    Direction, PoolRun, ProgressCallback, Rejections, StoreTransfer, TransferJob, TransferStats,
    WorkerPool, DEFAULT_WORKERS, JOB_CHANNEL_SIZE,
};
use crate::walker::PathWalker;

/// Tuning knobs for a run
#[derive(Debug, Clone, Copy)]
pub struct SyncOptions {
    /// Maximum concurrent transfers, in both directions
    pub workers: usize,
    /// Job queue buffering between enumeration and the workers
    pub queue_capacity: usize,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            queue_capacity: JOB_CHANNEL_SIZE,
        }
    }
}

/// Moves one game's save tree to or from the store.
pub struct SyncEngine {
    store: Arc<dyn ObjectStoreClient>,
    pool: WorkerPool,
    progress: Option<ProgressCallback>,
}

impl SyncEngine {
    pub fn new(store: Arc<dyn ObjectStoreClient>) -> Self {
        Self::with_options(store, SyncOptions::default())
    }

    pub fn with_options(store: Arc<dyn ObjectStoreClient>, options: SyncOptions) -> Self {
        Self {
            store,
            pool: WorkerPool::new(options.workers).with_queue_capacity(options.queue_capacity),
            progress: None,
        }
    }

    /// Invoke `progress` after every finished job.
    pub fn with_progress(mut self, progress: ProgressCallback) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Upload every regular file under the game's save root.
    ///
    /// Returns the stats on full success, [`SyncError::Aggregate`] (carrying
    /// the stats) if any file failed, or a fatal error if the tree could not
    /// be walked.
    pub async fn upload(&self, game: &Game, cancel: &CancellationToken) -> Result<TransferStats> {
        if cancel.is_cancelled() {
            return Err(SyncError::Cancelled);
        }

        let mapper = KeyMapper::new(&game.identity, game.save_root())?;
        let walk = PathWalker::new(game.save_root()).walk()?;
        self.upload_paths(game, mapper, walk, cancel).await
    }

    /// Upload whatever `paths` yields. An `Err` item ends the run as a fatal
    /// enumeration error once in-flight work has stopped.
    async fn upload_paths<W>(
        &self,
        game: &Game,
        mapper: KeyMapper,
        paths: W,
        cancel: &CancellationToken,
    ) -> Result<TransferStats>
    where
        W: IntoIterator<Item = Result<PathBuf>> + Send + 'static,
    {
        tracing::info!(
            "starting upload of {} from {} to {}",
            game.identity,
            game.save_root().display(),
            mapper.prefix()
        );

        let run_cancel = cancel.child_token();
        let run = self.start(&run_cancel);

        let jobs = run.sender();
        let rejections = run.rejections();
        let producer_cancel = run_cancel.clone();
        let producer = tokio::task::spawn_blocking(move || {
            enqueue_walk(paths, &mapper, &jobs, &rejections, &producer_cancel)
        });

        let produced = match producer.await {
            Ok(produced) => produced,
            Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
            Err(e) => Err(SyncError::Walk {
                root: game.save_root().to_path_buf(),
                source: std::io::Error::other(e),
            }),
        };
        if produced.is_err() {
            // Fatal enumeration error: stop whatever is still in flight.
            run_cancel.cancel();
        }

        let stats = run.finish().await;
        conclude(Direction::Upload, game, produced, stats, cancel)
    }

    /// Download every object under the game's key prefix into its save root.
    ///
    /// Same result contract as [`SyncEngine::upload`]; a failed listing is
    /// fatal and produces no jobs.
    pub async fn download(
        &self,
        game: &Game,
        cancel: &CancellationToken,
    ) -> Result<TransferStats> {
        if cancel.is_cancelled() {
            return Err(SyncError::Cancelled);
        }

        let mapper = KeyMapper::new(&game.identity, game.save_root())?;

        let keys = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(SyncError::Cancelled),
            listed = self.store.list(mapper.prefix()) => listed.map_err(|source| {
                tracing::error!("listing {} failed: {}", mapper.prefix(), source);
                SyncError::List {
                    prefix: mapper.prefix().to_string(),
                    source,
                }
            })?,
        };

        tracing::info!(
            "starting download of {} ({} objects under {}) to {}",
            game.identity,
            keys.len(),
            mapper.prefix(),
            game.save_root().display()
        );

        let run_cancel = cancel.child_token();
        let run = self.start(&run_cancel);
        let produced = enqueue_keys(keys, &mapper, &run, &run_cancel).await;
        let stats = run.finish().await;
        conclude(Direction::Download, game, produced, stats, cancel)
    }

    fn start(&self, cancel: &CancellationToken) -> PoolRun {
        self.pool.start(
            Arc::new(StoreTransfer::new(Arc::clone(&self.store))),
            cancel.clone(),
            self.progress.clone(),
        )
    }
}

/// Runs on a blocking thread: the walk does synchronous directory reads.
///
/// Every path yields exactly one result. Files without a usable key are
/// reported as failures rather than queued.
fn enqueue_walk<W>(
    paths: W,
    mapper: &KeyMapper,
    jobs: &JobSender,
    rejections: &Rejections,
    cancel: &CancellationToken,
) -> Result<u64>
where
    W: IntoIterator<Item = Result<PathBuf>>,
{
    let mut queued = 0u64;
    let mut seen = HashSet::new();

    for path in paths {
        if cancel.is_cancelled() {
            tracing::debug!("upload cancelled after {} queued jobs", queued);
            break;
        }

        let path = path?;
        let subject = path.display().to_string();
        let accepted = match mapper.to_object_key(&path) {
            Ok(key) if seen.insert(key.clone()) => jobs
                .blocking_send(TransferJob::upload(path, key, mapper.prefix()))
                .is_ok(),
            Ok(key) => rejections.reject(TransferError::new(
                subject,
                TransferErrorKind::Duplicate { target: key },
            )),
            Err(e) => rejections.reject(TransferError::new(
                subject,
                TransferErrorKind::Path(Box::new(e)),
            )),
        };
        if !accepted {
            break;
        }
        queued += 1;
    }

    Ok(queued)
}

async fn enqueue_keys(
    keys: Vec<String>,
    mapper: &KeyMapper,
    run: &PoolRun,
    cancel: &CancellationToken,
) -> Result<u64> {
    let mut queued = 0u64;
    let mut seen = HashSet::new();
    let rejections = run.rejections();

    for key in keys {
        if cancel.is_cancelled() {
            tracing::debug!("download cancelled after {} queued jobs", queued);
            break;
        }

        let accepted = match mapper.to_local_path(&key) {
            Err(e @ SyncError::ForeignKey { .. }) => {
                tracing::warn!("skipping unrelated object: {}", e);
                continue;
            }
            Err(e) => rejections.reject(TransferError::new(
                key,
                TransferErrorKind::Path(Box::new(e)),
            )),
            Ok(local) if seen.insert(local.clone()) => {
                run.submit(TransferJob::download(key, local, mapper.prefix()))
                    .await
            }
            Ok(local) => rejections.reject(TransferError::new(
                key,
                TransferErrorKind::Duplicate {
                    target: local.display().to_string(),
                },
            )),
        };
        if !accepted {
            break;
        }
        queued += 1;
    }

    Ok(queued)
}

fn conclude(
    direction: Direction,
    game: &Game,
    produced: Result<u64>,
    mut stats: TransferStats,
    cancel: &CancellationToken,
) -> Result<TransferStats> {
    stats.cancelled = cancel.is_cancelled();

    let queued = produced?;
    debug_assert_eq!(queued, stats.jobs());

    if stats.cancelled && stats.jobs() == 0 {
        return Err(SyncError::Cancelled);
    }

    if stats.is_success() {
        tracing::info!(
            "{} of {} finished: {} files, {} bytes in {:.2}s",
            direction,
            game.identity,
            stats.success_count,
            stats.total_bytes,
            stats.duration.as_secs_f64()
        );
        Ok(stats)
    } else {
        tracing::warn!(
            "{} of {} finished with {} failures ({} files ok)",
            direction,
            game.identity,
            stats.failures.len(),
            stats.success_count
        );
        Err(AggregateError::new(stats).into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::S3Store;
    use object_store::memory::InMemory;
    use std::fs;
    use tempfile::TempDir;

    fn engine() -> SyncEngine {
        SyncEngine::with_options(
            Arc::new(S3Store::new(Arc::new(InMemory::new()))),
            SyncOptions {
                workers: 4,
                queue_capacity: 2,
            },
        )
    }

    #[tokio::test]
    async fn test_upload_empty_root() {
        let tmp = TempDir::new().unwrap();
        let game = Game::new("Empty", "linux", tmp.path());

        let stats = engine()
            .upload(&game, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(stats.jobs(), 0);
        assert!(!stats.cancelled);
    }

    #[tokio::test]
    async fn test_upload_missing_root_is_fatal() {
        let tmp = TempDir::new().unwrap();
        let game = Game::new("Gone", "linux", tmp.path().join("missing"));

        let err = engine()
            .upload(&game, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::Walk { .. }));
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn test_cancel_before_start_is_fatal() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("a.txt"), "a").unwrap();
        let game = Game::new("Early", "linux", tmp.path());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let engine = engine();
        assert!(matches!(
            engine.upload(&game, &cancel).await,
            Err(SyncError::Cancelled)
        ));
        assert!(matches!(
            engine.download(&game, &cancel).await,
            Err(SyncError::Cancelled)
        ));
    }

    #[tokio::test]
    async fn test_download_of_unknown_game_is_empty_success() {
        let tmp = TempDir::new().unwrap();
        let game = Game::new("Never Uploaded", "linux", tmp.path().join("saves"));

        let stats = engine()
            .download(&game, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(stats.jobs(), 0);
        assert!(!tmp.path().join("saves").exists());
    }

    fn walk_failure(root: &std::path::Path) -> SyncError {
        SyncError::Walk {
            root: root.to_path_buf(),
            source: std::io::Error::from(std::io::ErrorKind::PermissionDenied),
        }
    }

    #[tokio::test]
    async fn test_walk_error_mid_run_is_fatal() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("saves");
        fs::create_dir_all(&root).unwrap();
        let mut paths: Vec<Result<PathBuf>> = Vec::new();
        for i in 0..3 {
            let file = root.join(format!("{}.sav", i));
            fs::write(&file, b"data").unwrap();
            paths.push(Ok(file));
        }
        paths.push(Err(walk_failure(&root)));
        fs::write(root.join("late.sav"), b"never").unwrap();
        paths.push(Ok(root.join("late.sav")));

        let game = Game::new("Broken Walk", "linux", &root);
        let mapper = KeyMapper::new(&game.identity, &root).unwrap();
        let err = engine()
            .upload_paths(&game, mapper, paths, &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, SyncError::Walk { .. }));
        assert!(err.is_fatal());
        assert!(err.partial_stats().is_none());
    }

    #[tokio::test]
    async fn test_unmappable_and_duplicate_paths_are_reported() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("saves");
        fs::create_dir_all(&root).unwrap();
        let file = root.join("slot.sav");
        fs::write(&file, b"12345").unwrap();
        let outside = tmp.path().join("stray.sav");
        fs::write(&outside, b"x").unwrap();

        let game = Game::new("Odd Paths", "linux", &root);
        let mapper = KeyMapper::new(&game.identity, &root).unwrap();
        let paths: Vec<Result<PathBuf>> = vec![Ok(file.clone()), Ok(file), Ok(outside)];

        let err = engine()
            .upload_paths(&game, mapper, paths, &CancellationToken::new())
            .await
            .unwrap_err();

        let stats = err.partial_stats().unwrap();
        assert_eq!(stats.jobs(), 3);
        assert_eq!(stats.success_count, 1);
        assert_eq!(stats.total_bytes, 5);
        let kinds: Vec<_> = stats.failures.iter().map(|f| &f.kind).collect();
        assert!(kinds
            .iter()
            .any(|k| matches!(k, TransferErrorKind::Duplicate { .. })));
        assert!(kinds.iter().any(|k| matches!(k, TransferErrorKind::Path(_))));
    }
}
