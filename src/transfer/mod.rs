//! Concurrent file transfer between a save root and the object store.
//!
//! ```text
//! +-------------+     +-------------+     +-------------+
//! |  producer   | --> |   workers   | --> | aggregator  |
//! | (walk/list) |     |  (N tasks)  |     |   (stats)   |
//! +-------------+     +-------------+     +-------------+
//! ```

pub mod download;
pub mod job;
pub mod pool;
pub mod stats;
pub mod upload;

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::TransferErrorKind;
use crate::store::ObjectStoreClient;

pub use job::{
    Direction, TransferJob, TransferResult, DATA_CHUNK_SIZE, DEFAULT_WORKERS, JOB_CHANNEL_SIZE,
};
pub use pool::{PoolRun, Rejections, WorkerPool};
pub use stats::{ProgressCallback, ResultAggregator, TransferStats};

/// Executes one job. Implementations must check `cancel` at I/O boundaries.
#[async_trait]
pub trait Transfer: Send + Sync {
    async fn transfer(
        &self,
        job: &TransferJob,
        cancel: &CancellationToken,
    ) -> Result<u64, TransferErrorKind>;
}

/// Moves bytes through a shared store client in whichever direction the job
/// asks for.
#[derive(Debug, Clone)]
pub struct StoreTransfer {
    store: Arc<dyn ObjectStoreClient>,
}

impl StoreTransfer {
    pub fn new(store: Arc<dyn ObjectStoreClient>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Transfer for StoreTransfer {
    async fn transfer(
        &self,
        job: &TransferJob,
        cancel: &CancellationToken,
    ) -> Result<u64, TransferErrorKind> {
        match job.direction {
            Direction::Upload => upload::upload_file(self.store.as_ref(), job, cancel).await,
            Direction::Download => download::download_object(self.store.as_ref(), job, cancel).await,
        }
    }
}
