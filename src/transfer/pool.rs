//! Bounded worker pool shared by uploads and downloads.
//!
//! N workers pull from one bounded job queue and push outcomes into an
//! unbounded result channel drained by a single [`ResultAggregator`]. A run is
//! done once every worker has exited, which happens after the last job sender
//! is dropped and the queue is empty.

use std::sync::Arc;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::job::{
    job_channel, result_channel, JobReceiver, JobSender, ResultSender, TransferJob,
    DEFAULT_WORKERS, JOB_CHANNEL_SIZE,
};
use super::stats::{ProgressCallback, ResultAggregator, TransferStats};
use super::Transfer;
use crate::error::{TransferError, TransferErrorKind};

/// Pool configuration
#[derive(Debug, Clone, Copy)]
pub struct WorkerPool {
    workers: usize,
    queue_capacity: usize,
}

impl Default for WorkerPool {
    fn default() -> Self {
        Self::new(DEFAULT_WORKERS)
    }
}

impl WorkerPool {
    pub fn new(workers: usize) -> Self {
        Self {
            workers: workers.max(1),
            queue_capacity: JOB_CHANNEL_SIZE,
        }
    }

    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity.max(1);
        self
    }

    /// Spawn the workers and the aggregator. The run clock starts here.
    pub fn start(
        &self,
        transfer: Arc<dyn Transfer>,
        cancel: CancellationToken,
        progress: Option<ProgressCallback>,
    ) -> PoolRun {
        let (job_tx, job_rx) = job_channel(self.queue_capacity);
        let (result_tx, result_rx) = result_channel();

        let aggregator = tokio::spawn(ResultAggregator::new(progress).run(result_rx));

        let jobs = Arc::new(Mutex::new(job_rx));
        let workers = (0..self.workers)
            .map(|id| {
                tokio::spawn(worker(
                    id,
                    Arc::clone(&jobs),
                    Arc::clone(&transfer),
                    result_tx.clone(),
                    cancel.clone(),
                ))
            })
            .collect();

        PoolRun {
            jobs: job_tx,
            results: result_tx,
            workers,
            aggregator,
        }
    }
}

/// Handle to a running pool.
pub struct PoolRun {
    jobs: JobSender,
    results: ResultSender,
    workers: Vec<JoinHandle<()>>,
    aggregator: JoinHandle<TransferStats>,
}

impl PoolRun {
    /// Extra sender for a producer running on another task or thread. The
    /// run cannot finish until every sender is dropped.
    pub fn sender(&self) -> JobSender {
        self.jobs.clone()
    }

    /// Queue a job, waiting for room if the queue is full.
    pub async fn submit(&self, job: TransferJob) -> bool {
        self.jobs.send(job).await.is_ok()
    }

    /// Extra handle for reporting files that never became a job because
    /// they could not be mapped. They count as failed jobs.
    pub fn rejections(&self) -> Rejections {
        Rejections(self.results.clone())
    }

    /// Close the queue, wait for every worker to drain it, and return the
    /// final stats.
    pub async fn finish(self) -> TransferStats {
        drop(self.jobs);
        drop(self.results);

        for handle in self.workers {
            if let Err(e) = handle.await {
                if e.is_panic() {
                    std::panic::resume_unwind(e.into_panic());
                }
            }
        }

        match self.aggregator.await {
            Ok(stats) => stats,
            Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
            Err(e) => {
                tracing::error!("result aggregator did not complete: {}", e);
                TransferStats::new()
            }
        }
    }
}

/// Reports a failure straight to the aggregator, bypassing the workers.
#[derive(Debug, Clone)]
pub struct Rejections(ResultSender);

impl Rejections {
    /// Returns false once the run can no longer record results.
    pub fn reject(&self, error: TransferError) -> bool {
        tracing::warn!("{}", error);
        self.0.send(Err(error)).is_ok()
    }
}

async fn worker(
    id: usize,
    jobs: Arc<Mutex<JobReceiver>>,
    transfer: Arc<dyn Transfer>,
    results: ResultSender,
    cancel: CancellationToken,
) {
    loop {
        let job = {
            let mut rx = jobs.lock().await;
            rx.recv().await
        };
        let Some(job) = job else {
            break;
        };

        // Queued jobs are still reported after cancellation so every
        // submitted job yields exactly one result.
        let outcome = if cancel.is_cancelled() {
            Err(TransferErrorKind::Cancelled)
        } else {
            transfer.transfer(&job, &cancel).await
        };

        let result = outcome.map_err(|kind| {
            let err = TransferError::new(job.subject(), kind);
            if !err.is_cancelled() {
                tracing::warn!("{} failed: {}", job.direction, err);
            }
            err
        });

        if results.send(result).is_err() {
            tracing::error!("worker {}: result channel closed", id);
            break;
        }
    }
}
