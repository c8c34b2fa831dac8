//! Job and channel types for the transfer pipeline.
//!
//! Producer (walk or listing) -> bounded job queue -> workers -> unbounded
//! result channel -> aggregator.

use std::fmt;
use std::path::PathBuf;

use tokio::sync::mpsc;

use crate::error::TransferError;

/// Default number of concurrent workers.
pub const DEFAULT_WORKERS: usize = 100;

/// Default capacity of the job queue. Only bounds buffering: the producer
/// waits for workers to drain it, nothing is dropped.
pub const JOB_CHANNEL_SIZE: usize = 1024;

/// Read/write chunk size for file I/O.
pub const DATA_CHUNK_SIZE: usize = 256 * 1024; // 256KB

/// Which way bytes move.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Local -> store
    Upload,
    /// Store -> local
    Download,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Upload => f.write_str("upload"),
            Direction::Download => f.write_str("download"),
        }
    }
}

/// One file to move between the save root and the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferJob {
    pub direction: Direction,

    /// Absolute local path: source for uploads, target for downloads
    pub local_path: PathBuf,

    /// Path relative to the save root, forward slashes
    pub relative: String,

    /// Object key: target for uploads, source for downloads
    pub key: String,
}

impl TransferJob {
    pub fn upload(local_path: PathBuf, key: String, prefix: &str) -> Self {
        Self {
            direction: Direction::Upload,
            relative: relative_of(&key, prefix),
            local_path,
            key,
        }
    }

    pub fn download(key: String, local_path: PathBuf, prefix: &str) -> Self {
        Self {
            direction: Direction::Download,
            relative: relative_of(&key, prefix),
            local_path,
            key,
        }
    }

    /// What failure reports name: the local file for uploads, the key for
    /// downloads.
    pub fn subject(&self) -> String {
        match self.direction {
            Direction::Upload => self.local_path.display().to_string(),
            Direction::Download => self.key.clone(),
        }
    }
}

fn relative_of(key: &str, prefix: &str) -> String {
    key.strip_prefix(prefix)
        .map(|r| r.trim_start_matches('/'))
        .unwrap_or(key)
        .to_string()
}

/// Outcome of one job: bytes moved, or why it failed.
pub type TransferResult = Result<u64, TransferError>;

pub type JobSender = mpsc::Sender<TransferJob>;
pub type JobReceiver = mpsc::Receiver<TransferJob>;
pub type ResultSender = mpsc::UnboundedSender<TransferResult>;
pub type ResultReceiver = mpsc::UnboundedReceiver<TransferResult>;

/// Bounded queue feeding the workers.
pub fn job_channel(capacity: usize) -> (JobSender, JobReceiver) {
    mpsc::channel(capacity.max(1))
}

/// Unbounded fan-in path so workers never stall on reporting.
pub fn result_channel() -> (ResultSender, ResultReceiver) {
    mpsc::unbounded_channel()
}
