//! Error types for savepoint.
//!
//! Two layers: [`SyncError`] aborts or summarizes a whole run, while
//! [`TransferError`] describes one file that could not be moved. Per-job
//! errors never escape a worker on their own; they are collected into an
//! [`AggregateError`] once every job has reported.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use crate::transfer::TransferStats;

pub type Result<T> = std::result::Result<T, SyncError>;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("path {path} is not under {root}")]
    Path { path: PathBuf, root: PathBuf },

    #[error("{path} is not valid UTF-8 and cannot name an object")]
    NonUtf8Path { path: PathBuf },

    #[error("object key {key} does not start with prefix {prefix}")]
    ForeignKey { key: String, prefix: String },

    #[error("invalid object key {key}: {reason}")]
    InvalidKey { key: String, reason: String },

    #[error("failed to walk {root}: {source}")]
    Walk {
        root: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to list objects under {prefix}: {source}")]
    List {
        prefix: String,
        #[source]
        source: StoreError,
    },

    #[error("run cancelled before any transfer started")]
    Cancelled,

    #[error("configuration error: {0}")]
    Config(String),

    #[error("failed to build object store client: {0}")]
    Store(#[source] StoreError),

    #[error(transparent)]
    Aggregate(#[from] AggregateError),
}

impl SyncError {
    /// True for errors that ended the run before it could finish, as opposed
    /// to a completed run that had per-file failures.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, SyncError::Aggregate(_))
    }

    /// Stats of a run that completed with partial failure.
    pub fn partial_stats(&self) -> Option<&TransferStats> {
        match self {
            SyncError::Aggregate(agg) => Some(agg.stats()),
            _ => None,
        }
    }
}

/// Errors surfaced by an [`ObjectStoreClient`](crate::store::ObjectStoreClient).
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("object {key} not found")]
    NotFound { key: String },

    #[error("size mismatch for {key}: declared {declared} bytes, sent {actual}")]
    SizeMismatch {
        key: String,
        declared: u64,
        actual: u64,
    },

    #[error("invalid object key {key}: {reason}")]
    InvalidKey { key: String, reason: String },

    #[error(transparent)]
    Backend(#[from] object_store::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("cancelled")]
    Cancelled,
}

/// What went wrong with a single transfer job.
#[derive(Debug, Error)]
pub enum TransferErrorKind {
    #[error("opening file: {0}")]
    Open(#[source] std::io::Error),

    #[error("getting file info: {0}")]
    Stat(#[source] std::io::Error),

    #[error("creating {path}: {source}")]
    Create {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("object store: {0}")]
    Store(#[source] StoreError),

    #[error("writing file: {0}")]
    Io(#[source] std::io::Error),

    #[error("mapping path: {0}")]
    Path(#[source] Box<SyncError>),

    #[error("{target} is already claimed by another file in this run")]
    Duplicate { target: String },

    #[error("cancelled")]
    Cancelled,
}

/// One failed job: what was being moved and why it failed.
#[derive(Debug, Error)]
#[error("{subject}: {kind}")]
pub struct TransferError {
    /// Local path (upload) or object key (download).
    pub subject: String,
    #[source]
    pub kind: TransferErrorKind,
}

impl TransferError {
    pub fn new(subject: impl Into<String>, kind: TransferErrorKind) -> Self {
        Self {
            subject: subject.into(),
            kind,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self.kind, TransferErrorKind::Cancelled)
    }
}

/// A completed run with one or more failed jobs.
#[derive(Debug)]
pub struct AggregateError {
    stats: TransferStats,
}

impl AggregateError {
    pub(crate) fn new(stats: TransferStats) -> Self {
        Self { stats }
    }

    pub fn failures(&self) -> &[TransferError] {
        &self.stats.failures
    }

    pub fn stats(&self) -> &TransferStats {
        &self.stats
    }
}

impl fmt::Display for AggregateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} of {} transfers failed",
            self.stats.failures.len(),
            self.stats.jobs()
        )?;
        for failure in &self.stats.failures {
            write!(f, "\n  {}", failure)?;
        }
        Ok(())
    }
}

impl std::error::Error for AggregateError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.stats
            .failures
            .first()
            .map(|e| e as &(dyn std::error::Error + 'static))
    }
}
