//! savepoint - back up and restore game save directories to S3-compatible
//! object storage.
//!
//! Each tracked game's save tree is stored under
//! `slug(game name)/baseName(save dir)/<relative path>`. A [`SyncEngine`]
//! moves a whole tree in one direction per run, with a bounded pool of
//! concurrent transfers and per-file failure isolation.

pub mod cli;
pub mod config;
pub mod error;
pub mod game;
pub mod keys;
pub mod report;
pub mod store;
pub mod sync;
pub mod transfer;
pub mod walker;

pub use config::Config;
pub use error::{AggregateError, Result, StoreError, SyncError, TransferError};
pub use game::{Game, GameIdentity};
pub use keys::KeyMapper;
pub use store::{ObjectStoreClient, S3Store};
pub use sync::{SyncEngine, SyncOptions};
pub use transfer::{Direction, TransferJob, TransferStats};
pub use walker::PathWalker;

pub use tokio_util::sync::CancellationToken;
