//! Game save synchronization.

pub mod engine;

pub use engine::{SyncEngine, SyncOptions};
