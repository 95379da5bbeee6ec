//! Checkpoint sink trait.

use async_trait::async_trait;

use crate::error::CheckpointError;
use crate::types::checkpoint::CrawlCheckpoint;

/// Durable home for one small progress blob per worker.
///
/// Kept apart from the record store.
#[async_trait]
pub trait CheckpointSink: Send + Sync {
    /// Replace the worker's snapshot.
    async fn save(&self, checkpoint: &CrawlCheckpoint) -> Result<(), CheckpointError>;

    /// Load the worker's latest snapshot, if any.
    async fn load(&self, worker_index: usize) -> Result<Option<CrawlCheckpoint>, CheckpointError>;
}
