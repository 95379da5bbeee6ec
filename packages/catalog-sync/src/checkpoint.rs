//! Advisory progress snapshots.
//!
//! Checkpoints exist for observability and crude manual resume. Nothing
//! about correctness depends on them: a full re-run converges to the same
//! store state because upserts are idempotent.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::error::CheckpointError;
use crate::traits::checkpoint::CheckpointSink;
use crate::types::checkpoint::{CrawlCheckpoint, Progress};
use crate::types::config::SyncConfig;

/// Periodic, fire-and-forget checkpoint writer for one worker.
///
/// A snapshot is due every `every_categories` completed categories or every
/// `interval`, whichever comes first. Writes run on spawned tasks chained
/// one after another, so the sink always ends up holding the latest
/// snapshot and a slow sink never holds up the crawl.
pub struct Checkpointer {
    worker_index: usize,
    sink: Arc<dyn CheckpointSink>,
    every_categories: usize,
    interval: Duration,
    last_saved_at: Instant,
    categories_at_last_save: usize,
    in_flight: Option<JoinHandle<()>>,
}

impl Checkpointer {
    pub fn new(worker_index: usize, sink: Arc<dyn CheckpointSink>, config: &SyncConfig) -> Self {
        Self {
            worker_index,
            sink,
            every_categories: config.checkpoint_every_categories,
            interval: config.checkpoint_interval,
            last_saved_at: Instant::now(),
            categories_at_last_save: 0,
            in_flight: None,
        }
    }

    /// Whether a snapshot of `progress` is due.
    pub fn is_due(&self, progress: &Progress) -> bool {
        let categories_due = self.every_categories > 0
            && progress
                .categories_completed
                .saturating_sub(self.categories_at_last_save)
                >= self.every_categories;

        categories_due || self.last_saved_at.elapsed() >= self.interval
    }

    /// Snapshot `progress` if due. Returns whether a write was started.
    pub fn maybe_persist(&mut self, progress: &Progress) -> bool {
        if !self.is_due(progress) {
            return false;
        }
        self.persist(progress);
        true
    }

    /// Start writing a snapshot of `progress` without waiting for it.
    ///
    /// Write failures are logged and otherwise ignored.
    pub fn persist(&mut self, progress: &Progress) {
        let checkpoint = progress.to_checkpoint(self.worker_index);
        let sink = self.sink.clone();
        let previous = self.in_flight.take();

        self.in_flight = Some(tokio::spawn(async move {
            if let Some(previous) = previous {
                let _ = previous.await;
            }
            match sink.save(&checkpoint).await {
                Ok(()) => debug!(
                    worker = checkpoint.worker_index,
                    category = %checkpoint.category_id,
                    page = checkpoint.page_number,
                    "Checkpoint saved"
                ),
                Err(e) => warn!(worker = checkpoint.worker_index, error = %e, "Checkpoint write failed"),
            }
        }));

        self.last_saved_at = Instant::now();
        self.categories_at_last_save = progress.categories_completed;
    }

    /// Wait for outstanding writes.
    pub async fn flush(&mut self) {
        if let Some(handle) = self.in_flight.take() {
            if let Err(e) = handle.await {
                warn!(error = %e, "Checkpoint task panicked");
            }
        }
    }

    /// The worker's last snapshot. Unreadable snapshots count as absent.
    pub async fn load(&self) -> Option<CrawlCheckpoint> {
        match self.sink.load(self.worker_index).await {
            Ok(checkpoint) => checkpoint,
            Err(e) => {
                warn!(worker = self.worker_index, error = %e, "Ignoring unreadable checkpoint");
                None
            }
        }
    }
}

// ============================================================================
// Sinks
// ============================================================================

/// Stores one `worker-{index}.json` file per worker in a directory.
///
/// Each save writes a temporary file and renames it over the previous
/// snapshot, so a reader never sees a half-written file.
pub struct FileCheckpointSink {
    dir: PathBuf,
}

impl FileCheckpointSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of a worker's snapshot file.
    pub fn path_for(&self, worker_index: usize) -> PathBuf {
        self.dir.join(format!("worker-{worker_index}.json"))
    }
}

#[async_trait]
impl CheckpointSink for FileCheckpointSink {
    async fn save(&self, checkpoint: &CrawlCheckpoint) -> Result<(), CheckpointError> {
        tokio::fs::create_dir_all(&self.dir).await?;

        let json = serde_json::to_vec_pretty(checkpoint)?;
        let tmp = self.dir.join(format!(
            "worker-{}.{}.tmp",
            checkpoint.worker_index,
            uuid::Uuid::new_v4().simple()
        ));

        tokio::fs::write(&tmp, json).await?;
        if let Err(e) = tokio::fs::rename(&tmp, self.path_for(checkpoint.worker_index)).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        Ok(())
    }

    async fn load(&self, worker_index: usize) -> Result<Option<CrawlCheckpoint>, CheckpointError> {
        match tokio::fs::read(self.path_for(worker_index)).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

/// In-memory checkpoint sink for tests and dry runs.
#[derive(Clone, Default)]
pub struct MemoryCheckpointSink {
    checkpoints: Arc<RwLock<HashMap<usize, CrawlCheckpoint>>>,
    saves: Arc<RwLock<usize>>,
}

impl MemoryCheckpointSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total successful saves across workers.
    pub fn save_count(&self) -> usize {
        *self.saves.read().unwrap()
    }

    /// Latest snapshot for a worker.
    pub fn latest(&self, worker_index: usize) -> Option<CrawlCheckpoint> {
        self.checkpoints.read().unwrap().get(&worker_index).cloned()
    }
}

#[async_trait]
impl CheckpointSink for MemoryCheckpointSink {
    async fn save(&self, checkpoint: &CrawlCheckpoint) -> Result<(), CheckpointError> {
        self.checkpoints
            .write()
            .unwrap()
            .insert(checkpoint.worker_index, checkpoint.clone());
        *self.saves.write().unwrap() += 1;
        Ok(())
    }

    async fn load(&self, worker_index: usize) -> Result<Option<CrawlCheckpoint>, CheckpointError> {
        Ok(self.latest(worker_index))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FailingCheckpointSink;

    fn progress(categories_completed: usize, category: &str, page: u32) -> Progress {
        Progress {
            categories_completed,
            records_saved: 42,
            current_category: category.to_string(),
            current_page: page,
        }
    }

    fn config(every: usize, interval: Duration) -> SyncConfig {
        SyncConfig::new().with_checkpoint_cadence(every, interval)
    }

    #[tokio::test]
    async fn test_file_sink_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let sink = FileCheckpointSink::new(dir.path().join("checkpoints"));
        let checkpoint = progress(3, "health", 7).to_checkpoint(2);

        sink.save(&checkpoint).await.unwrap();
        sink.save(&checkpoint).await.unwrap();

        assert_eq!(sink.load(2).await.unwrap(), Some(checkpoint));
        assert!(sink.load(0).await.unwrap().is_none());

        let leftovers: Vec<_> = std::fs::read_dir(sink.dir())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.path().extension().is_some_and(|ext| ext == "tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[tokio::test]
    async fn test_corrupt_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let sink = FileCheckpointSink::new(dir.path());
        std::fs::write(sink.path_for(0), "{not json").unwrap();

        assert!(matches!(sink.load(0).await, Err(CheckpointError::Json(_))));

        let checkpointer = Checkpointer::new(0, Arc::new(sink), &SyncConfig::default());
        assert!(checkpointer.load().await.is_none());
    }

    #[tokio::test]
    async fn test_due_every_k_categories() {
        let sink = MemoryCheckpointSink::new();
        let mut checkpointer =
            Checkpointer::new(1, Arc::new(sink.clone()), &config(2, Duration::from_secs(3600)));

        assert!(!checkpointer.maybe_persist(&progress(1, "a", 0)));
        assert!(checkpointer.maybe_persist(&progress(2, "b", 0)));
        assert!(!checkpointer.maybe_persist(&progress(3, "c", 0)));
        assert!(checkpointer.maybe_persist(&progress(4, "d", 0)));
        checkpointer.flush().await;

        assert_eq!(sink.save_count(), 2);
        assert_eq!(sink.latest(1).unwrap().category_id, "d");
    }

    #[tokio::test(start_paused = true)]
    async fn test_due_after_interval() {
        let sink = MemoryCheckpointSink::new();
        let mut checkpointer =
            Checkpointer::new(0, Arc::new(sink.clone()), &config(0, Duration::from_secs(30)));

        assert!(!checkpointer.maybe_persist(&progress(0, "a", 1)));
        tokio::time::advance(Duration::from_secs(31)).await;
        assert!(checkpointer.maybe_persist(&progress(0, "a", 5)));
        assert!(!checkpointer.maybe_persist(&progress(0, "a", 6)));
        checkpointer.flush().await;

        assert_eq!(sink.latest(0).unwrap().page_number, 5);
    }

    #[tokio::test]
    async fn test_latest_snapshot_wins() {
        let sink = MemoryCheckpointSink::new();
        let mut checkpointer =
            Checkpointer::new(0, Arc::new(sink.clone()), &config(1, Duration::from_secs(3600)));

        for n in 1..=20 {
            checkpointer.persist(&progress(n, &format!("c{n}"), 0));
        }
        checkpointer.flush().await;

        assert_eq!(sink.save_count(), 20);
        assert_eq!(sink.latest(0).unwrap().category_id, "c20");
    }

    #[tokio::test]
    async fn test_write_failure_is_swallowed() {
        let sink = FailingCheckpointSink::new();
        let mut checkpointer =
            Checkpointer::new(0, Arc::new(sink.clone()), &config(1, Duration::from_secs(3600)));

        checkpointer.persist(&progress(1, "a", 0));
        checkpointer.flush().await;

        assert_eq!(sink.attempts(), 1);
    }
}
