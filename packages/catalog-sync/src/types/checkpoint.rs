//! Checkpoint types - advisory crawl progress snapshots.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A worker's crawl progress at one point in time.
///
/// Advisory only: used for observability and crude manual resume. A full
/// re-run from the first category converges to the same store state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrawlCheckpoint {
    pub worker_index: usize,
    pub category_id: String,
    pub page_number: u32,
    pub categories_completed: usize,
    pub records_saved_so_far: u64,
    pub timestamp: DateTime<Utc>,
}

/// Live progress fed to the checkpointer by the worker.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Progress {
    pub categories_completed: usize,
    pub records_saved: u64,
    pub current_category: String,
    pub current_page: u32,
}

impl Progress {
    /// Snapshot this progress for a worker.
    pub fn to_checkpoint(&self, worker_index: usize) -> CrawlCheckpoint {
        CrawlCheckpoint {
            worker_index,
            category_id: self.current_category.clone(),
            page_number: self.current_page,
            categories_completed: self.categories_completed,
            records_saved_so_far: self.records_saved,
            timestamp: Utc::now(),
        }
    }
}
