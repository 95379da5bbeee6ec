//! Catalog Synchronization Engine
//!
//! Crawls a WAF-protected, paginated, category-partitioned public data
//! catalog through an authenticated browsing context and idempotently
//! persists what it finds, across several independent workers.
//!
//! # Design Philosophy
//!
//! - Best-effort, eventually consistent: a skipped page is re-attempted by
//!   the next scheduled run, never retried forever in this one
//! - Idempotent upserts keyed by external id, so re-runs converge
//! - One session per worker, passed by value and replaced wholesale
//! - Static partitioning, no coordination between workers
//!
//! # Usage
//!
//! ```rust,ignore
//! use catalog_sync::{
//!     BrowserSessionProvider, CatalogEndpoints, CatalogWorker, HttpBrowser, ListingPager,
//!     MemoryStore, PartitionCoordinator, RecordUpserter, SyncConfig,
//! };
//!
//! let config = SyncConfig::default();
//! let endpoints = CatalogEndpoints::parse("https://data.example.gov")?;
//! let browser = Arc::new(HttpBrowser::new()?);
//!
//! let plan = PartitionCoordinator::new(categories, 4)?.plan(worker_index, None)?;
//! let pager = ListingPager::new(browser.clone(), endpoints.clone(), config.page_size);
//! let provider = BrowserSessionProvider::new(browser, endpoints, &config);
//! let upserter = RecordUpserter::new(Arc::new(MemoryStore::new()));
//!
//! let mut worker = CatalogWorker::bootstrap(worker_index, pager, provider, upserter, &config).await?;
//! let report = worker.run_plan(&plan).await;
//! ```
//!
//! # Modules
//!
//! - [`traits`] - Core trait abstractions (browser, session, pager, store, checkpoint)
//! - [`types`] - Records, sessions, pages, checkpoints, configuration
//! - [`browser`] - Browsing-context implementations (HttpBrowser)
//! - [`stores`] - Record store implementations (MemoryStore, etc.)
//! - [`worker`] - The per-category crawl state machine
//! - [`testing`] - Mock implementations for testing

pub mod browser;
pub mod checkpoint;
pub mod enricher;
pub mod error;
pub mod pager;
pub mod partition;
pub mod refresher;
pub mod session;
pub mod stores;
pub mod testing;
pub mod traits;
pub mod types;
pub mod upsert;
pub mod worker;

// Re-export core types at crate root
pub use error::{
    BrowserError, CheckpointError, EnrichError, FetchError, PartitionError, SessionError,
    StoreError, SyncError,
};
pub use traits::{
    browser::{BrowserRequest, BrowserRequestExecutor, BrowserResponse},
    checkpoint::CheckpointSink,
    detail::DetailSource,
    pager::CategoryPager,
    session::SessionProvider,
    store::RecordStore,
};
pub use types::{
    category::Category,
    checkpoint::{CrawlCheckpoint, Progress},
    config::{CatalogEndpoints, SyncConfig},
    page::PageResult,
    record::{Record, RecordPayload, RecordUpsert, Resource, ResourcePayload, SyncStatus, UpsertAction},
    session::{FingerprintSource, SessionContext, SessionCookie},
};

// Re-export engine components
pub use browser::HttpBrowser;
pub use checkpoint::{Checkpointer, FileCheckpointSink, MemoryCheckpointSink};
pub use enricher::{DetailClient, EnrichOutcome, ResourceEnricher};
pub use pager::ListingPager;
pub use partition::{partition_range, PartitionCoordinator, WorkerPlan};
pub use refresher::{PageOutcome, RefreshStats, SessionRefresher};
pub use session::BrowserSessionProvider;
pub use upsert::RecordUpserter;
pub use worker::{CatalogWorker, CategoryReport, CategoryStatus, WorkerReport};

// Re-export stores
pub use stores::MemoryStore;

#[cfg(feature = "sqlite")]
pub use stores::SqliteStore;

#[cfg(feature = "postgres")]
pub use stores::PostgresStore;

// Re-export testing utilities
pub use testing::{FlakyStore, MockBrowser, MockDetailSource, MockPager, MockSessionProvider};
