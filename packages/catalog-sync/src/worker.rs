//! The per-worker crawl loop.
//!
//! One worker walks its categories in static order. Within a category,
//! pages are fetched strictly in sequence: page 0 learns the total count,
//! then pages 1..N follow through the [`SessionRefresher`]. Each page's
//! records are upserted (and optionally enriched) before the next page is
//! requested.
//!
//! ```text
//! PENDING → FETCHING_PAGE(n) → PAGE_OK → persist → FETCHING_PAGE(n+1)
//!                            → BLOCKED → REFRESHING_SESSION → retry once
//!                            → RETRY_FAILED → CATEGORY_SKIPPED
//! terminal: CATEGORY_DONE | CATEGORY_SKIPPED | CANCELLED
//! ```

use std::collections::HashSet;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use crate::checkpoint::Checkpointer;
use crate::enricher::{EnrichOutcome, ResourceEnricher};
use crate::error::Result;
use crate::partition::WorkerPlan;
use crate::refresher::{PageOutcome, RefreshStats, SessionRefresher};
use crate::traits::{
    detail::DetailSource, pager::CategoryPager, session::SessionProvider, store::RecordStore,
};
use crate::types::{
    category::Category, checkpoint::Progress, config::SyncConfig, page::PageResult,
};
use crate::upsert::RecordUpserter;

/// Terminal state of one category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CategoryStatus {
    /// Every page was fetched, or the listing ended early
    Done,

    /// A page failed after its retry; later pages were not requested
    Skipped,

    /// The worker was cancelled before the category finished
    Cancelled,
}

impl CategoryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CategoryStatus::Done => "done",
            CategoryStatus::Skipped => "skipped",
            CategoryStatus::Cancelled => "cancelled",
        }
    }
}

/// Outcome counters for one category.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryReport {
    pub category_id: String,
    pub status: CategoryStatus,

    /// `totalElements` reported by page 0 (0 if page 0 failed)
    pub total_elements: u64,
    pub pages_fetched: u32,
    pub records_saved: u64,
    pub records_failed: u64,
    pub records_enriched: u64,
    pub enrich_failures: u64,

    /// Records seen again on a later page of the same category
    pub duplicates: u64,
}

impl CategoryReport {
    fn new(category_id: &str) -> Self {
        Self {
            category_id: category_id.to_string(),
            status: CategoryStatus::Done,
            total_elements: 0,
            pages_fetched: 0,
            records_saved: 0,
            records_failed: 0,
            records_enriched: 0,
            enrich_failures: 0,
            duplicates: 0,
        }
    }
}

/// Outcome of a whole worker run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerReport {
    pub worker_index: usize,
    pub categories: Vec<CategoryReport>,
    pub sessions: RefreshStats,
    pub cancelled: bool,
}

impl WorkerReport {
    pub fn records_saved(&self) -> u64 {
        self.categories.iter().map(|c| c.records_saved).sum()
    }

    pub fn records_failed(&self) -> u64 {
        self.categories.iter().map(|c| c.records_failed).sum()
    }

    /// Ids of categories that ended skipped.
    pub fn skipped_categories(&self) -> Vec<&str> {
        self.categories
            .iter()
            .filter(|c| c.status == CategoryStatus::Skipped)
            .map(|c| c.category_id.as_str())
            .collect()
    }
}

/// One worker: a session, a store connection, and a disjoint category slice.
pub struct CatalogWorker<P, S, D, R>
where
    P: CategoryPager,
    S: SessionProvider,
    D: DetailSource,
    R: RecordStore,
{
    worker_index: usize,
    refresher: SessionRefresher<P, S>,
    upserter: RecordUpserter<R>,
    enricher: Option<ResourceEnricher<D, R>>,
    checkpointer: Option<Checkpointer>,
    cancel: CancellationToken,
    progress: Progress,
}

impl<P, S, D, R> CatalogWorker<P, S, D, R>
where
    P: CategoryPager,
    S: SessionProvider,
    D: DetailSource,
    R: RecordStore,
{
    /// Bootstrap the worker's first session.
    ///
    /// This is the only fatal step: exhausting the session attempts
    /// terminates the worker with [`SyncError::Session`](crate::error::SyncError::Session).
    pub async fn bootstrap(
        worker_index: usize,
        pager: P,
        provider: S,
        upserter: RecordUpserter<R>,
        config: &SyncConfig,
    ) -> Result<Self> {
        let refresher = SessionRefresher::bootstrap(
            pager,
            provider,
            config.session_attempts,
            config.session_max_age,
        )
        .await?;
        Ok(Self::new(worker_index, refresher, upserter))
    }

    pub fn new(
        worker_index: usize,
        refresher: SessionRefresher<P, S>,
        upserter: RecordUpserter<R>,
    ) -> Self {
        Self {
            worker_index,
            refresher,
            upserter,
            enricher: None,
            checkpointer: None,
            cancel: CancellationToken::new(),
            progress: Progress::default(),
        }
    }

    /// Enrich every saved record with detail.
    pub fn with_enricher(mut self, enricher: ResourceEnricher<D, R>) -> Self {
        self.enricher = Some(enricher);
        self
    }

    /// Snapshot progress as the worker goes.
    pub fn with_checkpointer(mut self, checkpointer: Checkpointer) -> Self {
        self.checkpointer = Some(checkpointer);
        self
    }

    /// Stop between pages once `cancel` fires.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Run a partition plan.
    pub async fn run_plan(&mut self, plan: &WorkerPlan) -> WorkerReport {
        self.run(&plan.categories).await
    }

    /// Crawl `categories` in order. Never fails: every error below the
    /// worker level ends as a skipped page, record, or category.
    pub async fn run(&mut self, categories: &[Category]) -> WorkerReport {
        let mut reports = Vec::with_capacity(categories.len());
        let mut cancelled = false;

        for category in categories {
            if self.cancel.is_cancelled() {
                cancelled = true;
                break;
            }

            let report = self.sync_category(category).await;
            info!(
                worker = self.worker_index,
                category = %category.id,
                status = report.status.as_str(),
                saved = report.records_saved,
                total = report.total_elements,
                "Category {}: {}/{} saved",
                category.display_name,
                report.records_saved,
                report.total_elements
            );

            let was_cancelled = report.status == CategoryStatus::Cancelled;
            reports.push(report);
            if was_cancelled {
                cancelled = true;
                break;
            }

            self.progress.categories_completed += 1;
            if let Some(checkpointer) = &mut self.checkpointer {
                checkpointer.maybe_persist(&self.progress);
            }
        }

        if let Some(checkpointer) = &mut self.checkpointer {
            checkpointer.persist(&self.progress);
            checkpointer.flush().await;
        }

        let report = WorkerReport {
            worker_index: self.worker_index,
            categories: reports,
            sessions: self.refresher.stats(),
            cancelled,
        };
        info!(
            worker = self.worker_index,
            categories = report.categories.len(),
            saved = report.records_saved(),
            failed = report.records_failed(),
            skipped = report.skipped_categories().len(),
            refreshes = report.sessions.refreshes,
            cancelled,
            "Worker finished"
        );
        report
    }

    /// Walk one category page by page.
    #[instrument(skip(self, category), fields(worker = self.worker_index, category = %category.id))]
    pub async fn sync_category(&mut self, category: &Category) -> CategoryReport {
        let mut report = CategoryReport::new(&category.id);
        let mut seen = HashSet::new();

        self.progress.current_category = category.id.clone();
        self.progress.current_page = 0;

        let first = match self.refresher.fetch_page_resilient(&category.id, 0).await {
            PageOutcome::Fetched(page) => page,
            PageOutcome::Skipped { error } => {
                warn!(error = %error, "First page unavailable, skipping category");
                report.status = CategoryStatus::Skipped;
                return report;
            }
        };

        report.total_elements = first.total_elements;
        if let Some(expected) = category.expected_count {
            if expected != first.total_elements {
                warn!(
                    expected,
                    reported = first.total_elements,
                    "Category size differs from expected count"
                );
            }
        }

        let total_pages = first.total_pages(self.refresher.page_size());
        let first_was_empty = first.records.is_empty();
        self.process_page(category, first, &mut seen, &mut report).await;
        if first_was_empty {
            return report;
        }

        for page in 1..total_pages {
            if self.cancel.is_cancelled() {
                info!(page, "Cancelled between pages");
                report.status = CategoryStatus::Cancelled;
                return report;
            }

            self.progress.current_page = page;
            if let Some(checkpointer) = &mut self.checkpointer {
                checkpointer.maybe_persist(&self.progress);
            }

            match self.refresher.fetch_page_resilient(&category.id, page).await {
                PageOutcome::Fetched(result) if result.records.is_empty() => {
                    info!(page, total_pages, "Listing ended early");
                    report.pages_fetched += 1;
                    break;
                }
                PageOutcome::Fetched(result) => {
                    self.process_page(category, result, &mut seen, &mut report).await;
                }
                PageOutcome::Skipped { error } => {
                    warn!(page, error = %error, "Page failed after retry, skipping rest of category");
                    report.status = CategoryStatus::Skipped;
                    return report;
                }
            }
        }

        report
    }

    async fn process_page(
        &mut self,
        category: &Category,
        page: PageResult,
        seen: &mut HashSet<String>,
        report: &mut CategoryReport,
    ) {
        report.pages_fetched += 1;

        for payload in page.records {
            let external_id = payload.external_id.trim();
            if seen.contains(external_id) {
                report.duplicates += 1;
                continue;
            }

            if self.upserter.upsert(&payload, &category.id).await.is_err() {
                report.records_failed += 1;
                continue;
            }
            // saved ids only; a failed record gets another try if it reappears
            seen.insert(external_id.to_string());
            report.records_saved += 1;
            self.progress.records_saved += 1;

            let Some(enricher) = &self.enricher else {
                continue;
            };
            match enricher
                .enrich(self.refresher.session(), &payload, &category.id)
                .await
            {
                Ok(EnrichOutcome::Enriched { .. }) => report.records_enriched += 1,
                Ok(EnrichOutcome::Skipped { .. }) => {}
                Err(e) => {
                    warn!(external_id = %payload.external_id, error = %e, "Enrichment failed, keeping listing data");
                    report.enrich_failures += 1;
                }
            }
        }
    }
}
