//! Detect-and-reacquire retry around a [`CategoryPager`].

use std::time::Duration;
use tracing::{info, warn};

use crate::error::{FetchError, SessionResult};
use crate::traits::pager::CategoryPager;
use crate::traits::session::SessionProvider;
use crate::types::page::PageResult;
use crate::types::session::SessionContext;

/// Result of a resilient page fetch.
#[derive(Debug)]
pub enum PageOutcome {
    /// The page, possibly after one session replacement
    Fetched(PageResult),

    /// Both the attempt and its single retry failed; the caller skips
    Skipped { error: FetchError },
}

/// Counters for session churn on one worker.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RefreshStats {
    /// Replacements triggered by a blocked or failed fetch
    pub refreshes: usize,

    /// Replacements triggered by session age
    pub expirations: usize,

    /// Pages given up on after the retry
    pub skipped_pages: usize,
}

/// Owns the worker's one active session and wraps the pager with a bounded
/// retry: on a block or transport failure the session is replaced wholesale
/// and the same page is retried exactly once.
///
/// The bound of one retry keeps an unresponsive category from stalling the
/// whole partition.
pub struct SessionRefresher<P: CategoryPager, S: SessionProvider> {
    pager: P,
    provider: S,
    session: SessionContext,
    max_session_age: Duration,
    stats: RefreshStats,
}

impl<P: CategoryPager, S: SessionProvider> SessionRefresher<P, S> {
    /// Bootstrap the first session with retries.
    ///
    /// Failure here is fatal to the worker.
    pub async fn bootstrap(
        pager: P,
        provider: S,
        attempts: u32,
        max_session_age: Duration,
    ) -> SessionResult<Self> {
        let session = provider.acquire_with_retries(attempts).await?;
        Ok(Self::with_session(pager, provider, session, max_session_age))
    }

    /// Wrap an already-acquired session.
    pub fn with_session(
        pager: P,
        provider: S,
        session: SessionContext,
        max_session_age: Duration,
    ) -> Self {
        Self {
            pager,
            provider,
            session,
            max_session_age,
            stats: RefreshStats::default(),
        }
    }

    /// The active session.
    pub fn session(&self) -> &SessionContext {
        &self.session
    }

    pub fn page_size(&self) -> u32 {
        self.pager.page_size()
    }

    pub fn stats(&self) -> RefreshStats {
        self.stats
    }

    /// Fetch a page, replacing the session and retrying once on failure.
    pub async fn fetch_page_resilient(&mut self, category_id: &str, page: u32) -> PageOutcome {
        if self.session.is_expired(self.max_session_age) {
            info!(category = %category_id, page, "Session expired, replacing");
            match self.provider.acquire().await {
                Ok(session) => {
                    self.session = session;
                    self.stats.expirations += 1;
                }
                Err(e) => warn!(error = %e, "Could not replace expired session, continuing with it"),
            }
        }

        let first_error = match self.pager.fetch_page(&self.session, category_id, page).await {
            Ok(result) => return PageOutcome::Fetched(result),
            Err(e) => e,
        };

        warn!(
            category = %category_id,
            page,
            blocked = first_error.is_blocked(),
            error = %first_error,
            "Page fetch failed, reacquiring session"
        );

        match self.provider.acquire().await {
            Ok(session) => {
                self.session = session;
                self.stats.refreshes += 1;
            }
            Err(e) => {
                warn!(category = %category_id, page, error = %e, "Session reacquisition failed, skipping page");
                self.stats.skipped_pages += 1;
                return PageOutcome::Skipped { error: first_error };
            }
        }

        match self.pager.fetch_page(&self.session, category_id, page).await {
            Ok(result) => PageOutcome::Fetched(result),
            Err(error) => {
                warn!(category = %category_id, page, error = %error, "Retry failed, skipping page");
                self.stats.skipped_pages += 1;
                PageOutcome::Skipped { error }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockPager, MockSessionProvider};
    use crate::types::session::FingerprintSource;

    const HOUR: Duration = Duration::from_secs(3600);

    async fn refresher(pager: MockPager, provider: MockSessionProvider) -> SessionRefresher<MockPager, MockSessionProvider> {
        SessionRefresher::bootstrap(pager, provider, 1, HOUR).await.unwrap()
    }

    #[tokio::test]
    async fn test_success_needs_no_reacquire() {
        let pager = MockPager::new(100).with_category("economy", 250);
        let provider = MockSessionProvider::new();
        let mut refresher = refresher(pager.clone(), provider.clone()).await;

        let outcome = refresher.fetch_page_resilient("economy", 0).await;

        assert!(matches!(outcome, PageOutcome::Fetched(ref p) if p.records.len() == 100));
        assert_eq!(provider.acquire_count(), 1);
        assert_eq!(pager.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_block_reacquires_once_and_retries() {
        let pager = MockPager::new(100)
            .with_category("economy", 250)
            .blocked_once("economy", 1);
        let provider = MockSessionProvider::new();
        let mut refresher = refresher(pager.clone(), provider.clone()).await;
        let first_fingerprint = refresher.session().fingerprint.clone();

        let outcome = refresher.fetch_page_resilient("economy", 1).await;

        assert!(matches!(outcome, PageOutcome::Fetched(_)));
        assert_eq!(provider.acquire_count(), 2);
        assert_ne!(refresher.session().fingerprint, first_fingerprint);
        assert_eq!(refresher.stats().refreshes, 1);
    }

    #[tokio::test]
    async fn test_second_failure_skips_without_more_reacquires() {
        let pager = MockPager::new(100)
            .with_category("economy", 250)
            .blocked_always("economy", 1);
        let provider = MockSessionProvider::new();
        let mut refresher = refresher(pager.clone(), provider.clone()).await;

        let outcome = refresher.fetch_page_resilient("economy", 1).await;

        assert!(matches!(outcome, PageOutcome::Skipped { ref error } if error.is_blocked()));
        // bootstrap + exactly one reacquire
        assert_eq!(provider.acquire_count(), 2);
        assert_eq!(pager.calls().len(), 2);
        assert_eq!(refresher.stats().skipped_pages, 1);
    }

    #[tokio::test]
    async fn test_transport_error_handled_like_block() {
        let pager = MockPager::new(100)
            .with_category("economy", 50)
            .transport_error_once("economy", 0);
        let provider = MockSessionProvider::new();
        let mut refresher = refresher(pager.clone(), provider.clone()).await;

        let outcome = refresher.fetch_page_resilient("economy", 0).await;

        assert!(matches!(outcome, PageOutcome::Fetched(_)));
        assert_eq!(provider.acquire_count(), 2);
    }

    #[tokio::test]
    async fn test_failed_reacquire_skips_page() {
        let pager = MockPager::new(100)
            .with_category("economy", 250)
            .blocked_once("economy", 0);
        let provider = MockSessionProvider::new().failing_after(1);
        let mut refresher = refresher(pager.clone(), provider.clone()).await;

        let outcome = refresher.fetch_page_resilient("economy", 0).await;

        assert!(matches!(outcome, PageOutcome::Skipped { .. }));
        assert_eq!(pager.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_expired_session_replaced_before_fetch() {
        let pager = MockPager::new(100).with_category("economy", 10);
        let provider = MockSessionProvider::new();
        let stale = SessionContext::new(vec![], "old", FingerprintSource::Generated)
            .with_acquired_at(chrono::Utc::now() - chrono::Duration::hours(2));
        let mut refresher = SessionRefresher::with_session(pager, provider.clone(), stale, HOUR);

        let outcome = refresher.fetch_page_resilient("economy", 0).await;

        assert!(matches!(outcome, PageOutcome::Fetched(_)));
        assert_eq!(provider.acquire_count(), 1);
        assert_ne!(refresher.session().fingerprint, "old");
        assert_eq!(refresher.stats().expirations, 1);
        assert_eq!(refresher.stats().refreshes, 0);
    }
}
