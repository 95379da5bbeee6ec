//! Testing utilities including mock implementations.
//!
//! These are useful for testing code built on the sync engine without a
//! live catalog, browser, or database. Every mock is cheaply cloneable and
//! clones share state, so a test can keep a handle for assertions after
//! handing the mock to the component under test.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::time::Instant;
use url::Url;

use crate::error::{
    BrowserError, BrowserResult, CheckpointError, FetchError, FetchResult, SessionError,
    SessionResult, StoreError, StoreResult,
};
use crate::stores::MemoryStore;
use crate::traits::{
    browser::{BrowserRequest, BrowserRequestExecutor, BrowserResponse},
    checkpoint::CheckpointSink,
    detail::DetailSource,
    pager::CategoryPager,
    session::SessionProvider,
    store::RecordStore,
};
use crate::types::{
    checkpoint::CrawlCheckpoint,
    page::PageResult,
    record::{Record, RecordPayload, RecordUpsert, UpsertAction},
    session::{FingerprintSource, SessionContext, SessionCookie},
};

fn mock_io_error(message: &str) -> Box<dyn std::error::Error + Send + Sync> {
    Box::new(std::io::Error::new(
        std::io::ErrorKind::ConnectionRefused,
        message.to_string(),
    ))
}

// ============================================================================
// Browser
// ============================================================================

/// A mock browsing context.
///
/// Serves scripted responses matched by URL substring, in the order they
/// were added. Requests to unscripted URLs fail at the transport level.
#[derive(Clone, Default)]
pub struct MockBrowser {
    cookies: Arc<RwLock<Vec<SessionCookie>>>,
    observed: Arc<RwLock<HashMap<String, String>>>,
    responses: Arc<RwLock<Vec<(String, BrowserResponse)>>>,
    failing_navigations: Arc<RwLock<usize>>,
    navigation_delay: Option<Duration>,

    /// Call tracking
    navigations: Arc<RwLock<Vec<String>>>,
    requests: Arc<RwLock<Vec<BrowserRequest>>>,
}

impl MockBrowser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a cookie the context will hold after navigation.
    pub fn with_cookie(self, cookie: SessionCookie) -> Self {
        self.cookies.write().unwrap().push(cookie);
        self
    }

    /// Add a header the site's scripts appear to send.
    pub fn with_observed_header(self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.observed
            .write()
            .unwrap()
            .insert(name.into().to_lowercase(), value.into());
        self
    }

    /// Serve `response` for any URL containing `url_fragment`.
    pub fn with_response(self, url_fragment: impl Into<String>, response: BrowserResponse) -> Self {
        self.responses
            .write()
            .unwrap()
            .push((url_fragment.into(), response));
        self
    }

    /// Fail the next `count` navigations.
    pub fn failing_navigations(self, count: usize) -> Self {
        *self.failing_navigations.write().unwrap() = count;
        self
    }

    /// Make each navigation take `delay`.
    pub fn with_navigation_delay(mut self, delay: Duration) -> Self {
        self.navigation_delay = Some(delay);
        self
    }

    /// URLs navigated to, in order.
    pub fn navigations(&self) -> Vec<String> {
        self.navigations.read().unwrap().clone()
    }

    /// Requests issued, in order.
    pub fn requests(&self) -> Vec<BrowserRequest> {
        self.requests.read().unwrap().clone()
    }
}

#[async_trait]
impl BrowserRequestExecutor for MockBrowser {
    async fn navigate(&self, url: &Url) -> BrowserResult<()> {
        self.navigations.write().unwrap().push(url.to_string());

        if let Some(delay) = self.navigation_delay {
            tokio::time::sleep(delay).await;
        }

        let mut remaining = self.failing_navigations.write().unwrap();
        if *remaining > 0 {
            *remaining -= 1;
            return Err(BrowserError::Navigation {
                url: url.to_string(),
                reason: "mock navigation failure".to_string(),
            });
        }
        Ok(())
    }

    async fn cookies(&self, _origin: &Url) -> BrowserResult<Vec<SessionCookie>> {
        Ok(self.cookies.read().unwrap().clone())
    }

    async fn observed_request_header(&self, name: &str) -> Option<String> {
        self.observed
            .read()
            .unwrap()
            .get(&name.to_lowercase())
            .cloned()
    }

    async fn get(
        &self,
        _session: &SessionContext,
        request: BrowserRequest,
    ) -> BrowserResult<BrowserResponse> {
        let url = request.url.to_string();
        self.requests.write().unwrap().push(request);

        self.responses
            .read()
            .unwrap()
            .iter()
            .find(|(fragment, _)| url.contains(fragment.as_str()))
            .map(|(_, response)| response.clone())
            .ok_or_else(|| BrowserError::Http(mock_io_error("Mock connection refused")))
    }
}

// ============================================================================
// Session provider
// ============================================================================

/// A mock session provider.
///
/// Every successful acquisition yields a distinct fingerprint
/// (`mock-fp-1`, `mock-fp-2`, ...).
#[derive(Clone, Default)]
pub struct MockSessionProvider {
    fail_first: usize,
    fail_after: Option<usize>,
    acquires: Arc<RwLock<usize>>,
}

impl MockSessionProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the first `count` acquisitions.
    pub fn failing_first(mut self, count: usize) -> Self {
        self.fail_first = count;
        self
    }

    /// Succeed for the first `count` acquisitions, then fail every time.
    pub fn failing_after(mut self, count: usize) -> Self {
        self.fail_after = Some(count);
        self
    }

    /// Number of acquisition attempts, successful or not.
    pub fn acquire_count(&self) -> usize {
        *self.acquires.read().unwrap()
    }
}

#[async_trait]
impl SessionProvider for MockSessionProvider {
    async fn acquire(&self) -> SessionResult<SessionContext> {
        let attempt = {
            let mut acquires = self.acquires.write().unwrap();
            *acquires += 1;
            *acquires
        };

        let failing = attempt <= self.fail_first || self.fail_after.is_some_and(|n| attempt > n);
        if failing {
            return Err(SessionError::NavigationTimeout {
                url: "mock://listing".to_string(),
                secs: 0,
            });
        }

        Ok(SessionContext::new(
            vec![SessionCookie::new("waf", format!("session-{attempt}"))],
            format!("mock-fp-{attempt}"),
            FingerprintSource::Cookie,
        ))
    }
}

// ============================================================================
// Pager
// ============================================================================

#[derive(Debug, Clone, Copy)]
enum FailureKind {
    Blocked,
    Transport,
}

#[derive(Debug, Clone, Copy)]
struct ScriptedFailure {
    kind: FailureKind,

    /// `None` fails forever
    remaining: Option<usize>,
}

/// A mock category pager over scripted record lists.
#[derive(Clone)]
pub struct MockPager {
    page_size: u32,
    records: Arc<RwLock<HashMap<String, Vec<RecordPayload>>>>,
    reported_totals: Arc<RwLock<HashMap<String, u64>>>,
    failures: Arc<RwLock<HashMap<(String, u32), ScriptedFailure>>>,

    /// Call tracking: (category, page, fingerprint)
    calls: Arc<RwLock<Vec<(String, u32, String)>>>,
}

impl MockPager {
    pub fn new(page_size: u32) -> Self {
        Self {
            page_size: page_size.max(1),
            records: Default::default(),
            reported_totals: Default::default(),
            failures: Default::default(),
            calls: Default::default(),
        }
    }

    /// Add a category of `total` records with ids `{category}-{n}`.
    pub fn with_category(self, category: impl Into<String>, total: usize) -> Self {
        let category = category.into();
        let records = (0..total)
            .map(|n| RecordPayload::new(format!("{category}-{n}")).with_name(format!("Record {n}")))
            .collect();
        self.records.write().unwrap().insert(category, records);
        self
    }

    /// Add a category with explicit records, duplicates included.
    pub fn with_records(self, category: impl Into<String>, records: Vec<RecordPayload>) -> Self {
        self.records.write().unwrap().insert(category.into(), records);
        self
    }

    /// Report `total` as `totalElements` regardless of the scripted records.
    pub fn with_reported_total(self, category: impl Into<String>, total: u64) -> Self {
        self.reported_totals
            .write()
            .unwrap()
            .insert(category.into(), total);
        self
    }

    /// Answer one fetch of this page with a block page.
    pub fn blocked_once(self, category: impl Into<String>, page: u32) -> Self {
        self.script_failure(category, page, FailureKind::Blocked, Some(1))
    }

    /// Answer every fetch of this page with a block page.
    pub fn blocked_always(self, category: impl Into<String>, page: u32) -> Self {
        self.script_failure(category, page, FailureKind::Blocked, None)
    }

    /// Fail one fetch of this page at the transport level.
    pub fn transport_error_once(self, category: impl Into<String>, page: u32) -> Self {
        self.script_failure(category, page, FailureKind::Transport, Some(1))
    }

    fn script_failure(
        self,
        category: impl Into<String>,
        page: u32,
        kind: FailureKind,
        remaining: Option<usize>,
    ) -> Self {
        self.failures
            .write()
            .unwrap()
            .insert((category.into(), page), ScriptedFailure { kind, remaining });
        self
    }

    /// Pages requested, in order.
    pub fn calls(&self) -> Vec<(String, u32)> {
        self.calls
            .read()
            .unwrap()
            .iter()
            .map(|(category, page, _)| (category.clone(), *page))
            .collect()
    }

    /// Fingerprints of the sessions each request was made with.
    pub fn fingerprints(&self) -> Vec<String> {
        self.calls
            .read()
            .unwrap()
            .iter()
            .map(|(_, _, fingerprint)| fingerprint.clone())
            .collect()
    }

    fn take_failure(&self, category: &str, page: u32) -> Option<FailureKind> {
        let mut failures = self.failures.write().unwrap();
        let failure = failures.get_mut(&(category.to_string(), page))?;
        match &mut failure.remaining {
            None => Some(failure.kind),
            Some(0) => None,
            Some(n) => {
                *n -= 1;
                Some(failure.kind)
            }
        }
    }
}

#[async_trait]
impl CategoryPager for MockPager {
    async fn fetch_page(
        &self,
        session: &SessionContext,
        category_id: &str,
        page: u32,
    ) -> FetchResult<PageResult> {
        self.calls.write().unwrap().push((
            category_id.to_string(),
            page,
            session.fingerprint.clone(),
        ));

        match self.take_failure(category_id, page) {
            Some(FailureKind::Blocked) => {
                return Err(FetchError::Blocked {
                    status: 403,
                    reason: "mock block page".to_string(),
                })
            }
            Some(FailureKind::Transport) => {
                return Err(FetchError::Transport(BrowserError::Http(mock_io_error(
                    "Mock connection reset",
                ))))
            }
            None => {}
        }

        let records = self.records.read().unwrap();
        let all = records.get(category_id).map(Vec::as_slice).unwrap_or(&[]);
        let total = self
            .reported_totals
            .read()
            .unwrap()
            .get(category_id)
            .copied()
            .unwrap_or(all.len() as u64);

        let start = (page as usize).saturating_mul(self.page_size as usize);
        let content = all
            .iter()
            .skip(start)
            .take(self.page_size as usize)
            .cloned()
            .collect();

        Ok(PageResult::new(total, content))
    }

    fn page_size(&self) -> u32 {
        self.page_size
    }
}

// ============================================================================
// Detail source
// ============================================================================

/// A mock detail endpoint.
///
/// Unknown ids fail at the transport level.
#[derive(Clone, Default)]
pub struct MockDetailSource {
    details: Arc<RwLock<HashMap<String, RecordPayload>>>,
    blocked: Arc<RwLock<HashSet<String>>>,

    /// Call tracking
    calls: Arc<RwLock<Vec<(String, Instant)>>>,
}

impl MockDetailSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `detail` for its external id.
    pub fn with_detail(self, detail: RecordPayload) -> Self {
        self.details
            .write()
            .unwrap()
            .insert(detail.external_id.clone(), detail);
        self
    }

    /// Answer detail for this id with a block page.
    pub fn blocked(self, external_id: impl Into<String>) -> Self {
        self.blocked.write().unwrap().insert(external_id.into());
        self
    }

    /// Ids requested, in order.
    pub fn calls(&self) -> Vec<String> {
        self.calls
            .read()
            .unwrap()
            .iter()
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// When each request was made.
    pub fn call_instants(&self) -> Vec<Instant> {
        self.calls.read().unwrap().iter().map(|(_, at)| *at).collect()
    }
}

#[async_trait]
impl DetailSource for MockDetailSource {
    async fn fetch_detail(
        &self,
        _session: &SessionContext,
        external_id: &str,
    ) -> FetchResult<RecordPayload> {
        self.calls
            .write()
            .unwrap()
            .push((external_id.to_string(), Instant::now()));

        if self.blocked.read().unwrap().contains(external_id) {
            return Err(FetchError::Blocked {
                status: 403,
                reason: "mock block page".to_string(),
            });
        }

        self.details
            .read()
            .unwrap()
            .get(external_id)
            .cloned()
            .ok_or_else(|| FetchError::Transport(BrowserError::Http(mock_io_error("Mock not found"))))
    }
}

// ============================================================================
// Stores
// ============================================================================

/// A [`MemoryStore`] whose writes can be made to fail.
///
/// `mark_failed` always reaches the inner store, so the failed status of a
/// record that already exists is observable.
#[derive(Default)]
pub struct FlakyStore {
    inner: MemoryStore,
    unavailable: RwLock<bool>,
    failing_ids: RwLock<HashSet<String>>,
    failing_once: RwLock<HashSet<String>>,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail writes for these ids only.
    pub fn failing_ids<I, S>(self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.failing_ids
            .write()
            .unwrap()
            .extend(ids.into_iter().map(Into::into));
        self
    }

    /// Fail the next write for each of these ids, then succeed.
    pub fn failing_once<I, S>(self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.failing_once
            .write()
            .unwrap()
            .extend(ids.into_iter().map(Into::into));
        self
    }

    /// Toggle failure of every write.
    pub fn set_unavailable(&self, unavailable: bool) {
        *self.unavailable.write().unwrap() = unavailable;
    }

    pub fn inner(&self) -> &MemoryStore {
        &self.inner
    }
}

#[async_trait]
impl RecordStore for FlakyStore {
    async fn upsert_record(&self, record: &RecordUpsert) -> StoreResult<UpsertAction> {
        let failing = *self.unavailable.read().unwrap()
            || self.failing_ids.read().unwrap().contains(&record.external_id)
            || self.failing_once.write().unwrap().remove(&record.external_id);
        if failing {
            return Err(StoreError::Unavailable(mock_io_error("Mock store offline")));
        }
        self.inner.upsert_record(record).await
    }

    async fn get_record(&self, external_id: &str) -> StoreResult<Option<Record>> {
        self.inner.get_record(external_id).await
    }

    async fn mark_failed(&self, external_id: &str) -> StoreResult<()> {
        self.inner.mark_failed(external_id).await
    }

    async fn count_records(&self, category: Option<&str>) -> StoreResult<usize> {
        self.inner.count_records(category).await
    }
}

/// A checkpoint sink whose writes always fail.
#[derive(Clone, Default)]
pub struct FailingCheckpointSink {
    attempts: Arc<RwLock<usize>>,
}

impl FailingCheckpointSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of save attempts.
    pub fn attempts(&self) -> usize {
        *self.attempts.read().unwrap()
    }
}

#[async_trait]
impl CheckpointSink for FailingCheckpointSink {
    async fn save(&self, _checkpoint: &CrawlCheckpoint) -> Result<(), CheckpointError> {
        *self.attempts.write().unwrap() += 1;
        Err(CheckpointError::Io(std::io::Error::new(
            std::io::ErrorKind::PermissionDenied,
            "mock read-only sink",
        )))
    }

    async fn load(&self, _worker_index: usize) -> Result<Option<CrawlCheckpoint>, CheckpointError> {
        Ok(None)
    }
}
