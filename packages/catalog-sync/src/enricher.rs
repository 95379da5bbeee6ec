//! Best-effort per-record enrichment with resource and schema detail.

use async_trait::async_trait;
use governor::{Quota, RateLimiter};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument};

use crate::error::{EnrichError, FetchError, FetchResult};
use crate::pager::{authenticated_request, parse_conforming};
use crate::traits::browser::BrowserRequestExecutor;
use crate::traits::detail::DetailSource;
use crate::traits::store::RecordStore;
use crate::types::config::CatalogEndpoints;
use crate::types::record::{RecordPayload, UpsertAction};
use crate::types::session::SessionContext;
use crate::upsert::RecordUpserter;

type DefaultRateLimiter = RateLimiter<
    governor::state::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// Detail responses come either bare or wrapped in `result`.
#[derive(Deserialize)]
#[serde(untagged)]
enum DetailEnvelope {
    Wrapped { result: RecordPayload },
    Bare(RecordPayload),
}

impl DetailEnvelope {
    fn into_payload(self) -> RecordPayload {
        match self {
            DetailEnvelope::Wrapped { result } => result,
            DetailEnvelope::Bare(payload) => payload,
        }
    }
}

/// Fetches single-record detail through the authenticated browsing context.
pub struct DetailClient<B: BrowserRequestExecutor> {
    browser: Arc<B>,
    endpoints: CatalogEndpoints,
}

impl<B: BrowserRequestExecutor> DetailClient<B> {
    pub fn new(browser: Arc<B>, endpoints: CatalogEndpoints) -> Self {
        Self { browser, endpoints }
    }
}

#[async_trait]
impl<B: BrowserRequestExecutor> DetailSource for DetailClient<B> {
    #[instrument(skip(self, session))]
    async fn fetch_detail(
        &self,
        session: &SessionContext,
        external_id: &str,
    ) -> FetchResult<RecordPayload> {
        let url = self.endpoints.detail_url(external_id)?;
        let request = authenticated_request(&self.endpoints, session, url);

        let response = self.browser.get(session, request).await?;
        let payload = parse_conforming::<DetailEnvelope>(&response)?.into_payload();

        if payload.external_id != external_id {
            return Err(FetchError::Blocked {
                status: response.status,
                reason: format!("detail answered for {:?}", payload.external_id),
            });
        }
        Ok(payload)
    }
}

/// What an enrichment pass did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnrichOutcome {
    /// Resources were merged into the record
    Enriched { resources: usize, columns: usize },

    /// Nothing to merge
    Skipped { reason: &'static str },
}

/// Merges detail payloads into records through the [`RecordUpserter`].
///
/// Consecutive detail fetches on one worker are spaced by at least the
/// configured minimum delay regardless of category, to stay under the
/// protection layer's per-session throughput heuristics.
pub struct ResourceEnricher<D: DetailSource, R: RecordStore> {
    source: D,
    upserter: RecordUpserter<R>,
    limiter: Option<DefaultRateLimiter>,
}

impl<D: DetailSource, R: RecordStore> ResourceEnricher<D, R> {
    /// Create an enricher. A zero `min_delay` disables spacing.
    pub fn new(source: D, upserter: RecordUpserter<R>, min_delay: Duration) -> Self {
        Self {
            source,
            upserter,
            limiter: Quota::with_period(min_delay).map(RateLimiter::direct),
        }
    }

    /// Fetch detail for a listed record and merge it.
    ///
    /// Descriptive fields missing from the detail fall back to the listing
    /// payload, so enrichment never degrades what the listing pass wrote.
    pub async fn enrich(
        &self,
        session: &SessionContext,
        listed: &RecordPayload,
        category: &str,
    ) -> Result<EnrichOutcome, EnrichError> {
        if let Some(limiter) = &self.limiter {
            limiter.until_ready().await;
        }

        let detail = self.source.fetch_detail(session, &listed.external_id).await?;
        let merged = merge_detail(listed, detail);

        let resources = merged.to_resources().len();
        let columns = merged.infer_columns().len();
        if resources == 0 && columns == 0 {
            debug!(external_id = %listed.external_id, "Detail carried no resources");
            return Ok(EnrichOutcome::Skipped {
                reason: "no resources",
            });
        }

        let action: UpsertAction = self.upserter.upsert(&merged, category).await?;
        debug!(external_id = %listed.external_id, resources, columns, ?action, "Record enriched");

        Ok(EnrichOutcome::Enriched { resources, columns })
    }
}

fn merge_detail(listed: &RecordPayload, detail: RecordPayload) -> RecordPayload {
    RecordPayload {
        external_id: listed.external_id.clone(),
        name: detail.name.or_else(|| listed.name.clone()),
        name_localized: detail.name_localized.or_else(|| listed.name_localized.clone()),
        description: detail.description.or_else(|| listed.description.clone()),
        source_url: detail.source_url.or_else(|| listed.source_url.clone()),
        resources: detail.resources,
        columns: detail.columns,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stores::MemoryStore;
    use crate::testing::{MockBrowser, MockDetailSource};
    use crate::traits::browser::BrowserResponse;
    use crate::types::record::ResourcePayload;
    use crate::types::session::FingerprintSource;
    use std::time::Instant;

    fn session() -> SessionContext {
        SessionContext::new(vec![], "fp", FingerprintSource::Generated)
    }

    fn enricher(
        source: MockDetailSource,
        min_delay: Duration,
    ) -> (ResourceEnricher<MockDetailSource, MemoryStore>, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let upserter = RecordUpserter::new(store.clone());
        (ResourceEnricher::new(source, upserter, min_delay), store)
    }

    fn csv(id: &str) -> ResourcePayload {
        ResourcePayload::new(id, format!("https://files.example/{id}.csv"), "csv")
            .with_schema_fields(&["year", "amount"])
    }

    #[tokio::test]
    async fn test_enrich_merges_resources_and_columns() {
        let source = MockDetailSource::new()
            .with_detail(RecordPayload::new("x1").with_resource(csv("r1")));
        let (enricher, store) = enricher(source, Duration::ZERO);
        let listed = RecordPayload::new("x1").with_name("GDP").with_description("Annual GDP");

        let outcome = enricher.enrich(&session(), &listed, "economy").await.unwrap();

        assert_eq!(outcome, EnrichOutcome::Enriched { resources: 1, columns: 2 });
        let record = store.get_record("x1").await.unwrap().unwrap();
        assert_eq!(record.name, "GDP");
        assert_eq!(record.description, "Annual GDP");
        assert_eq!(record.columns, vec!["year", "amount"]);
    }

    #[tokio::test]
    async fn test_detail_without_resources_is_skipped() {
        let source = MockDetailSource::new().with_detail(RecordPayload::new("x1"));
        let (enricher, store) = enricher(source, Duration::ZERO);

        let outcome = enricher
            .enrich(&session(), &RecordPayload::new("x1"), "economy")
            .await
            .unwrap();

        assert!(matches!(outcome, EnrichOutcome::Skipped { .. }));
        assert!(store.get_record("x1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_fetch_failure_is_error() {
        let (enricher, _) = enricher(MockDetailSource::new(), Duration::ZERO);

        let err = enricher
            .enrich(&session(), &RecordPayload::new("missing"), "economy")
            .await
            .unwrap_err();

        assert!(matches!(err, EnrichError::Fetch(_)));
    }

    #[tokio::test]
    async fn test_consecutive_calls_respect_min_delay() {
        let source = MockDetailSource::new()
            .with_detail(RecordPayload::new("a").with_resource(csv("ra")))
            .with_detail(RecordPayload::new("b").with_resource(csv("rb")))
            .with_detail(RecordPayload::new("c").with_resource(csv("rc")));
        let min_delay = Duration::from_millis(150);
        let (enricher, _) = enricher(source.clone(), min_delay);

        let start = Instant::now();
        for id in ["a", "b", "c"] {
            enricher
                .enrich(&session(), &RecordPayload::new(id), "economy")
                .await
                .unwrap();
        }

        let calls = source.call_instants();
        assert_eq!(calls.len(), 3);
        for pair in calls.windows(2) {
            // governor's clock granularity allows a hair of slack
            assert!(
                pair[1].duration_since(pair[0]) >= min_delay - Duration::from_millis(5),
                "calls too close: {:?}",
                pair[1].duration_since(pair[0])
            );
        }
        assert!(start.elapsed() >= Duration::from_millis(290));
    }

    #[tokio::test]
    async fn test_detail_client_unwraps_result_envelope() {
        let browser = MockBrowser::new().with_response(
            "/api/datasets/x1",
            BrowserResponse::new(
                200,
                r#"{"result": {"id": "x1", "resources": [{"id": "r1", "url": "https://f/r1.csv", "format": "CSV", "columns": ["a"]}]}}"#,
            ),
        );
        let client = DetailClient::new(
            Arc::new(browser),
            CatalogEndpoints::parse("https://data.example.gov").unwrap(),
        );

        let payload = client.fetch_detail(&session(), "x1").await.unwrap();

        assert_eq!(payload.to_resources().len(), 1);
        assert_eq!(payload.infer_columns(), vec!["a"]);
    }

    #[tokio::test]
    async fn test_detail_client_rejects_mismatched_record() {
        let browser = MockBrowser::new().with_response(
            "/api/datasets/x1",
            BrowserResponse::new(200, r#"{"id": "x2"}"#),
        );
        let client = DetailClient::new(
            Arc::new(browser),
            CatalogEndpoints::parse("https://data.example.gov").unwrap(),
        );

        let err = client.fetch_detail(&session(), "x1").await.unwrap_err();

        assert!(err.is_blocked());
    }
}
