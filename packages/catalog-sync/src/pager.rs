//! Listing page fetch through the authenticated browsing context.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, instrument};

use crate::error::{FetchError, FetchResult};
use crate::traits::browser::{BrowserRequest, BrowserRequestExecutor, BrowserResponse};
use crate::traits::pager::CategoryPager;
use crate::types::config::CatalogEndpoints;
use crate::types::page::{ListingEnvelope, PageResult};
use crate::types::session::SessionContext;

/// Characters of a rejected body kept in the `Blocked` reason.
const BODY_SNIPPET_LEN: usize = 120;

/// Stateless listing fetcher.
///
/// Requests go out from inside the still-open browsing context so they are
/// indistinguishable from the site's own traffic.
pub struct ListingPager<B: BrowserRequestExecutor> {
    browser: Arc<B>,
    endpoints: CatalogEndpoints,
    page_size: u32,
}

impl<B: BrowserRequestExecutor> ListingPager<B> {
    /// Create a pager with a run-wide page size.
    pub fn new(browser: Arc<B>, endpoints: CatalogEndpoints, page_size: u32) -> Self {
        Self {
            browser,
            endpoints,
            page_size: page_size.max(1),
        }
    }
}

/// Attach the session's fingerprint header to a request.
pub(crate) fn authenticated_request(
    endpoints: &CatalogEndpoints,
    session: &SessionContext,
    url: url::Url,
) -> BrowserRequest {
    BrowserRequest::get(url).with_header(&endpoints.fingerprint_header, &session.fingerprint)
}

/// Parse a JSON body, classifying anything non-conforming as a block page.
pub(crate) fn parse_conforming<T: serde::de::DeserializeOwned>(
    response: &BrowserResponse,
) -> FetchResult<T> {
    serde_json::from_str(&response.body).map_err(|e| FetchError::Blocked {
        status: response.status,
        reason: format!("{} (body: {:?})", e, snippet(&response.body)),
    })
}

fn snippet(body: &str) -> String {
    body.chars().take(BODY_SNIPPET_LEN).collect()
}

#[async_trait]
impl<B: BrowserRequestExecutor> CategoryPager for ListingPager<B> {
    #[instrument(skip(self, session))]
    async fn fetch_page(
        &self,
        session: &SessionContext,
        category_id: &str,
        page: u32,
    ) -> FetchResult<PageResult> {
        let url = self
            .endpoints
            .listing_url(category_id, page, self.page_size)?;
        let request = authenticated_request(&self.endpoints, session, url);

        let response = self.browser.get(session, request).await?;
        let envelope: ListingEnvelope = parse_conforming(&response)?;

        debug!(
            total = envelope.total_elements,
            records = envelope.content.len(),
            "Listing page parsed"
        );
        Ok(envelope.into())
    }

    fn page_size(&self) -> u32 {
        self.page_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockBrowser;
    use crate::types::session::{FingerprintSource, SessionCookie};

    fn session() -> SessionContext {
        SessionContext::new(
            vec![SessionCookie::new("waf", "ok")],
            "fp-123",
            FingerprintSource::Cookie,
        )
    }

    fn pager(browser: MockBrowser) -> ListingPager<MockBrowser> {
        ListingPager::new(
            Arc::new(browser),
            CatalogEndpoints::parse("https://data.example.gov").unwrap(),
            100,
        )
    }

    #[tokio::test]
    async fn test_parses_listing_envelope() {
        let browser = MockBrowser::new().with_response(
            "category=economy&page=0",
            BrowserResponse::new(
                200,
                r#"{"totalElements": 250, "content": [{"id": "x1", "name": "GDP"}, {"id": 7}]}"#,
            ),
        );

        let page = pager(browser).fetch_page(&session(), "economy", 0).await.unwrap();

        assert_eq!(page.total_elements, 250);
        assert_eq!(page.records.len(), 2);
        assert_eq!(page.records[1].external_id, "7");
        assert_eq!(page.total_pages(100), 3);
    }

    #[tokio::test]
    async fn test_null_arrays_on_one_record_do_not_block_page() {
        let browser = MockBrowser::new().with_response(
            "category=economy&page=0",
            BrowserResponse::new(
                200,
                r#"{"totalElements": 2, "content": [
                    {"id": "x1", "resources": null, "columns": null},
                    {"id": "x2", "name": "Trade"}
                ]}"#,
            ),
        );

        let page = pager(browser).fetch_page(&session(), "economy", 0).await.unwrap();

        assert_eq!(page.records.len(), 2);
        assert!(page.records[0].resources.is_empty());
        assert!(page.records[0].columns.is_empty());
    }

    #[tokio::test]
    async fn test_html_body_is_blocked() {
        let browser = MockBrowser::new().with_response(
            "category=economy",
            BrowserResponse::new(200, "<html><body>Request rejected</body></html>"),
        );

        let err = pager(browser).fetch_page(&session(), "economy", 0).await.unwrap_err();

        assert!(err.is_blocked());
    }

    #[tokio::test]
    async fn test_json_of_wrong_shape_is_blocked() {
        let browser = MockBrowser::new()
            .with_response("category=economy", BrowserResponse::new(403, r#"{"error": "denied"}"#));

        let err = pager(browser).fetch_page(&session(), "economy", 0).await.unwrap_err();

        assert!(matches!(err, FetchError::Blocked { status: 403, .. }));
    }

    #[tokio::test]
    async fn test_transport_failure_is_not_blocked() {
        let browser = MockBrowser::new();

        let err = pager(browser).fetch_page(&session(), "economy", 0).await.unwrap_err();

        assert!(matches!(err, FetchError::Transport(_)));
    }

    #[tokio::test]
    async fn test_request_carries_fingerprint_and_size() {
        let browser = MockBrowser::new().with_response(
            "category=health",
            BrowserResponse::new(200, r#"{"totalElements": 0, "content": []}"#),
        );
        let pager = pager(browser.clone());

        pager.fetch_page(&session(), "health", 4).await.unwrap();

        let requests = browser.requests();
        assert_eq!(requests.len(), 1);
        assert!(requests[0].url.as_str().ends_with("category=health&page=4&size=100"));
        assert!(requests[0]
            .headers
            .contains(&("x-client-fingerprint".to_string(), "fp-123".to_string())));
    }
}
