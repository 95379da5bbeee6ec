//! Configuration types for the sync engine and the upstream catalog.

use std::time::Duration;
use url::Url;

use crate::error::BrowserResult;

/// Run-wide tuning for one worker.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Records requested per listing page. Default: 100.
    pub page_size: u32,

    /// Session bootstrap attempts at worker start. Default: 3.
    pub session_attempts: u32,

    /// Wait after page load for the site's scripts to set anti-bot cookies.
    ///
    /// Default: 5 seconds.
    pub settle_delay: Duration,

    /// Hard timeout on the listing view navigation. Default: 60 seconds.
    pub navigation_timeout: Duration,

    /// Sessions older than this are replaced before the next fetch.
    ///
    /// Default: 20 minutes.
    pub session_max_age: Duration,

    /// Fetch per-record detail after each listing upsert. Default: true.
    pub enrich: bool,

    /// Minimum spacing between detail fetches on one worker. Default: 1 second.
    pub enrich_min_delay: Duration,

    /// Snapshot progress after this many completed categories. Default: 1.
    pub checkpoint_every_categories: usize,

    /// Snapshot progress at least this often. Default: 30 seconds.
    pub checkpoint_interval: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            page_size: 100,
            session_attempts: 3,
            settle_delay: Duration::from_secs(5),
            navigation_timeout: Duration::from_secs(60),
            session_max_age: Duration::from_secs(20 * 60),
            enrich: true,
            enrich_min_delay: Duration::from_secs(1),
            checkpoint_every_categories: 1,
            checkpoint_interval: Duration::from_secs(30),
        }
    }
}

impl SyncConfig {
    /// Create a new config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the listing page size.
    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size;
        self
    }

    /// Set session bootstrap attempts.
    pub fn with_session_attempts(mut self, attempts: u32) -> Self {
        self.session_attempts = attempts;
        self
    }

    /// Set the post-navigation settle delay.
    pub fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    /// Set the navigation timeout.
    pub fn with_navigation_timeout(mut self, timeout: Duration) -> Self {
        self.navigation_timeout = timeout;
        self
    }

    /// Set the maximum session age.
    pub fn with_session_max_age(mut self, max_age: Duration) -> Self {
        self.session_max_age = max_age;
        self
    }

    /// Enable or disable enrichment.
    pub fn with_enrich(mut self, enrich: bool) -> Self {
        self.enrich = enrich;
        self
    }

    /// Set the minimum delay between detail fetches.
    pub fn with_enrich_min_delay(mut self, delay: Duration) -> Self {
        self.enrich_min_delay = delay;
        self
    }

    /// Set checkpoint cadence.
    pub fn with_checkpoint_cadence(mut self, every_categories: usize, interval: Duration) -> Self {
        self.checkpoint_every_categories = every_categories;
        self.checkpoint_interval = interval;
        self
    }
}

/// Where the upstream catalog lives and how its requests are shaped.
#[derive(Debug, Clone)]
pub struct CatalogEndpoints {
    /// Origin of the catalog site, e.g. `https://data.example.gov`
    pub base_url: Url,

    /// Human-facing listing view loaded to bootstrap a session
    pub listing_view_path: String,

    /// JSON listing endpoint
    pub listing_api_path: String,

    /// JSON detail endpoint; the external id is appended as a path segment
    pub detail_api_path: String,

    /// Public record page, `{id}` replaced by the external id
    pub record_url_template: String,

    pub category_param: String,
    pub page_param: String,
    pub size_param: String,

    /// Request header the site's scripts attach the fingerprint to
    pub fingerprint_header: String,

    /// Cookie the protection layer stores the fingerprint in
    pub fingerprint_cookie: String,
}

impl CatalogEndpoints {
    /// Create endpoints for a catalog origin with conventional paths.
    pub fn new(base_url: Url) -> Self {
        let record_url_template = format!("{}/dataset/{{id}}", base_url.as_str().trim_end_matches('/'));
        Self {
            base_url,
            listing_view_path: "/datasets".to_string(),
            listing_api_path: "/api/datasets".to_string(),
            detail_api_path: "/api/datasets".to_string(),
            record_url_template,
            category_param: "category".to_string(),
            page_param: "page".to_string(),
            size_param: "size".to_string(),
            fingerprint_header: "x-client-fingerprint".to_string(),
            fingerprint_cookie: "waf_fp".to_string(),
        }
    }

    /// Parse the origin and create endpoints.
    pub fn parse(base_url: &str) -> BrowserResult<Self> {
        Ok(Self::new(Url::parse(base_url)?))
    }

    /// Set the listing view path.
    pub fn with_listing_view_path(mut self, path: impl Into<String>) -> Self {
        self.listing_view_path = path.into();
        self
    }

    /// Set the listing API path.
    pub fn with_listing_api_path(mut self, path: impl Into<String>) -> Self {
        self.listing_api_path = path.into();
        self
    }

    /// Set the detail API path.
    pub fn with_detail_api_path(mut self, path: impl Into<String>) -> Self {
        self.detail_api_path = path.into();
        self
    }

    /// Set the public record URL template (`{id}` placeholder).
    pub fn with_record_url_template(mut self, template: impl Into<String>) -> Self {
        self.record_url_template = template.into();
        self
    }

    /// Set the fingerprint header and cookie names.
    pub fn with_fingerprint_names(
        mut self,
        header: impl Into<String>,
        cookie: impl Into<String>,
    ) -> Self {
        self.fingerprint_header = header.into();
        self.fingerprint_cookie = cookie.into();
        self
    }

    /// URL of the listing view used for session bootstrap.
    pub fn listing_view_url(&self) -> BrowserResult<Url> {
        Ok(self.base_url.join(&self.listing_view_path)?)
    }

    /// URL of one listing page.
    pub fn listing_url(&self, category_id: &str, page: u32, page_size: u32) -> BrowserResult<Url> {
        let mut url = self.base_url.join(&self.listing_api_path)?;
        url.query_pairs_mut()
            .append_pair(&self.category_param, category_id)
            .append_pair(&self.page_param, &page.to_string())
            .append_pair(&self.size_param, &page_size.to_string());
        Ok(url)
    }

    /// URL of one record's detail.
    pub fn detail_url(&self, external_id: &str) -> BrowserResult<Url> {
        let mut url = self.base_url.join(&self.detail_api_path)?;
        url.path_segments_mut()
            .map_err(|_| url::ParseError::RelativeUrlWithCannotBeABaseBase)?
            .pop_if_empty()
            .push(external_id);
        Ok(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn endpoints() -> CatalogEndpoints {
        CatalogEndpoints::parse("https://data.example.gov").unwrap()
    }

    #[test]
    fn test_listing_url_carries_paging() {
        let url = endpoints().listing_url("economy", 2, 100).unwrap();
        assert_eq!(
            url.as_str(),
            "https://data.example.gov/api/datasets?category=economy&page=2&size=100"
        );
    }

    #[test]
    fn test_detail_url_encodes_id() {
        let url = endpoints().detail_url("a b/1").unwrap();
        assert_eq!(url.as_str(), "https://data.example.gov/api/datasets/a%20b%2F1");
    }

    #[test]
    fn test_default_record_url_template() {
        assert_eq!(
            endpoints().record_url_template,
            "https://data.example.gov/dataset/{id}"
        );
    }
}
