//! Session acquisition through a live browsing context.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument, warn};

use crate::error::{SessionError, SessionResult};
use crate::traits::browser::BrowserRequestExecutor;
use crate::traits::session::SessionProvider;
use crate::types::config::{CatalogEndpoints, SyncConfig};
use crate::types::session::{FingerprintSource, SessionContext};

/// Bootstraps sessions by loading the catalog's listing view.
///
/// Each `acquire` opens a fresh context, waits for the site's own scripts
/// to establish anti-bot cookies, then harvests the cookies and a
/// fingerprint token.
pub struct BrowserSessionProvider<B: BrowserRequestExecutor> {
    browser: Arc<B>,
    endpoints: CatalogEndpoints,
    settle_delay: Duration,
    navigation_timeout: Duration,
}

impl<B: BrowserRequestExecutor> BrowserSessionProvider<B> {
    /// Create a provider over a shared browsing context.
    pub fn new(browser: Arc<B>, endpoints: CatalogEndpoints, config: &SyncConfig) -> Self {
        Self {
            browser,
            endpoints,
            settle_delay: config.settle_delay,
            navigation_timeout: config.navigation_timeout,
        }
    }

    /// Resolve the fingerprint: observed header, then cookie, then a random token.
    ///
    /// The fallback is deliberately lenient; some protections only check
    /// that a well-formed token is present.
    async fn harvest_fingerprint(&self, session_cookie: Option<&str>) -> (String, FingerprintSource) {
        if let Some(token) = self
            .browser
            .observed_request_header(&self.endpoints.fingerprint_header)
            .await
            .filter(|t| !t.trim().is_empty())
        {
            return (token, FingerprintSource::ObservedHeader);
        }

        if let Some(token) = session_cookie.filter(|t| !t.trim().is_empty()) {
            return (token.to_string(), FingerprintSource::Cookie);
        }

        (generate_fingerprint(), FingerprintSource::Generated)
    }
}

/// A random 32-hex-digit token.
pub fn generate_fingerprint() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

#[async_trait]
impl<B: BrowserRequestExecutor> SessionProvider for BrowserSessionProvider<B> {
    #[instrument(skip(self), fields(origin = %self.endpoints.base_url))]
    async fn acquire(&self) -> SessionResult<SessionContext> {
        let view_url = self.endpoints.listing_view_url()?;

        tokio::time::timeout(self.navigation_timeout, self.browser.navigate(&view_url))
            .await
            .map_err(|_| SessionError::NavigationTimeout {
                url: view_url.to_string(),
                secs: self.navigation_timeout.as_secs(),
            })??;

        tokio::time::sleep(self.settle_delay).await;

        let cookies = self.browser.cookies(&self.endpoints.base_url).await?;
        let cookie_token = cookies
            .iter()
            .find(|c| c.name == self.endpoints.fingerprint_cookie)
            .map(|c| c.value.as_str());
        let (fingerprint, source) = self.harvest_fingerprint(cookie_token).await;

        if source == FingerprintSource::Generated {
            warn!("No fingerprint observable, using generated token");
        }
        info!(
            cookies = cookies.len(),
            fingerprint_source = ?source,
            "Session acquired"
        );

        Ok(SessionContext::new(cookies, fingerprint, source))
    }
}
