//! HTTP-based browsing context.
//!
//! A fingerprint-mimicking HTTP client: browser-shaped headers, a fresh
//! cookie jar per navigation, and session cookies replayed on every request.
//! It runs no page scripts, so protections that require JavaScript execution
//! need a driver-backed [`BrowserRequestExecutor`] instead.

use async_trait::async_trait;
use reqwest::cookie::{CookieStore, Jar};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, COOKIE};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

use crate::error::{BrowserError, BrowserResult};
use crate::traits::browser::{BrowserRequest, BrowserRequestExecutor, BrowserResponse};
use crate::types::session::{SessionContext, SessionCookie};

const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";

/// State of the current browsing context.
#[derive(Default)]
struct ContextState {
    jar: Arc<Jar>,
    /// Response headers of the last navigation, lowercase names
    navigation_headers: HashMap<String, String>,
}

/// reqwest-backed [`BrowserRequestExecutor`].
///
/// Having no page scripts, it sees no script-issued requests. Its
/// [`observed_request_header`](BrowserRequestExecutor::observed_request_header)
/// answers from the listing view's *response* headers, which is where
/// protections that hand the token to non-script clients put it.
///
/// # Example
///
/// ```rust,ignore
/// use catalog_sync::browser::HttpBrowser;
///
/// let browser = HttpBrowser::new()?.with_timeout(Duration::from_secs(20));
/// ```
pub struct HttpBrowser {
    client: reqwest::Client,
    user_agent: String,
    accept_language: String,
    timeout: Duration,
    state: RwLock<ContextState>,
}

impl HttpBrowser {
    /// Create a new HTTP browser with default settings.
    pub fn new() -> BrowserResult<Self> {
        let timeout = Duration::from_secs(30);
        Ok(Self {
            client: build_client(None, timeout)?,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            accept_language: "en-US,en;q=0.9".to_string(),
            timeout,
            state: RwLock::new(ContextState::default()),
        })
    }

    /// Set a custom user agent.
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Set the `Accept-Language` header.
    pub fn with_accept_language(mut self, value: impl Into<String>) -> Self {
        self.accept_language = value.into();
        self
    }

    /// Set the per-request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> BrowserResult<Self> {
        self.client = build_client(None, timeout)?;
        self.timeout = timeout;
        Ok(self)
    }

    fn browser_headers(&self, accept: &'static str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static(accept));
        if let Ok(lang) = HeaderValue::from_str(&self.accept_language) {
            headers.insert(ACCEPT_LANGUAGE, lang);
        }
        headers
    }
}

fn build_client(jar: Option<Arc<Jar>>, timeout: Duration) -> BrowserResult<reqwest::Client> {
    let mut builder = reqwest::Client::builder().timeout(timeout);
    if let Some(jar) = jar {
        builder = builder.cookie_provider(jar);
    }
    builder.build().map_err(|e| BrowserError::Http(Box::new(e)))
}

fn map_request_error(url: &Url, e: reqwest::Error) -> BrowserError {
    if e.is_timeout() {
        BrowserError::Timeout {
            url: url.to_string(),
        }
    } else {
        BrowserError::Http(Box::new(e))
    }
}

/// Parse a `Cookie` header value (`a=1; b=2`) into pairs.
fn parse_cookie_header(value: &str) -> Vec<SessionCookie> {
    value
        .split(';')
        .filter_map(|pair| {
            let (name, value) = pair.trim().split_once('=')?;
            let name = name.trim();
            (!name.is_empty()).then(|| SessionCookie::new(name, value.trim()))
        })
        .collect()
}

#[async_trait]
impl BrowserRequestExecutor for HttpBrowser {
    async fn navigate(&self, url: &Url) -> BrowserResult<()> {
        debug!(url = %url, "Opening fresh browsing context");

        let jar = Arc::new(Jar::default());
        let client = build_client(Some(jar.clone()), self.timeout)?;

        let response = client
            .get(url.clone())
            .header(reqwest::header::USER_AGENT, &self.user_agent)
            .headers(self.browser_headers(
                "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
            ))
            .send()
            .await
            .map_err(|e| map_request_error(url, e))?;

        let status = response.status();
        if status.is_server_error() {
            return Err(BrowserError::Navigation {
                url: url.to_string(),
                reason: format!("HTTP {}", status),
            });
        }
        if !status.is_success() {
            // Challenge pages often answer 403 while still setting cookies.
            warn!(url = %url, status = status.as_u16(), "Listing view returned non-success status");
        }

        let navigation_headers = response
            .headers()
            .iter()
            .filter_map(|(k, v)| v.to_str().ok().map(|v| (k.as_str().to_string(), v.to_string())))
            .collect();

        // Drain the body so the connection completes like a page load.
        let _ = response.bytes().await;

        let mut state = self.state.write().unwrap();
        *state = ContextState {
            jar,
            navigation_headers,
        };
        Ok(())
    }

    async fn cookies(&self, origin: &Url) -> BrowserResult<Vec<SessionCookie>> {
        let jar = self.state.read().unwrap().jar.clone();
        Ok(jar
            .cookies(origin)
            .and_then(|value| value.to_str().ok().map(parse_cookie_header))
            .unwrap_or_default())
    }

    async fn observed_request_header(&self, name: &str) -> Option<String> {
        self.state
            .read()
            .unwrap()
            .navigation_headers
            .get(&name.to_ascii_lowercase())
            .cloned()
    }

    async fn get(
        &self,
        session: &SessionContext,
        request: BrowserRequest,
    ) -> BrowserResult<BrowserResponse> {
        let url = request.url;
        let mut builder = self
            .client
            .get(url.clone())
            .header(reqwest::header::USER_AGENT, &self.user_agent)
            .headers(self.browser_headers("application/json, text/plain, */*"));

        if let Some(cookies) = session.cookie_header() {
            builder = builder.header(COOKIE, cookies);
        }
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let response = builder
            .send()
            .await
            .map_err(|e| map_request_error(&url, e))?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| map_request_error(&url, e))?;

        Ok(BrowserResponse::new(status, body))
    }
}
