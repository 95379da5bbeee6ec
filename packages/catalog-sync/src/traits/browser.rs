//! The browsing-context capability.
//!
//! Requests against the catalog must carry live cookies, a plausible
//! fingerprint, and originate from a context that ran the site's scripts.
//! Any implementation that satisfies this (a browser-automation driver, a
//! rendering service, or a fingerprint-mimicking HTTP client) can back it.

use async_trait::async_trait;
use url::Url;

use crate::error::BrowserResult;
use crate::types::session::{SessionContext, SessionCookie};

/// A GET request issued from inside the browsing context.
#[derive(Debug, Clone)]
pub struct BrowserRequest {
    pub url: Url,
    pub headers: Vec<(String, String)>,
}

impl BrowserRequest {
    pub fn get(url: Url) -> Self {
        Self {
            url,
            headers: Vec::new(),
        }
    }

    /// Add a request header.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

/// Raw response from the browsing context.
///
/// Status and body are returned as-is; classifying a block page is the
/// caller's job.
#[derive(Debug, Clone)]
pub struct BrowserResponse {
    pub status: u16,
    pub body: String,
}

impl BrowserResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }
}

/// Executes requests with the fidelity of an organic browser session.
#[async_trait]
pub trait BrowserRequestExecutor: Send + Sync {
    /// Load a page in a fresh context, discarding the previous one.
    async fn navigate(&self, url: &Url) -> BrowserResult<()>;

    /// Cookies the current context holds for `origin`.
    async fn cookies(&self, origin: &Url) -> BrowserResult<Vec<SessionCookie>>;

    /// Value of a header seen on the context's own outgoing requests.
    ///
    /// Contexts that run no page scripts have no outgoing script traffic to
    /// watch; they may answer from whatever the page load exposed instead,
    /// and must say so in their docs.
    async fn observed_request_header(&self, name: &str) -> Option<String>;

    /// Issue a GET carrying the session's cookies and fingerprint.
    async fn get(
        &self,
        session: &SessionContext,
        request: BrowserRequest,
    ) -> BrowserResult<BrowserResponse>;
}
