//! Session types - the ephemeral authenticated browsing context.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// A cookie harvested from the target origin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionCookie {
    pub name: String,
    pub value: String,
}

impl SessionCookie {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Where the anti-bot fingerprint token came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FingerprintSource {
    /// Read from an outgoing request header the site's scripts set
    ObservedHeader,
    /// Read from the known fingerprint cookie
    Cookie,
    /// Neither was observable; a random token of the right shape
    Generated,
}

/// An authenticated browsing context.
///
/// Exclusively owned by one worker and passed by parameter; it is replaced
/// wholesale after a block or on expiry, never patched in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionContext {
    pub cookies: Vec<SessionCookie>,
    pub fingerprint: String,
    pub fingerprint_source: FingerprintSource,
    pub acquired_at: DateTime<Utc>,
}

impl SessionContext {
    /// Create a session acquired now.
    pub fn new(
        cookies: Vec<SessionCookie>,
        fingerprint: impl Into<String>,
        fingerprint_source: FingerprintSource,
    ) -> Self {
        Self {
            cookies,
            fingerprint: fingerprint.into(),
            fingerprint_source,
            acquired_at: Utc::now(),
        }
    }

    /// Override the acquisition time.
    pub fn with_acquired_at(mut self, acquired_at: DateTime<Utc>) -> Self {
        self.acquired_at = acquired_at;
        self
    }

    /// `Cookie` header value (`a=1; b=2`), or `None` without cookies.
    pub fn cookie_header(&self) -> Option<String> {
        if self.cookies.is_empty() {
            return None;
        }
        Some(
            self.cookies
                .iter()
                .map(|c| format!("{}={}", c.name, c.value))
                .collect::<Vec<_>>()
                .join("; "),
        )
    }

    /// Look up a cookie value by name.
    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.cookies
            .iter()
            .find(|c| c.name == name)
            .map(|c| c.value.as_str())
    }

    /// Whether the session is older than `max_age`.
    pub fn is_expired(&self, max_age: Duration) -> bool {
        match chrono::Duration::from_std(max_age) {
            Ok(max_age) => Utc::now() - self.acquired_at > max_age,
            Err(_) => false,
        }
    }
}
