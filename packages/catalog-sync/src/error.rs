//! Typed errors for the catalog sync engine.
//!
//! Uses `thiserror` for library errors (not `anyhow`). Every error below the
//! worker level is recovered locally; only an exhausted
//! [`SessionError::Exhausted`] at worker start escalates.

use thiserror::Error;

/// Boxed source error for collaborator failures.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Failures of the browsing context itself.
#[derive(Debug, Error)]
pub enum BrowserError {
    /// Navigation to a page failed
    #[error("navigation to {url} failed: {reason}")]
    Navigation { url: String, reason: String },

    /// Request exceeded the browsing context's timeout
    #[error("request to {url} timed out")]
    Timeout { url: String },

    /// Network-level request failure
    #[error("HTTP error: {0}")]
    Http(#[source] BoxError),

    /// URL could not be built
    #[error("invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

/// Classified outcome of a failed listing or detail fetch.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Body did not parse as the expected schema (a block page, not data)
    #[error("blocked response ({status}): {reason}")]
    Blocked { status: u16, reason: String },

    /// Network-level failure
    #[error("transport error: {0}")]
    Transport(#[from] BrowserError),
}

impl FetchError {
    /// Whether the response was classified as a block page.
    pub fn is_blocked(&self) -> bool {
        matches!(self, FetchError::Blocked { .. })
    }
}

/// Failures acquiring an authenticated browsing context.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Page load did not finish within the hard navigation timeout
    #[error("navigation to {url} exceeded {secs}s")]
    NavigationTimeout { url: String, secs: u64 },

    /// The browsing context failed
    #[error("browser error: {0}")]
    Browser(#[from] BrowserError),

    /// Every bootstrap attempt failed
    #[error("session acquisition failed after {attempts} attempts: {last}")]
    Exhausted {
        attempts: u32,
        #[source]
        last: Box<SessionError>,
    },
}

/// Destination store failures.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Store could not be reached
    #[error("store unavailable: {0}")]
    Unavailable(#[source] BoxError),

    /// Query or statement failed
    #[error("store query failed: {0}")]
    Query(#[source] BoxError),

    /// Stored JSON column could not be decoded
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Record has no usable external id
    #[error("record has empty external id")]
    MissingExternalId,
}

/// Enrichment failures. Always logged and skipped by the worker.
#[derive(Debug, Error)]
pub enum EnrichError {
    /// Detail fetch failed
    #[error("detail fetch failed: {0}")]
    Fetch(#[from] FetchError),

    /// Merging the detail into the store failed
    #[error("detail merge failed: {0}")]
    Store(#[from] StoreError),
}

/// Checkpoint sink failures.
#[derive(Debug, Error)]
pub enum CheckpointError {
    /// File I/O failed
    #[error("checkpoint I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Snapshot could not be (de)serialized
    #[error("checkpoint JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Invalid partition parameters.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PartitionError {
    /// Worker count must be at least one
    #[error("worker count must be greater than zero")]
    ZeroWorkers,

    /// Worker index must be below the worker count
    #[error("worker index {index} out of range for {count} workers")]
    IndexOutOfRange { index: usize, count: usize },
}

/// Worker-level errors. Only these terminate a worker.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Session bootstrap exhausted its retries
    #[error("session error: {0}")]
    Session(#[from] SessionError),

    /// Partition parameters were invalid
    #[error("partition error: {0}")]
    Partition(#[from] PartitionError),
}

/// Result type alias for browser operations.
pub type BrowserResult<T> = std::result::Result<T, BrowserError>;

/// Result type alias for fetch operations.
pub type FetchResult<T> = std::result::Result<T, FetchError>;

/// Result type alias for session operations.
pub type SessionResult<T> = std::result::Result<T, SessionError>;

/// Result type alias for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Result type alias for worker operations.
pub type Result<T> = std::result::Result<T, SyncError>;
