//! Browsing-context implementations.
//!
//! - `HttpBrowser` - reqwest-based context that mimics browser request shape

pub mod http;

pub use http::HttpBrowser;
