//! Core trait abstractions for the sync engine.
//!
//! These traits are the seams between the crawl loop and its collaborators:
//! the browsing context, the upstream endpoints, the destination store, and
//! the checkpoint sink.

pub mod browser;
pub mod checkpoint;
pub mod detail;
pub mod pager;
pub mod session;
pub mod store;
