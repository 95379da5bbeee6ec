//! Data types for the catalog sync engine.

pub mod category;
pub mod checkpoint;
pub mod config;
pub mod page;
pub mod record;
pub mod session;
