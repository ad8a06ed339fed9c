// src/models/mod.rs

//! Domain models for the sync application.
//!
//! This module contains all data structures used throughout the application,
//! organized by their primary purpose.

mod config;
mod event;
mod market;
mod page;
mod snapshot;
mod sync;

// Re-export all public types
pub use config::{CategoryRule, Config, EnrichmentConfig, HttpConfig, SyncConfig};
pub use event::{ChangeEvent, ChangeKind};
pub use market::Market;
pub use page::{
    Enrichment, FetchedPage, SitemapEntry, content_hash, count_words, normalize_whitespace,
};
pub use snapshot::{ContentSnapshot, PageId};
pub use sync::{MarketStatus, ReconcileOptions, ReconciliationResult};
