//! Storage abstractions for snapshot and change-event persistence.
//!
//! Two logical tables:
//! - Snapshots: one record per URL, mutated in place on every fetch
//! - Events: append-only change log referencing snapshots by page id
//!
//! ## Local Layout
//!
//! ```text
//! {root}/
//! ├── config.toml           # Sync configuration
//! ├── snapshots.json        # url -> ContentSnapshot (atomic rewrite)
//! └── events.jsonl          # One ChangeEvent per line (append-only)
//! ```

pub mod local;
pub mod memory;
#[cfg(feature = "s3")]
pub mod s3;

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::{AppError, Result};
use crate::models::{ChangeEvent, ContentSnapshot, Enrichment};

// Re-export for convenience
pub use local::LocalStorage;
pub use memory::MemoryStorage;

/// Trait for snapshot/event storage backends.
///
/// Writes to different URLs may run concurrently; writes to the same URL are
/// last-writer-wins.
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Look up the snapshot for a URL.
    async fn find_snapshot(&self, url: &str) -> Result<Option<ContentSnapshot>>;

    /// Insert or overwrite the snapshot keyed by its URL.
    async fn upsert_snapshot(&self, snapshot: &ContentSnapshot) -> Result<()>;

    /// Update only `last_crawled_at` of an existing snapshot.
    async fn mark_crawled(&self, url: &str, at: DateTime<Utc>) -> Result<()>;

    /// Store enrichment output on an existing snapshot.
    async fn save_enrichment(&self, url: &str, enrichment: &Enrichment) -> Result<()>;

    /// Append an immutable change event.
    async fn append_event(&self, event: &ChangeEvent) -> Result<()>;

    /// All snapshots of a market.
    async fn list_snapshots(&self, market: &str) -> Result<Vec<ContentSnapshot>>;

    /// Events in append order, optionally filtered by market.
    async fn list_events(&self, market: Option<&str>) -> Result<Vec<ChangeEvent>>;
}

/// In-memory snapshot table shared by the storage backends.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub(crate) struct SnapshotTable {
    rows: BTreeMap<String, ContentSnapshot>,
}

impl SnapshotTable {
    pub fn get(&self, url: &str) -> Option<&ContentSnapshot> {
        self.rows.get(url)
    }

    pub fn upsert(&mut self, snapshot: &ContentSnapshot) {
        self.rows.insert(snapshot.url.clone(), snapshot.clone());
    }

    pub fn mark_crawled(&mut self, url: &str, at: DateTime<Utc>) -> Result<()> {
        let row = self.row_mut(url)?;
        row.last_crawled_at = at;
        Ok(())
    }

    pub fn save_enrichment(&mut self, url: &str, enrichment: &Enrichment) -> Result<()> {
        self.row_mut(url)?.apply_enrichment(enrichment);
        Ok(())
    }

    pub fn for_market(&self, market: &str) -> Vec<ContentSnapshot> {
        self.rows
            .values()
            .filter(|s| s.market == market)
            .cloned()
            .collect()
    }

    fn row_mut(&mut self, url: &str) -> Result<&mut ContentSnapshot> {
        self.rows
            .get_mut(url)
            .ok_or_else(|| AppError::persistence(format!("No snapshot stored for {url}")))
    }
}

/// Keep events of one market, or all events when no market is given.
pub(crate) fn filter_events(events: Vec<ChangeEvent>, market: Option<&str>) -> Vec<ChangeEvent> {
    match market {
        Some(market) => events.into_iter().filter(|e| e.market == market).collect(),
        None => events,
    }
}
