//! In-memory storage implementation.
//!
//! Holds snapshots and events for the lifetime of the process. Used by tests
//! and dry runs.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::error::Result;
use crate::models::{ChangeEvent, ContentSnapshot, Enrichment};
use crate::storage::{ContentStore, SnapshotTable, filter_events};

/// In-memory storage backend.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    snapshots: RwLock<SnapshotTable>,
    events: RwLock<Vec<ChangeEvent>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of events written so far.
    pub async fn event_count(&self) -> usize {
        self.events.read().await.len()
    }
}

#[async_trait]
impl ContentStore for MemoryStorage {
    async fn find_snapshot(&self, url: &str) -> Result<Option<ContentSnapshot>> {
        Ok(self.snapshots.read().await.get(url).cloned())
    }

    async fn upsert_snapshot(&self, snapshot: &ContentSnapshot) -> Result<()> {
        self.snapshots.write().await.upsert(snapshot);
        Ok(())
    }

    async fn mark_crawled(&self, url: &str, at: DateTime<Utc>) -> Result<()> {
        self.snapshots.write().await.mark_crawled(url, at)
    }

    async fn save_enrichment(&self, url: &str, enrichment: &Enrichment) -> Result<()> {
        self.snapshots.write().await.save_enrichment(url, enrichment)
    }

    async fn append_event(&self, event: &ChangeEvent) -> Result<()> {
        self.events.write().await.push(event.clone());
        Ok(())
    }

    async fn list_snapshots(&self, market: &str) -> Result<Vec<ContentSnapshot>> {
        Ok(self.snapshots.read().await.for_market(market))
    }

    async fn list_events(&self, market: Option<&str>) -> Result<Vec<ChangeEvent>> {
        let events = self.events.read().await.clone();
        Ok(filter_events(events, market))
    }
}
