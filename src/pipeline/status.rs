//! Read-only projections over the store.

use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::models::{ChangeEvent, MarketStatus, SyncConfig};
use crate::storage::ContentStore;

/// Snapshot count, latest crawl and stale backlog for a market.
///
/// An unknown market yields an empty status rather than an error.
pub async fn market_status(
    store: &dyn ContentStore,
    market: &str,
    sync: &SyncConfig,
    now: DateTime<Utc>,
) -> Result<MarketStatus> {
    let snapshots = store.list_snapshots(market).await?;
    let cutoff = sync.stale_cutoff(now);

    Ok(MarketStatus {
        market: market.to_string(),
        total_snapshots: snapshots.len(),
        last_crawled_at: snapshots.iter().map(|s| s.last_crawled_at).max(),
        pending_urls: snapshots.iter().filter(|s| s.is_stale(cutoff)).count(),
    })
}

/// Most recent change events, newest first.
///
/// Events sharing a timestamp keep reverse append order.
pub async fn recent_activity(
    store: &dyn ContentStore,
    market: Option<&str>,
    limit: usize,
) -> Result<Vec<ChangeEvent>> {
    let mut events = store.list_events(market).await?;
    events.reverse();
    events.sort_by(|a, b| b.occurred_at.cmp(&a.occurred_at));
    events.truncate(limit);
    Ok(events)
}
