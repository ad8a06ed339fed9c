//! Diff calculation between sitemap entries and stored snapshots.
//!
//! Classifies each sitemap URL as new, refresh candidate or unchanged, and
//! computes the word-count delta recorded on change events.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{ContentSnapshot, FetchedPage, Market, SitemapEntry};

/// Why a known URL is fetched again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefreshReason {
    /// Caller asked for a full refresh
    Forced,
    /// Last crawl is older than the staleness threshold
    Stale,
    /// Sitemap declares a newer modification time
    SourceModified,
}

/// Classification of a sitemap entry against the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    New,
    Refresh(RefreshReason),
    Unchanged,
}

impl Classification {
    pub fn needs_fetch(&self) -> bool {
        !matches!(self, Classification::Unchanged)
    }
}

/// Inputs of the refresh decision that do not vary per URL.
#[derive(Debug, Clone, Copy)]
pub struct RefreshPolicy {
    pub force_refresh: bool,
    /// Snapshots crawled before this instant are stale
    pub stale_before: DateTime<Utc>,
}

impl RefreshPolicy {
    /// Classify one sitemap entry.
    pub fn classify(
        &self,
        entry: &SitemapEntry,
        existing: Option<&ContentSnapshot>,
    ) -> Classification {
        let Some(snapshot) = existing else {
            return Classification::New;
        };

        if self.force_refresh {
            return Classification::Refresh(RefreshReason::Forced);
        }
        if snapshot.is_stale(self.stale_before) {
            return Classification::Refresh(RefreshReason::Stale);
        }
        // A lastmod already covered by a later crawl was seen on that crawl.
        if entry.last_modified.is_some_and(|modified| {
            modified > snapshot.last_modified_at && modified > snapshot.last_crawled_at
        }) {
            return Classification::Refresh(RefreshReason::SourceModified);
        }
        Classification::Unchanged
    }
}

/// Relative word-count change in percent, rounded half away from zero.
///
/// Returns 0 when the previous count is 0.
pub fn change_percent(old_word_count: u64, new_word_count: u64) -> i64 {
    if old_word_count == 0 {
        return 0;
    }
    let delta = new_word_count as f64 - old_word_count as f64;
    ((delta / old_word_count as f64) * 100.0).round() as i64
}

/// Whether a refetch differs from the stored snapshot.
///
/// Compares content hashes; snapshots stored without a hash fall back to
/// word counts.
pub fn content_changed(existing: &ContentSnapshot, fetched: &FetchedPage) -> bool {
    if existing.content_hash.is_empty() {
        return existing.word_count != fetched.word_count;
    }
    existing.content_hash != fetched.content_hash
}

/// Drop excluded and duplicate URLs, keeping sitemap order.
pub fn prepare_entries(market: &Market, entries: Vec<SitemapEntry>) -> Vec<SitemapEntry> {
    let mut seen = HashSet::new();
    entries
        .into_iter()
        .filter(|entry| !market.is_excluded(&entry.url))
        .filter(|entry| seen.insert(entry.url.clone()))
        .collect()
}
