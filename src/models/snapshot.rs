//! Content snapshot data structures.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::models::{Enrichment, FetchedPage};

/// Stable identifier of a snapshot, derived from its URL.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PageId(String);

impl PageId {
    /// Derive the page id for a URL (first 16 hex chars of its SHA-256).
    pub fn from_url(url: &str) -> Self {
        let digest = Sha256::digest(url.as_bytes());
        Self(hex::encode(&digest[..8]))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The most recently fetched representation of a single URL.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ContentSnapshot {
    pub id: PageId,

    /// Unique key
    pub url: String,

    /// Market the URL belongs to
    pub market: String,

    #[serde(default)]
    pub title: String,

    #[serde(default)]
    pub description: String,

    pub word_count: u64,

    /// SHA-256 of the normalized page text
    #[serde(default)]
    pub content_hash: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,

    pub created_at: DateTime<Utc>,

    /// Set every time a fetch succeeds
    pub last_crawled_at: DateTime<Utc>,

    /// Sitemap `lastmod`, or fetch time when the sitemap declares none
    pub last_modified_at: DateTime<Utc>,
}

impl ContentSnapshot {
    /// Build the snapshot for a freshly fetched page.
    ///
    /// When `previous` is given, its identity, creation time and enrichment
    /// carry over; everything else comes from the fetch.
    pub fn from_fetch(
        market: &str,
        page: &FetchedPage,
        source_modified: Option<DateTime<Utc>>,
        previous: Option<&ContentSnapshot>,
        fetched_at: DateTime<Utc>,
    ) -> Self {
        let created_at = previous.map_or(fetched_at, |p| p.created_at.min(fetched_at));
        Self {
            id: PageId::from_url(&page.url),
            url: page.url.clone(),
            market: market.to_string(),
            title: page.title.clone(),
            description: page.description.clone(),
            word_count: page.word_count,
            content_hash: page.content_hash.clone(),
            summary: previous.and_then(|p| p.summary.clone()),
            category: previous.and_then(|p| p.category.clone()),
            created_at,
            last_crawled_at: fetched_at,
            last_modified_at: source_modified.unwrap_or(fetched_at),
        }
    }

    /// Apply enrichment output, keeping existing values where none was produced.
    pub fn apply_enrichment(&mut self, enrichment: &Enrichment) {
        if let Some(summary) = &enrichment.summary {
            self.summary = Some(summary.clone());
        }
        if let Some(category) = &enrichment.category {
            self.category = Some(category.clone());
        }
    }

    /// Whether the snapshot was last crawled before `cutoff`.
    pub fn is_stale(&self, cutoff: DateTime<Utc>) -> bool {
        self.last_crawled_at < cutoff
    }
}
