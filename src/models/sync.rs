//! Reconciliation options, results and status projections.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Options for a reconciliation run.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ReconcileOptions {
    /// Refetch every known URL regardless of staleness
    #[serde(default)]
    pub force_refresh: bool,

    /// Run enrichment hooks on new and changed pages
    #[serde(default)]
    pub enrich: bool,
}

/// Per-market outcome of a reconciliation run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconciliationResult {
    pub new_pages: usize,
    pub updated_pages: usize,

    /// Refresh candidates whose content turned out identical
    #[serde(default)]
    pub unchanged_pages: usize,

    /// Candidates left for a later run because of the per-run fetch cap
    #[serde(default)]
    pub deferred_pages: usize,

    /// One entry per market- or URL-level failure
    #[serde(default)]
    pub errors: Vec<String>,

    /// Whether the run stopped early on cancellation
    #[serde(default)]
    pub cancelled: bool,
}

impl ReconciliationResult {
    /// Result for a market whose sitemap could not be read.
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            errors: vec![error.into()],
            ..Self::default()
        }
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Number of pages that produced a change event.
    pub fn change_count(&self) -> usize {
        self.new_pages + self.updated_pages
    }
}

/// Read-only status projection for a market.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketStatus {
    pub market: String,
    pub total_snapshots: usize,
    pub last_crawled_at: Option<DateTime<Utc>>,
    /// Snapshots older than the staleness threshold
    pub pending_urls: usize,
}
