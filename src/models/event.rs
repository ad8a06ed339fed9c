//! Change event data structures.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{ContentSnapshot, PageId};

/// Kind of change recorded for a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Created,
    Updated,
}

impl ChangeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeKind::Created => "created",
            ChangeKind::Updated => "updated",
        }
    }
}

/// Immutable audit record of a detected creation or modification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub page_id: PageId,
    pub url: String,
    pub market: String,
    pub event_type: ChangeKind,
    /// Relative word-count delta in percent, 0 for creation
    pub change_pct: i64,
    pub occurred_at: DateTime<Utc>,
}

impl ChangeEvent {
    pub fn created(snapshot: &ContentSnapshot) -> Self {
        Self::for_snapshot(snapshot, ChangeKind::Created, 0)
    }

    pub fn updated(snapshot: &ContentSnapshot, change_pct: i64) -> Self {
        Self::for_snapshot(snapshot, ChangeKind::Updated, change_pct)
    }

    fn for_snapshot(snapshot: &ContentSnapshot, kind: ChangeKind, change_pct: i64) -> Self {
        Self {
            page_id: snapshot.id.clone(),
            url: snapshot.url.clone(),
            market: snapshot.market.clone(),
            event_type: kind,
            change_pct,
            occurred_at: snapshot.last_crawled_at,
        }
    }

    /// Format event for display using a template.
    ///
    /// Supported placeholders: `{market}`, `{type}`, `{pct}`, `{url}`, `{time}`
    pub fn format(&self, template: &str) -> String {
        template
            .replace("{market}", &self.market)
            .replace("{type}", self.event_type.as_str())
            .replace("{pct}", &format!("{:+}", self.change_pct))
            .replace("{url}", &self.url)
            .replace("{time}", &self.occurred_at.format("%Y-%m-%d %H:%M").to_string())
    }
}
