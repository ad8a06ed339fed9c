//! Transient page data produced by the sitemap reader, fetcher and enrichment hooks.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use unicode_segmentation::UnicodeSegmentation;

/// A URL listed in a market's sitemap.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SitemapEntry {
    pub url: String,

    /// Source-declared `<lastmod>`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<DateTime<Utc>>,
}

impl SitemapEntry {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            last_modified: None,
        }
    }

    pub fn modified_at(mut self, at: DateTime<Utc>) -> Self {
        self.last_modified = Some(at);
        self
    }
}

/// Content returned by a fetcher for a single URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedPage {
    pub url: String,
    pub title: String,
    pub description: String,
    /// Visible text with whitespace collapsed
    pub text: String,
    pub word_count: u64,
    pub content_hash: String,
}

impl FetchedPage {
    /// Build a page from raw text, deriving word count and content hash.
    pub fn from_text(url: impl Into<String>, title: impl Into<String>, text: &str) -> Self {
        let text = normalize_whitespace(text);
        Self {
            url: url.into(),
            title: title.into(),
            description: String::new(),
            word_count: count_words(&text),
            content_hash: content_hash(&text),
            text,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

/// Output of the enrichment hooks.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Enrichment {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

impl Enrichment {
    pub fn is_empty(&self) -> bool {
        self.summary.is_none() && self.category.is_none()
    }
}

/// Collapse runs of whitespace into single spaces.
pub fn normalize_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Count words using Unicode word boundaries.
pub fn count_words(text: &str) -> u64 {
    text.unicode_words().count() as u64
}

/// Hex SHA-256 of the text.
pub fn content_hash(text: &str) -> String {
    hex::encode(Sha256::digest(text.as_bytes()))
}
