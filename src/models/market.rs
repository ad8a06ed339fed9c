// src/models/market.rs

//! Market definitions.

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::Result;

/// A regional market website tracked independently.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Market {
    /// Short market identifier (e.g., "us", "de")
    pub id: String,

    /// Human-readable display name
    #[serde(default)]
    pub name: String,

    /// Root URL of the market website
    pub base_url: String,

    /// Explicit sitemap location (defaults to `{base_url}/sitemap.xml`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sitemap_url: Option<String>,

    /// URL substrings excluded from reconciliation
    #[serde(default)]
    pub exclude_patterns: Vec<String>,
}

impl Market {
    pub fn new(id: impl Into<String>, base_url: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            base_url: base_url.into(),
            sitemap_url: None,
            exclude_patterns: Vec::new(),
        }
    }

    /// Resolve the sitemap URL for this market.
    pub fn sitemap_url(&self) -> Result<Url> {
        if let Some(explicit) = &self.sitemap_url {
            return Ok(Url::parse(explicit)?);
        }
        let base = Url::parse(&self.base_url)?;
        Ok(base.join("/sitemap.xml")?)
    }

    /// Whether a URL is excluded by this market's patterns.
    pub fn is_excluded(&self, url: &str) -> bool {
        self.exclude_patterns
            .iter()
            .any(|pattern| !pattern.is_empty() && url.contains(pattern.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_sitemap_url() {
        let market = Market::new("uk", "https://shop.example.co.uk/en-gb/");
        assert_eq!(
            market.sitemap_url().unwrap().as_str(),
            "https://shop.example.co.uk/sitemap.xml"
        );
    }

    #[test]
    fn test_explicit_sitemap_url() {
        let mut market = Market::new("de", "https://example.de");
        market.sitemap_url = Some("https://example.de/sitemaps/pages.xml".into());
        assert_eq!(
            market.sitemap_url().unwrap().as_str(),
            "https://example.de/sitemaps/pages.xml"
        );
    }

    #[test]
    fn test_exclude_patterns() {
        let mut market = Market::new("us", "https://example.com");
        market.exclude_patterns = vec!["/tag/".into(), "".into()];
        assert!(market.is_excluded("https://example.com/tag/sale"));
        assert!(!market.is_excluded("https://example.com/products"));
    }
}
