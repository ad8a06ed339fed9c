//! Application configuration structures.

use std::fs;
use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::models::Market;

/// Root application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// HTTP client settings
    #[serde(default)]
    pub http: HttpConfig,

    /// Reconciliation behavior
    #[serde(default)]
    pub sync: SyncConfig,

    /// Enrichment hook settings
    #[serde(default)]
    pub enrichment: EnrichmentConfig,

    /// Market definitions
    #[serde(default)]
    pub markets: Vec<Market>,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Load configuration or return default if loading fails.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        Self::load(&path).unwrap_or_else(|e| {
            log::warn!(
                "Config load failed from {:?}: {}. Using defaults.",
                path.as_ref(),
                e
            );
            Self::default()
        })
    }

    /// Override values from the process environment.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Override values from a key lookup; unparseable values are ignored.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        fn parsed<T: std::str::FromStr>(
            lookup: &impl Fn(&str) -> Option<String>,
            key: &str,
        ) -> Option<T> {
            lookup(key).and_then(|v| v.trim().parse().ok())
        }

        if let Some(ms) = parsed::<u64>(&lookup, "SYNC_REQUEST_DELAY_MS") {
            self.sync.request_delay_ms = ms;
        }
        if let Some(mins) = parsed::<u64>(&lookup, "SYNC_STALE_AFTER_MINS") {
            self.sync.stale_after_mins = mins;
        }
        if let Some(n) = parsed::<usize>(&lookup, "SYNC_MAX_CONCURRENT_MARKETS") {
            self.sync.max_concurrent_markets = n;
        }
        if let Some(secs) = parsed::<u64>(&lookup, "HTTP_TIMEOUT_SECS") {
            self.http.timeout_secs = secs;
        }
    }

    /// Find a configured market by id.
    pub fn market(&self, id: &str) -> Option<&Market> {
        self.markets.iter().find(|m| m.id == id)
    }

    /// Validate configuration values for basic sanity.
    pub fn validate(&self) -> Result<()> {
        if self.http.user_agent.trim().is_empty() {
            return Err(AppError::validation("http.user_agent is empty"));
        }
        if self.http.timeout_secs == 0 {
            return Err(AppError::validation("http.timeout_secs must be > 0"));
        }
        if self.http.sitemap_timeout_secs == 0 {
            return Err(AppError::validation(
                "http.sitemap_timeout_secs must be > 0",
            ));
        }
        if self.sync.max_concurrent_markets == 0 {
            return Err(AppError::validation(
                "sync.max_concurrent_markets must be > 0",
            ));
        }
        if self.sync.max_fetches_per_run == Some(0) {
            return Err(AppError::validation(
                "sync.max_fetches_per_run must be > 0 when set",
            ));
        }
        if self.markets.is_empty() {
            return Err(AppError::validation("No markets defined"));
        }

        let mut seen = std::collections::HashSet::new();
        for market in &self.markets {
            if market.id.trim().is_empty() {
                return Err(AppError::validation("Market with empty id"));
            }
            if !seen.insert(market.id.as_str()) {
                return Err(AppError::validation(format!(
                    "Duplicate market id '{}'",
                    market.id
                )));
            }
            market.sitemap_url().map_err(|e| {
                AppError::validation(format!("Market '{}' has invalid URL: {e}", market.id))
            })?;
        }

        self.enrichment.compile_rules()?;
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            http: HttpConfig::default(),
            sync: SyncConfig::default(),
            enrichment: EnrichmentConfig::default(),
            markets: defaults::default_markets(),
        }
    }
}

/// HTTP client settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// User-Agent header for HTTP requests
    #[serde(default = "defaults::user_agent")]
    pub user_agent: String,

    /// Page request timeout in seconds
    #[serde(default = "defaults::timeout")]
    pub timeout_secs: u64,

    /// Timeout for sitemap requests
    #[serde(default = "defaults::sitemap_timeout")]
    pub sitemap_timeout_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            user_agent: defaults::user_agent(),
            timeout_secs: defaults::timeout(),
            sitemap_timeout_secs: defaults::sitemap_timeout(),
        }
    }
}

/// Reconciliation behavior settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Delay between consecutive page fetches within a market
    #[serde(default = "defaults::request_delay")]
    pub request_delay_ms: u64,

    /// Snapshots crawled longer ago than this are refetched
    #[serde(default = "defaults::stale_after")]
    pub stale_after_mins: u64,

    /// Markets reconciled at the same time by `reconcile_all`
    #[serde(default = "defaults::max_concurrent_markets")]
    pub max_concurrent_markets: usize,

    /// Cap on fetches per market run
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_fetches_per_run: Option<usize>,
}

impl SyncConfig {
    pub fn request_delay(&self) -> Duration {
        Duration::from_millis(self.request_delay_ms)
    }

    /// Crawl time before which a snapshot counts as stale.
    pub fn stale_cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let mins = i64::try_from(self.stale_after_mins).unwrap_or(i64::MAX);
        chrono::Duration::try_minutes(mins)
            .and_then(|d| now.checked_sub_signed(d))
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            request_delay_ms: defaults::request_delay(),
            stale_after_mins: defaults::stale_after(),
            max_concurrent_markets: defaults::max_concurrent_markets(),
            max_fetches_per_run: None,
        }
    }
}

/// Enrichment hook settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichmentConfig {
    /// Word budget of the extractive summary
    #[serde(default = "defaults::summary_words")]
    pub summary_words: usize,

    /// Category rules, first match wins
    #[serde(default = "defaults::categories")]
    pub categories: Vec<CategoryRule>,
}

impl EnrichmentConfig {
    /// Compile category patterns (case-insensitive).
    pub fn compile_rules(&self) -> Result<Vec<(String, Regex)>> {
        self.categories
            .iter()
            .map(|rule| {
                Regex::new(&format!("(?i){}", rule.pattern))
                    .map(|re| (rule.label.clone(), re))
                    .map_err(|e| {
                        AppError::validation(format!(
                            "Invalid pattern for category '{}': {e}",
                            rule.label
                        ))
                    })
            })
            .collect()
    }
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            summary_words: defaults::summary_words(),
            categories: defaults::categories(),
        }
    }
}

/// Mapping from a text pattern to a category label.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryRule {
    pub label: String,
    pub pattern: String,
}

mod defaults {
    use super::CategoryRule;
    use crate::models::Market;

    // HTTP defaults
    pub fn user_agent() -> String {
        "Mozilla/5.0 (compatible; sitesync/1.0)".into()
    }
    pub fn timeout() -> u64 {
        30
    }
    pub fn sitemap_timeout() -> u64 {
        15
    }

    // Sync defaults
    pub fn request_delay() -> u64 {
        3000
    }
    pub fn stale_after() -> u64 {
        24 * 60
    }
    pub fn max_concurrent_markets() -> usize {
        1
    }

    // Enrichment defaults
    pub fn summary_words() -> usize {
        40
    }
    pub fn categories() -> Vec<CategoryRule> {
        [
            ("pricing", r"\b(pricing|price|plans?|subscription)\b"),
            ("product", r"\b(features?|products?|integrations?)\b"),
            ("support", r"\b(help|support|faq|documentation)\b"),
            ("company", r"\b(about us|careers|press|team)\b"),
            ("blog", r"\b(blog|article|posted on)\b"),
        ]
        .into_iter()
        .map(|(label, pattern)| CategoryRule {
            label: label.to_string(),
            pattern: pattern.to_string(),
        })
        .collect()
    }

    // Market defaults
    pub fn default_markets() -> Vec<Market> {
        vec![
            Market {
                id: "us".to_string(),
                name: "United States".to_string(),
                base_url: "https://www.example.com".to_string(),
                sitemap_url: None,
                exclude_patterns: Vec::new(),
            },
            Market {
                id: "uk".to_string(),
                name: "United Kingdom".to_string(),
                base_url: "https://www.example.co.uk".to_string(),
                sitemap_url: None,
                exclude_patterns: Vec::new(),
            },
            Market {
                id: "de".to_string(),
                name: "Deutschland".to_string(),
                base_url: "https://www.example.de".to_string(),
                sitemap_url: None,
                exclude_patterns: Vec::new(),
            },
        ]
    }
}
