// src/error.rs

//! Unified error handling for the sync application.

use std::fmt;

use thiserror::Error;

/// Result type alias for sync operations.
pub type Result<T> = std::result::Result<T, AppError>;

/// Unified application error type.
#[derive(Error, Debug)]
pub enum AppError {
    /// AWS S3 error
    #[error("S3 error: {0}")]
    S3(String),

    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP request failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing failed
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// TOML serialization failed
    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    /// URL parsing failed
    #[error("URL parse error: {0}")]
    Url(#[from] url::ParseError),

    /// CSS selector parsing failed
    #[error("Invalid selector '{selector}': {message}")]
    Selector { selector: String, message: String },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Data validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// Sitemap could not be fetched or parsed (market-level, skippable)
    #[error("Sitemap error for market {market}: {message}")]
    SitemapFetch { market: String, message: String },

    /// Page could not be fetched (URL-level, skippable)
    #[error("Fetch error for {url}: {message}")]
    Fetch { url: String, message: String },

    /// Enrichment hook failed (URL-level, best-effort)
    #[error("Enrichment error for {url}: {message}")]
    Enrichment { url: String, message: String },

    /// Snapshot or event store failure
    #[error("Persistence error: {0}")]
    Persistence(String),
}

impl AppError {
    /// Create a selector parsing error.
    pub fn selector(selector: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Selector {
            selector: selector.into(),
            message: message.to_string(),
        }
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Create a sitemap error for a market.
    pub fn sitemap(market: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::SitemapFetch {
            market: market.into(),
            message: message.to_string(),
        }
    }

    /// Create a page fetch error.
    pub fn fetch(url: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Fetch {
            url: url.into(),
            message: message.to_string(),
        }
    }

    /// Create an enrichment error.
    pub fn enrichment(url: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Enrichment {
            url: url.into(),
            message: message.to_string(),
        }
    }

    /// Create a persistence error.
    pub fn persistence(message: impl fmt::Display) -> Self {
        Self::Persistence(message.to_string())
    }
}
