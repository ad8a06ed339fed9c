//! Utility functions and helpers.

pub mod console;
pub mod http;

use scraper::Selector;
use url::Url;

use crate::error::{AppError, Result};

/// Resolve a potentially relative URL against a base URL.
pub fn resolve_url(base: &Url, href: &str) -> String {
    base.join(href)
        .map(|u| u.to_string())
        .unwrap_or_else(|_| href.to_string())
}

/// Parse a CSS selector, mapping failures to `AppError::Selector`.
pub fn parse_selector(s: &str) -> Result<Selector> {
    Selector::parse(s).map_err(|e| AppError::selector(s, format!("{e:?}")))
}
