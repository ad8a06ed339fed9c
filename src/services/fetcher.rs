//! Page fetcher service.
//!
//! Retrieves a page and extracts title, description and visible text.

use async_trait::async_trait;
use reqwest::Client;
use scraper::{ElementRef, Html};

use crate::error::{AppError, Result};
use crate::models::{FetchedPage, HttpConfig, normalize_whitespace};
use crate::utils::http::{create_async_client, fetch_text};
use crate::utils::parse_selector;

/// Elements whose text is never visible.
const HIDDEN_ELEMENTS: [&str; 4] = ["script", "style", "noscript", "template"];

/// Retrieves page content for a URL.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Fetch a page, failing with `AppError::Fetch`.
    async fn fetch(&self, url: &str) -> Result<FetchedPage>;
}

/// Fetcher that downloads pages directly over HTTP.
pub struct HttpPageFetcher {
    client: Client,
}

impl HttpPageFetcher {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Create a fetcher with a client built from HTTP settings.
    pub fn from_config(config: &HttpConfig) -> Result<Self> {
        Ok(Self::new(create_async_client(config)?))
    }
}

#[async_trait]
impl PageFetcher for HttpPageFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedPage> {
        let html = fetch_text(&self.client, url)
            .await
            .map_err(|e| AppError::fetch(url, e))?;
        extract_page(url, &html).map_err(|e| AppError::fetch(url, e))
    }
}

/// Extract page fields from an HTML document.
pub fn extract_page(url: &str, html: &str) -> Result<FetchedPage> {
    let document = Html::parse_document(html);

    let title_sel = parse_selector("title")?;
    let og_title_sel = parse_selector(r#"meta[property="og:title"]"#)?;
    let description_sel = parse_selector(r#"meta[name="description"]"#)?;
    let og_description_sel = parse_selector(r#"meta[property="og:description"]"#)?;
    let body_sel = parse_selector("body")?;

    let title = document
        .select(&title_sel)
        .next()
        .map(|e| normalize_whitespace(&e.text().collect::<String>()))
        .filter(|t| !t.is_empty())
        .or_else(|| meta_content(&document, &og_title_sel))
        .unwrap_or_default();

    let description = meta_content(&document, &description_sel)
        .or_else(|| meta_content(&document, &og_description_sel))
        .unwrap_or_default();

    let text = document
        .select(&body_sel)
        .next()
        .map(visible_text)
        .unwrap_or_default();

    Ok(FetchedPage::from_text(url, title, &text).with_description(description))
}

fn meta_content(document: &Html, selector: &scraper::Selector) -> Option<String> {
    document
        .select(selector)
        .filter_map(|e| e.value().attr("content"))
        .map(normalize_whitespace)
        .find(|c| !c.is_empty())
}

/// Collect text nodes that are not inside hidden elements.
fn visible_text(root: ElementRef<'_>) -> String {
    let mut parts = Vec::new();
    for node in root.descendants() {
        let Some(text) = node.value().as_text() else {
            continue;
        };
        let hidden = node.ancestors().any(|ancestor| {
            ancestor
                .value()
                .as_element()
                .is_some_and(|e| HIDDEN_ELEMENTS.contains(&e.name()))
        });
        if !hidden {
            parts.push(&**text);
        }
    }
    parts.join(" ")
}
