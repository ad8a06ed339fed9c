//! Remote sitemap reader.
//!
//! Fetches a market's XML sitemap and extracts `<loc>`/`<lastmod>` pairs.
//! Sitemap index documents are followed one level deep.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use reqwest::Client;
use scraper::Html;
use url::Url;

use crate::error::{AppError, Result};
use crate::models::{HttpConfig, Market, SitemapEntry};
use crate::utils::http::{create_sitemap_client, fetch_text};
use crate::utils::{parse_selector, resolve_url};

/// Source of sitemap entries for a market.
///
/// Every call yields a fresh, complete sequence; nothing is resumed.
#[async_trait]
pub trait SitemapSource: Send + Sync {
    /// Fetch all entries for a market, failing with `AppError::SitemapFetch`.
    async fn fetch_entries(&self, market: &Market) -> Result<Vec<SitemapEntry>>;
}

/// Parsed sitemap document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SitemapDocument {
    /// `<urlset>`: page entries
    UrlSet(Vec<SitemapEntry>),
    /// `<sitemapindex>`: locations of child sitemaps
    Index(Vec<String>),
}

/// Sitemap reader over HTTP.
pub struct HttpSitemapReader {
    client: Client,
}

impl HttpSitemapReader {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Create a reader with a client built from HTTP settings.
    pub fn from_config(config: &HttpConfig) -> Result<Self> {
        Ok(Self::new(create_sitemap_client(config)?))
    }

    async fn fetch_document(&self, market: &Market, url: &Url) -> Result<SitemapDocument> {
        log::debug!("[{}] Fetching sitemap {}", market.id, url);
        let body = fetch_text(&self.client, url.as_str())
            .await
            .map_err(|e| AppError::sitemap(&market.id, format!("{url}: {e}")))?;
        parse_sitemap(&body, url).map_err(|e| AppError::sitemap(&market.id, format!("{url}: {e}")))
    }
}

#[async_trait]
impl SitemapSource for HttpSitemapReader {
    async fn fetch_entries(&self, market: &Market) -> Result<Vec<SitemapEntry>> {
        let root = market
            .sitemap_url()
            .map_err(|e| AppError::sitemap(&market.id, e))?;

        match self.fetch_document(market, &root).await? {
            SitemapDocument::UrlSet(entries) => Ok(entries),
            SitemapDocument::Index(children) => {
                log::info!(
                    "[{}] Sitemap index lists {} child sitemaps",
                    market.id,
                    children.len()
                );
                let mut entries = Vec::new();
                for child in children {
                    let child_url = Url::parse(&child)
                        .map_err(|e| AppError::sitemap(&market.id, format!("{child}: {e}")))?;
                    match self.fetch_document(market, &child_url).await? {
                        SitemapDocument::UrlSet(found) => entries.extend(found),
                        SitemapDocument::Index(_) => log::warn!(
                            "[{}] Nested sitemap index {} skipped",
                            market.id,
                            child_url
                        ),
                    }
                }
                Ok(entries)
            }
        }
    }
}

/// Parse a sitemap or sitemap index document.
///
/// Relative `<loc>` values resolve against `base`.
pub fn parse_sitemap(xml: &str, base: &Url) -> Result<SitemapDocument> {
    // The HTML parser drops CDATA sections, so unwrap them first.
    let cleaned = xml.replace("<![CDATA[", "").replace("]]>", "");
    let document = Html::parse_document(&cleaned);

    let urlset_sel = parse_selector("urlset")?;
    let index_sel = parse_selector("sitemapindex")?;

    if document.select(&urlset_sel).next().is_some() {
        let url_sel = parse_selector("urlset > url")?;
        let loc_sel = parse_selector("loc")?;
        let lastmod_sel = parse_selector("lastmod")?;

        let entries = document
            .select(&url_sel)
            .filter_map(|url_elem| {
                let loc = element_text(url_elem.select(&loc_sel).next()?);
                if loc.is_empty() {
                    return None;
                }
                let last_modified = url_elem
                    .select(&lastmod_sel)
                    .next()
                    .and_then(|e| parse_lastmod(&element_text(e)));
                Some(SitemapEntry {
                    url: resolve_url(base, &loc),
                    last_modified,
                })
            })
            .collect();
        return Ok(SitemapDocument::UrlSet(entries));
    }

    if document.select(&index_sel).next().is_some() {
        let loc_sel = parse_selector("sitemapindex > sitemap > loc")?;
        let children = document
            .select(&loc_sel)
            .map(element_text)
            .filter(|loc| !loc.is_empty())
            .map(|loc| resolve_url(base, &loc))
            .collect();
        return Ok(SitemapDocument::Index(children));
    }

    Err(AppError::validation(
        "document has neither <urlset> nor <sitemapindex>",
    ))
}

fn element_text(elem: scraper::ElementRef<'_>) -> String {
    elem.text().collect::<String>().trim().to_string()
}

/// Parse a W3C datetime `<lastmod>` value.
///
/// Accepts RFC 3339, minute-precision timestamps with offset, naive
/// timestamps (taken as UTC) and plain dates (midnight UTC).
pub fn parse_lastmod(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_str(value, "%Y-%m-%dT%H:%M%:z") {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S") {
        return Some(naive.and_utc());
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}
