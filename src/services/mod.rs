//! Service layer for the sync application.
//!
//! External collaborators of the reconciler, each behind a trait:
//! - Sitemap reading (`SitemapSource`, `HttpSitemapReader`)
//! - Page fetching (`PageFetcher`, `HttpPageFetcher`)
//! - Enrichment (`Enricher`, `HeuristicEnricher`)

mod enrichment;
mod fetcher;
mod sitemap;

pub use enrichment::{Enricher, HeuristicEnricher};
pub use fetcher::{HttpPageFetcher, PageFetcher, extract_page};
pub use sitemap::{HttpSitemapReader, SitemapDocument, SitemapSource, parse_lastmod, parse_sitemap};
