//! Sync pipeline: wires the HTTP services to a store and reports runs.

use std::collections::BTreeMap;

use chrono::Utc;

use crate::error::Result;
use crate::models::{Config, Market, ReconcileOptions, ReconciliationResult};
use crate::pipeline::cancel::CancelFlag;
use crate::pipeline::reconcile::Reconciler;
use crate::services::{HeuristicEnricher, HttpPageFetcher, HttpSitemapReader};
use crate::storage::ContentStore;
use crate::utils::console;

/// Production collaborators built from configuration.
pub struct SyncServices {
    sitemaps: HttpSitemapReader,
    fetcher: HttpPageFetcher,
    enricher: HeuristicEnricher,
    config: Config,
}

impl SyncServices {
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self {
            sitemaps: HttpSitemapReader::from_config(&config.http)?,
            fetcher: HttpPageFetcher::from_config(&config.http)?,
            enricher: HeuristicEnricher::from_config(&config.enrichment)?,
            config: config.clone(),
        })
    }

    /// Reconciler bound to `store`.
    pub fn reconciler<'a>(&'a self, store: &'a dyn ContentStore) -> Reconciler<'a> {
        Reconciler::new(&self.sitemaps, &self.fetcher, store, &self.config.sync)
            .with_enricher(&self.enricher)
    }
}

/// Reconcile the given markets and print a per-market report.
pub async fn run_sync(
    config: &Config,
    store: &dyn ContentStore,
    markets: &[Market],
    options: ReconcileOptions,
    cancel: &CancelFlag,
) -> Result<BTreeMap<String, ReconciliationResult>> {
    let start_time = Utc::now();
    console::header("Starting content sync");
    console::info(&format!(
        "{} market(s), force_refresh={}, enrich={}",
        markets.len(),
        options.force_refresh,
        options.enrich
    ));

    let services = SyncServices::from_config(config)?;
    let results = services
        .reconciler(store)
        .reconcile_all(markets, options, cancel)
        .await?;

    for (market, result) in &results {
        report_market(market, result);
    }

    let totals = Totals::from_results(results.values());
    let elapsed = Utc::now() - start_time;
    console::summary(
        "Sync complete",
        &[
            ("Markets", results.len().to_string()),
            ("New", totals.new_pages.to_string()),
            ("Updated", totals.updated_pages.to_string()),
            ("Unchanged", totals.unchanged_pages.to_string()),
            ("Deferred", totals.deferred_pages.to_string()),
            ("Errors", totals.errors.to_string()),
            ("Elapsed", format!("{}s", elapsed.num_seconds())),
        ],
    );

    Ok(results)
}

fn report_market(market: &str, result: &ReconciliationResult) {
    let line = format!(
        "[{}] {} new, {} updated, {} unchanged",
        market, result.new_pages, result.updated_pages, result.unchanged_pages
    );
    if result.has_errors() || result.cancelled {
        console::warn(&line);
    } else {
        console::success(&line);
    }

    if result.deferred_pages > 0 {
        console::sub_item(&format!("{} deferred to next run", result.deferred_pages));
    }
    if result.cancelled {
        console::sub_item("Cancelled before completion");
    }
    for error in &result.errors {
        console::sub_item(error);
    }
}

/// Counters summed across markets.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Totals {
    pub new_pages: usize,
    pub updated_pages: usize,
    pub unchanged_pages: usize,
    pub deferred_pages: usize,
    pub errors: usize,
}

impl Totals {
    pub fn from_results<'a>(results: impl IntoIterator<Item = &'a ReconciliationResult>) -> Self {
        results.into_iter().fold(Self::default(), |mut acc, r| {
            acc.new_pages += r.new_pages;
            acc.updated_pages += r.updated_pages;
            acc.unchanged_pages += r.unchanged_pages;
            acc.deferred_pages += r.deferred_pages;
            acc.errors += r.errors.len();
            acc
        })
    }
}
