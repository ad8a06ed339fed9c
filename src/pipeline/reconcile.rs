//! Sitemap-driven incremental content reconciliation.
//!
//! For one market: read the sitemap, classify every URL against the snapshot
//! store, fetch new and refresh-candidate URLs sequentially with a fixed
//! delay, then persist snapshots and change events.
//!
//! Error policy:
//! - sitemap failure: recorded in the market result, no propagation
//! - fetch or enrichment failure: recorded, the run moves to the next URL
//! - store failure: propagated to the caller

use std::collections::BTreeMap;

use chrono::Utc;
use futures::stream::{self, StreamExt};

use crate::error::Result;
use crate::models::{
    ChangeEvent, ContentSnapshot, FetchedPage, Market, ReconcileOptions, ReconciliationResult,
    SitemapEntry, SyncConfig,
};
use crate::pipeline::cancel::CancelFlag;
use crate::pipeline::diff::{RefreshPolicy, change_percent, content_changed, prepare_entries};
use crate::services::{Enricher, PageFetcher, SitemapSource};
use crate::storage::ContentStore;

/// Market-scoped reconciler. Holds no state between runs.
pub struct Reconciler<'a> {
    sitemaps: &'a dyn SitemapSource,
    fetcher: &'a dyn PageFetcher,
    store: &'a dyn ContentStore,
    enricher: Option<&'a dyn Enricher>,
    sync: SyncConfig,
}

impl<'a> Reconciler<'a> {
    pub fn new(
        sitemaps: &'a dyn SitemapSource,
        fetcher: &'a dyn PageFetcher,
        store: &'a dyn ContentStore,
        sync: &SyncConfig,
    ) -> Self {
        Self {
            sitemaps,
            fetcher,
            store,
            enricher: None,
            sync: sync.clone(),
        }
    }

    /// Attach the enrichment hook used when `ReconcileOptions::enrich` is set.
    pub fn with_enricher(mut self, enricher: &'a dyn Enricher) -> Self {
        self.enricher = Some(enricher);
        self
    }

    /// Reconcile a single market.
    pub async fn reconcile(
        &self,
        market: &Market,
        options: ReconcileOptions,
        cancel: &CancelFlag,
    ) -> Result<ReconciliationResult> {
        let mut result = ReconciliationResult::default();
        if cancel.is_cancelled() {
            result.cancelled = true;
            return Ok(result);
        }

        let entries = match self.sitemaps.fetch_entries(market).await {
            Ok(entries) => prepare_entries(market, entries),
            Err(e) => {
                log::warn!("[{}] Skipping market: {}", market.id, e);
                return Ok(ReconciliationResult::failed(e.to_string()));
            }
        };
        log::info!("[{}] {} sitemap entries", market.id, entries.len());

        let policy = RefreshPolicy {
            force_refresh: options.force_refresh,
            stale_before: self.sync.stale_cutoff(Utc::now()),
        };
        let delay = self.sync.request_delay();
        let mut fetches = 0usize;

        for entry in &entries {
            if cancel.is_cancelled() {
                result.cancelled = true;
                break;
            }

            let existing = self.store.find_snapshot(&entry.url).await?;
            let classification = policy.classify(entry, existing.as_ref());
            if !classification.needs_fetch() {
                continue;
            }
            if self
                .sync
                .max_fetches_per_run
                .is_some_and(|cap| fetches >= cap)
            {
                result.deferred_pages += 1;
                continue;
            }

            if fetches > 0 && !delay.is_zero() {
                tokio::time::sleep(delay).await;
                if cancel.is_cancelled() {
                    result.cancelled = true;
                    break;
                }
            }
            fetches += 1;

            log::debug!("[{}] {:?}: {}", market.id, classification, entry.url);
            self.sync_url(market, entry, existing, options, &mut result)
                .await?;
        }

        log::info!(
            "[{}] {} new, {} updated, {} unchanged, {} deferred, {} errors{}",
            market.id,
            result.new_pages,
            result.updated_pages,
            result.unchanged_pages,
            result.deferred_pages,
            result.errors.len(),
            if result.cancelled { " (cancelled)" } else { "" }
        );
        Ok(result)
    }

    /// Reconcile every given market.
    ///
    /// Markets run with bounded concurrency; each market stays sequential
    /// internally. The first store failure aborts the whole run.
    pub async fn reconcile_all(
        &self,
        markets: &[Market],
        options: ReconcileOptions,
        cancel: &CancelFlag,
    ) -> Result<BTreeMap<String, ReconciliationResult>> {
        let concurrency = self.sync.max_concurrent_markets.max(1);
        let mut results = BTreeMap::new();

        let mut runs = stream::iter(markets)
            .map(|market| async move {
                let outcome = self.reconcile(market, options, cancel).await;
                (market.id.clone(), outcome)
            })
            .buffer_unordered(concurrency);

        while let Some((market_id, outcome)) = runs.next().await {
            results.insert(market_id, outcome?);
        }
        Ok(results)
    }

    /// Fetch one URL and persist the outcome.
    async fn sync_url(
        &self,
        market: &Market,
        entry: &SitemapEntry,
        existing: Option<ContentSnapshot>,
        options: ReconcileOptions,
        result: &mut ReconciliationResult,
    ) -> Result<()> {
        let mut page = match self.fetcher.fetch(&entry.url).await {
            Ok(page) => page,
            Err(e) => {
                log::warn!("[{}] {}", market.id, e);
                result.errors.push(e.to_string());
                return Ok(());
            }
        };
        // Snapshots stay keyed by the sitemap URL even if the fetcher followed redirects.
        page.url = entry.url.clone();
        let fetched_at = Utc::now();

        match existing {
            None => {
                let snapshot = ContentSnapshot::from_fetch(
                    &market.id,
                    &page,
                    entry.last_modified,
                    None,
                    fetched_at,
                );
                self.record(&snapshot, ChangeEvent::created(&snapshot))
                    .await?;
                result.new_pages += 1;
            }
            Some(previous) if content_changed(&previous, &page) => {
                let pct = change_percent(previous.word_count, page.word_count);
                let snapshot = ContentSnapshot::from_fetch(
                    &market.id,
                    &page,
                    entry.last_modified,
                    Some(&previous),
                    fetched_at,
                );
                self.record(&snapshot, ChangeEvent::updated(&snapshot, pct))
                    .await?;
                result.updated_pages += 1;
            }
            Some(previous) => {
                self.store.mark_crawled(&previous.url, fetched_at).await?;
                result.unchanged_pages += 1;
                return Ok(());
            }
        }

        if options.enrich {
            self.enrich(market, &page, result).await?;
        }
        Ok(())
    }

    /// Persist a change: event first, then the snapshot.
    ///
    /// If the snapshot write fails the URL still looks new or changed on the
    /// next run, so a failure can duplicate an event but never lose one.
    async fn record(&self, snapshot: &ContentSnapshot, event: ChangeEvent) -> Result<()> {
        self.store.append_event(&event).await?;
        self.store.upsert_snapshot(snapshot).await
    }

    /// Run enrichment for a freshly written snapshot.
    async fn enrich(
        &self,
        market: &Market,
        page: &FetchedPage,
        result: &mut ReconciliationResult,
    ) -> Result<()> {
        let Some(enricher) = self.enricher else {
            log::debug!("[{}] No enricher configured, skipping {}", market.id, page.url);
            return Ok(());
        };

        match enricher.enrich(page).await {
            Ok(enrichment) if enrichment.is_empty() => Ok(()),
            Ok(enrichment) => self.store.save_enrichment(&page.url, &enrichment).await,
            Err(e) => {
                log::warn!("[{}] {}", market.id, e);
                result.errors.push(e.to_string());
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{HashMap, HashSet};
    use std::sync::Mutex;

    use async_trait::async_trait;
    use chrono::{DateTime, Duration};

    use crate::error::AppError;
    use crate::models::{ChangeKind, Enrichment, EnrichmentConfig};
    use crate::services::HeuristicEnricher;
    use crate::storage::MemoryStorage;

    /// Sitemaps keyed by market id; missing markets fail.
    #[derive(Default)]
    struct FakeSitemaps {
        markets: Mutex<HashMap<String, Vec<SitemapEntry>>>,
    }

    impl FakeSitemaps {
        fn set(&self, market: &str, urls: &[&str]) {
            let entries = urls.iter().map(|u| SitemapEntry::new(*u)).collect();
            self.markets
                .lock()
                .unwrap()
                .insert(market.to_string(), entries);
        }
    }

    #[async_trait]
    impl SitemapSource for FakeSitemaps {
        async fn fetch_entries(&self, market: &Market) -> Result<Vec<SitemapEntry>> {
            self.markets
                .lock()
                .unwrap()
                .get(&market.id)
                .cloned()
                .ok_or_else(|| AppError::sitemap(&market.id, "connection refused"))
        }
    }

    /// Pages keyed by URL; failing URLs return fetch errors.
    #[derive(Default)]
    struct FakeFetcher {
        pages: Mutex<HashMap<String, String>>,
        failing: Mutex<HashSet<String>>,
        calls: Mutex<Vec<String>>,
    }

    impl FakeFetcher {
        fn set(&self, url: &str, text: &str) {
            self.pages
                .lock()
                .unwrap()
                .insert(url.to_string(), text.to_string());
        }

        fn fail(&self, url: &str) {
            self.failing.lock().unwrap().insert(url.to_string());
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl PageFetcher for FakeFetcher {
        async fn fetch(&self, url: &str) -> Result<FetchedPage> {
            self.calls.lock().unwrap().push(url.to_string());
            if self.failing.lock().unwrap().contains(url) {
                return Err(AppError::fetch(url, "HTTP 503"));
            }
            let text = self
                .pages
                .lock()
                .unwrap()
                .get(url)
                .cloned()
                .ok_or_else(|| AppError::fetch(url, "HTTP 404"))?;
            Ok(FetchedPage::from_text(url, "Page", &text))
        }
    }

    struct FailingEnricher;

    #[async_trait]
    impl Enricher for FailingEnricher {
        async fn enrich(&self, page: &FetchedPage) -> Result<Enrichment> {
            Err(AppError::enrichment(&page.url, "model unavailable"))
        }
    }

    /// Store whose writes always fail.
    struct BrokenStore;

    #[async_trait]
    impl ContentStore for BrokenStore {
        async fn find_snapshot(&self, _url: &str) -> Result<Option<ContentSnapshot>> {
            Ok(None)
        }
        async fn upsert_snapshot(&self, _snapshot: &ContentSnapshot) -> Result<()> {
            Err(AppError::persistence("disk full"))
        }
        async fn mark_crawled(&self, _url: &str, _at: DateTime<Utc>) -> Result<()> {
            Err(AppError::persistence("disk full"))
        }
        async fn save_enrichment(&self, _url: &str, _e: &Enrichment) -> Result<()> {
            Err(AppError::persistence("disk full"))
        }
        async fn append_event(&self, _event: &ChangeEvent) -> Result<()> {
            Err(AppError::persistence("disk full"))
        }
        async fn list_snapshots(&self, _market: &str) -> Result<Vec<ContentSnapshot>> {
            Ok(Vec::new())
        }
        async fn list_events(&self, _market: Option<&str>) -> Result<Vec<ChangeEvent>> {
            Ok(Vec::new())
        }
    }

    /// Memory store whose next `append_event` fails once armed.
    #[derive(Default)]
    struct FlakyEventStore {
        inner: MemoryStorage,
        fail_next_append: Mutex<bool>,
    }

    impl FlakyEventStore {
        fn fail_next_append(&self) {
            *self.fail_next_append.lock().unwrap() = true;
        }
    }

    #[async_trait]
    impl ContentStore for FlakyEventStore {
        async fn find_snapshot(&self, url: &str) -> Result<Option<ContentSnapshot>> {
            self.inner.find_snapshot(url).await
        }
        async fn upsert_snapshot(&self, snapshot: &ContentSnapshot) -> Result<()> {
            self.inner.upsert_snapshot(snapshot).await
        }
        async fn mark_crawled(&self, url: &str, at: DateTime<Utc>) -> Result<()> {
            self.inner.mark_crawled(url, at).await
        }
        async fn save_enrichment(&self, url: &str, e: &Enrichment) -> Result<()> {
            self.inner.save_enrichment(url, e).await
        }
        async fn append_event(&self, event: &ChangeEvent) -> Result<()> {
            let fail = std::mem::take(&mut *self.fail_next_append.lock().unwrap());
            if fail {
                return Err(AppError::persistence("event log unavailable"));
            }
            self.inner.append_event(event).await
        }
        async fn list_snapshots(&self, market: &str) -> Result<Vec<ContentSnapshot>> {
            self.inner.list_snapshots(market).await
        }
        async fn list_events(&self, market: Option<&str>) -> Result<Vec<ChangeEvent>> {
            self.inner.list_events(market).await
        }
    }

    fn sync_config() -> SyncConfig {
        SyncConfig {
            request_delay_ms: 0,
            ..SyncConfig::default()
        }
    }

    fn market(id: &str) -> Market {
        Market::new(id, format!("https://{id}.example.com"))
    }

    fn words(n: usize) -> String {
        (0..n).map(|i| format!("w{i}")).collect::<Vec<_>>().join(" ")
    }

    const A: &str = "https://us.example.com/a";
    const B: &str = "https://us.example.com/b";
    const C: &str = "https://us.example.com/c";

    #[tokio::test]
    async fn test_new_page_creates_snapshot_and_event() {
        let sitemaps = FakeSitemaps::default();
        let fetcher = FakeFetcher::default();
        let store = MemoryStorage::new();
        sitemaps.set("us", &[A]);
        fetcher.set(A, &words(12));

        let reconciler = Reconciler::new(&sitemaps, &fetcher, &store, &sync_config());
        let result = reconciler
            .reconcile(&market("us"), ReconcileOptions::default(), &CancelFlag::new())
            .await
            .unwrap();

        assert_eq!(result.new_pages, 1);
        assert_eq!(result.updated_pages, 0);
        assert!(result.errors.is_empty());

        let snapshot = store.find_snapshot(A).await.unwrap().unwrap();
        assert_eq!(snapshot.word_count, 12);
        assert_eq!(snapshot.market, "us");

        let events = store.list_events(None).await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, ChangeKind::Created);
        assert_eq!(events[0].change_pct, 0);
        assert_eq!(events[0].page_id, snapshot.id);
    }

    #[tokio::test]
    async fn test_second_run_is_idempotent() {
        let sitemaps = FakeSitemaps::default();
        let fetcher = FakeFetcher::default();
        let store = MemoryStorage::new();
        sitemaps.set("us", &[A, B]);
        fetcher.set(A, &words(5));
        fetcher.set(B, &words(7));

        let reconciler = Reconciler::new(&sitemaps, &fetcher, &store, &sync_config());
        let cancel = CancelFlag::new();
        reconciler
            .reconcile(&market("us"), ReconcileOptions::default(), &cancel)
            .await
            .unwrap();
        let events_after_first = store.event_count().await;

        let second = reconciler
            .reconcile(&market("us"), ReconcileOptions::default(), &cancel)
            .await
            .unwrap();

        assert_eq!(second, ReconciliationResult::default());
        assert_eq!(store.event_count().await, events_after_first);
        assert_eq!(fetcher.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_forced_refresh_records_change_percent() {
        let sitemaps = FakeSitemaps::default();
        let fetcher = FakeFetcher::default();
        let store = MemoryStorage::new();
        sitemaps.set("us", &[A, B]);
        fetcher.set(A, &words(100));
        fetcher.set(B, &words(100));

        let reconciler = Reconciler::new(&sitemaps, &fetcher, &store, &sync_config());
        let cancel = CancelFlag::new();
        reconciler
            .reconcile(&market("us"), ReconcileOptions::default(), &cancel)
            .await
            .unwrap();

        fetcher.set(A, &words(150));
        fetcher.set(B, &words(80));
        let forced = ReconcileOptions {
            force_refresh: true,
            enrich: false,
        };
        let result = reconciler
            .reconcile(&market("us"), forced, &cancel)
            .await
            .unwrap();
        assert_eq!(result.updated_pages, 2);

        let events = store.list_events(Some("us")).await.unwrap();
        let updates: Vec<_> = events
            .iter()
            .filter(|e| e.event_type == ChangeKind::Updated)
            .map(|e| (e.url.as_str(), e.change_pct))
            .collect();
        assert_eq!(updates, vec![(A, 50), (B, -20)]);
        assert_eq!(store.find_snapshot(A).await.unwrap().unwrap().word_count, 150);
    }

    #[tokio::test]
    async fn test_zero_word_snapshot_gives_zero_percent() {
        let sitemaps = FakeSitemaps::default();
        let fetcher = FakeFetcher::default();
        let store = MemoryStorage::new();
        sitemaps.set("us", &[A]);
        fetcher.set(A, "");

        let reconciler = Reconciler::new(&sitemaps, &fetcher, &store, &sync_config());
        let cancel = CancelFlag::new();
        reconciler
            .reconcile(&market("us"), ReconcileOptions::default(), &cancel)
            .await
            .unwrap();
        assert_eq!(store.find_snapshot(A).await.unwrap().unwrap().word_count, 0);

        fetcher.set(A, &words(40));
        let forced = ReconcileOptions {
            force_refresh: true,
            ..Default::default()
        };
        let result = reconciler
            .reconcile(&market("us"), forced, &cancel)
            .await
            .unwrap();

        assert_eq!(result.updated_pages, 1);
        let events = store.list_events(None).await.unwrap();
        assert_eq!(events.last().unwrap().event_type, ChangeKind::Updated);
        assert_eq!(events.last().unwrap().change_pct, 0);
    }

    #[tokio::test]
    async fn test_unchanged_refetch_only_touches_crawl_time() {
        let sitemaps = FakeSitemaps::default();
        let fetcher = FakeFetcher::default();
        let store = MemoryStorage::new();
        sitemaps.set("us", &[A]);
        fetcher.set(A, &words(10));

        let reconciler = Reconciler::new(&sitemaps, &fetcher, &store, &sync_config());
        let cancel = CancelFlag::new();
        reconciler
            .reconcile(&market("us"), ReconcileOptions::default(), &cancel)
            .await
            .unwrap();
        let before = store.find_snapshot(A).await.unwrap().unwrap();

        let forced = ReconcileOptions {
            force_refresh: true,
            ..Default::default()
        };
        let result = reconciler
            .reconcile(&market("us"), forced, &cancel)
            .await
            .unwrap();

        assert_eq!(result.updated_pages, 0);
        assert_eq!(result.unchanged_pages, 1);
        assert_eq!(store.event_count().await, 1);

        let after = store.find_snapshot(A).await.unwrap().unwrap();
        assert!(after.last_crawled_at >= before.last_crawled_at);
        assert_eq!(after.last_modified_at, before.last_modified_at);
        assert_eq!(after.content_hash, before.content_hash);
    }

    #[tokio::test]
    async fn test_stale_snapshot_is_refetched() {
        let sitemaps = FakeSitemaps::default();
        let fetcher = FakeFetcher::default();
        let store = MemoryStorage::new();
        sitemaps.set("us", &[A]);
        fetcher.set(A, &words(10));

        let old = Utc::now() - Duration::days(3);
        let page = FetchedPage::from_text(A, "Page", &words(10));
        let snapshot = ContentSnapshot::from_fetch("us", &page, None, None, old);
        store.upsert_snapshot(&snapshot).await.unwrap();

        let reconciler = Reconciler::new(&sitemaps, &fetcher, &store, &sync_config());
        let result = reconciler
            .reconcile(&market("us"), ReconcileOptions::default(), &CancelFlag::new())
            .await
            .unwrap();

        assert_eq!(fetcher.calls(), vec![A.to_string()]);
        assert_eq!(result.unchanged_pages, 1);
        assert!(store.find_snapshot(A).await.unwrap().unwrap().last_crawled_at > old);
    }

    #[tokio::test]
    async fn test_fetch_failure_is_isolated() {
        let sitemaps = FakeSitemaps::default();
        let fetcher = FakeFetcher::default();
        let store = MemoryStorage::new();
        sitemaps.set("us", &[A, B, C]);
        fetcher.set(A, &words(3));
        fetcher.set(C, &words(4));
        fetcher.fail(B);

        let reconciler = Reconciler::new(&sitemaps, &fetcher, &store, &sync_config());
        let result = reconciler
            .reconcile(&market("us"), ReconcileOptions::default(), &CancelFlag::new())
            .await
            .unwrap();

        assert_eq!(result.new_pages, 2);
        assert_eq!(result.errors.len(), 1);
        assert!(result.errors[0].contains(B));
        assert!(store.find_snapshot(A).await.unwrap().is_some());
        assert!(store.find_snapshot(B).await.unwrap().is_none());
        assert!(store.find_snapshot(C).await.unwrap().is_some());

        let urls: Vec<_> = store
            .list_events(None)
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.url)
            .collect();
        assert_eq!(urls, vec![A.to_string(), C.to_string()]);
    }

    #[tokio::test]
    async fn test_market_isolation() {
        let sitemaps = FakeSitemaps::default();
        let fetcher = FakeFetcher::default();
        let store = MemoryStorage::new();
        sitemaps.set("m2", &["https://m2.example.com/home"]);
        fetcher.set("https://m2.example.com/home", &words(9));

        let reconciler = Reconciler::new(&sitemaps, &fetcher, &store, &sync_config());
        let results = reconciler
            .reconcile_all(
                &[market("m1"), market("m2")],
                ReconcileOptions::default(),
                &CancelFlag::new(),
            )
            .await
            .unwrap();

        assert_eq!(results.len(), 2);
        assert_eq!(results["m1"].errors.len(), 1);
        assert!(results["m1"].errors[0].contains("m1"));
        assert_eq!(results["m2"].new_pages, 1);
        assert!(results["m2"].errors.is_empty());
    }

    #[tokio::test]
    async fn test_reconcile_all_concurrent_markets() {
        let sitemaps = FakeSitemaps::default();
        let fetcher = FakeFetcher::default();
        let store = MemoryStorage::new();
        for id in ["m1", "m2", "m3"] {
            let url = format!("https://{id}.example.com/");
            sitemaps.set(id, &[url.as_str()]);
            fetcher.set(&url, &words(2));
        }

        let sync = SyncConfig {
            max_concurrent_markets: 3,
            ..sync_config()
        };
        let reconciler = Reconciler::new(&sitemaps, &fetcher, &store, &sync);
        let markets = [market("m1"), market("m2"), market("m3")];
        let results = reconciler
            .reconcile_all(&markets, ReconcileOptions::default(), &CancelFlag::new())
            .await
            .unwrap();

        assert!(results.values().all(|r| r.new_pages == 1));
        assert_eq!(store.event_count().await, 3);
    }

    #[tokio::test]
    async fn test_store_failure_propagates() {
        let sitemaps = FakeSitemaps::default();
        let fetcher = FakeFetcher::default();
        sitemaps.set("us", &[A]);
        fetcher.set(A, &words(3));

        let store = BrokenStore;
        let reconciler = Reconciler::new(&sitemaps, &fetcher, &store, &sync_config());
        let result = reconciler
            .reconcile(&market("us"), ReconcileOptions::default(), &CancelFlag::new())
            .await;

        assert!(matches!(result, Err(AppError::Persistence(_))));
    }

    #[tokio::test]
    async fn test_failed_created_event_is_written_on_retry() {
        let sitemaps = FakeSitemaps::default();
        let fetcher = FakeFetcher::default();
        let store = FlakyEventStore::default();
        sitemaps.set("us", &[A]);
        fetcher.set(A, &words(3));

        let reconciler = Reconciler::new(&sitemaps, &fetcher, &store, &sync_config());
        let cancel = CancelFlag::new();
        store.fail_next_append();
        let first = reconciler
            .reconcile(&market("us"), ReconcileOptions::default(), &cancel)
            .await;
        assert!(matches!(first, Err(AppError::Persistence(_))));

        let second = reconciler
            .reconcile(&market("us"), ReconcileOptions::default(), &cancel)
            .await
            .unwrap();
        assert_eq!(second.new_pages, 1);

        let events = store.list_events(None).await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, ChangeKind::Created);
        assert!(store.find_snapshot(A).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_failed_updated_event_is_written_on_retry() {
        let sitemaps = FakeSitemaps::default();
        let fetcher = FakeFetcher::default();
        let store = FlakyEventStore::default();
        sitemaps.set("us", &[A]);
        fetcher.set(A, &words(100));

        let reconciler = Reconciler::new(&sitemaps, &fetcher, &store, &sync_config());
        let cancel = CancelFlag::new();
        reconciler
            .reconcile(&market("us"), ReconcileOptions::default(), &cancel)
            .await
            .unwrap();

        fetcher.set(A, &words(150));
        let forced = ReconcileOptions {
            force_refresh: true,
            ..Default::default()
        };
        store.fail_next_append();
        assert!(reconciler.reconcile(&market("us"), forced, &cancel).await.is_err());
        assert_eq!(store.find_snapshot(A).await.unwrap().unwrap().word_count, 100);

        let retry = reconciler
            .reconcile(&market("us"), forced, &cancel)
            .await
            .unwrap();
        assert_eq!(retry.updated_pages, 1);

        let events = store.list_events(None).await.unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].event_type, ChangeKind::Updated);
        assert_eq!(events[1].change_pct, 50);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetches_are_spaced_by_request_delay() {
        let sitemaps = FakeSitemaps::default();
        let fetcher = FakeFetcher::default();
        let store = MemoryStorage::new();
        sitemaps.set("us", &[A, B, C]);
        for url in [A, B, C] {
            fetcher.set(url, &words(3));
        }

        let sync = SyncConfig {
            request_delay_ms: 3000,
            ..SyncConfig::default()
        };
        let reconciler = Reconciler::new(&sitemaps, &fetcher, &store, &sync);
        let start = tokio::time::Instant::now();
        let result = reconciler
            .reconcile(&market("us"), ReconcileOptions::default(), &CancelFlag::new())
            .await
            .unwrap();

        assert_eq!(result.new_pages, 3);
        assert_eq!(fetcher.calls(), vec![A.to_string(), B.to_string(), C.to_string()]);
        let elapsed = start.elapsed();
        assert!(elapsed >= std::time::Duration::from_millis(6000));
        assert!(elapsed < std::time::Duration::from_millis(9000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_delay_stops_before_next_fetch() {
        let sitemaps = FakeSitemaps::default();
        let fetcher = FakeFetcher::default();
        let store = MemoryStorage::new();
        sitemaps.set("us", &[A, B, C]);
        for url in [A, B, C] {
            fetcher.set(url, &words(3));
        }

        let sync = SyncConfig {
            request_delay_ms: 3000,
            ..SyncConfig::default()
        };
        let reconciler = Reconciler::new(&sitemaps, &fetcher, &store, &sync);
        let cancel = CancelFlag::new();
        cancel.cancel_after(std::time::Duration::from_millis(1500));
        let result = reconciler
            .reconcile(&market("us"), ReconcileOptions::default(), &cancel)
            .await
            .unwrap();

        assert!(result.cancelled);
        assert_eq!(result.new_pages, 1);
        assert_eq!(fetcher.calls(), vec![A.to_string()]);
        assert!(store.find_snapshot(B).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_cancelled_run_keeps_committed_work() {
        let sitemaps = FakeSitemaps::default();
        let fetcher = FakeFetcher::default();
        let store = MemoryStorage::new();
        sitemaps.set("us", &[A, B]);
        fetcher.set(A, &words(3));
        fetcher.set(B, &words(3));

        let cancel = CancelFlag::new();
        cancel.cancel();
        let reconciler = Reconciler::new(&sitemaps, &fetcher, &store, &sync_config());
        let result = reconciler
            .reconcile(&market("us"), ReconcileOptions::default(), &cancel)
            .await
            .unwrap();

        assert!(result.cancelled);
        assert_eq!(result.new_pages, 0);
        assert!(fetcher.calls().is_empty());
    }

    #[tokio::test]
    async fn test_fetch_cap_defers_remaining_candidates() {
        let sitemaps = FakeSitemaps::default();
        let fetcher = FakeFetcher::default();
        let store = MemoryStorage::new();
        sitemaps.set("us", &[A, B, C]);
        for url in [A, B, C] {
            fetcher.set(url, &words(3));
        }

        let sync = SyncConfig {
            max_fetches_per_run: Some(2),
            ..sync_config()
        };
        let reconciler = Reconciler::new(&sitemaps, &fetcher, &store, &sync);
        let cancel = CancelFlag::new();
        let first = reconciler
            .reconcile(&market("us"), ReconcileOptions::default(), &cancel)
            .await
            .unwrap();
        assert_eq!(first.new_pages, 2);
        assert_eq!(first.deferred_pages, 1);

        let second = reconciler
            .reconcile(&market("us"), ReconcileOptions::default(), &cancel)
            .await
            .unwrap();
        assert_eq!(second.new_pages, 1);
        assert_eq!(second.deferred_pages, 0);
    }

    #[tokio::test]
    async fn test_enrichment_is_stored() {
        let sitemaps = FakeSitemaps::default();
        let fetcher = FakeFetcher::default();
        let store = MemoryStorage::new();
        sitemaps.set("us", &[A]);
        fetcher.set(A, "Compare our pricing plans. Every plan includes support.");

        let enricher = HeuristicEnricher::from_config(&EnrichmentConfig::default()).unwrap();
        let reconciler =
            Reconciler::new(&sitemaps, &fetcher, &store, &sync_config()).with_enricher(&enricher);
        let options = ReconcileOptions {
            enrich: true,
            ..Default::default()
        };
        reconciler
            .reconcile(&market("us"), options, &CancelFlag::new())
            .await
            .unwrap();

        let snapshot = store.find_snapshot(A).await.unwrap().unwrap();
        assert_eq!(snapshot.category.as_deref(), Some("pricing"));
        assert!(snapshot.summary.is_some());
    }

    #[tokio::test]
    async fn test_enrichment_failure_keeps_snapshot() {
        let sitemaps = FakeSitemaps::default();
        let fetcher = FakeFetcher::default();
        let store = MemoryStorage::new();
        sitemaps.set("us", &[A]);
        fetcher.set(A, &words(6));

        let enricher = FailingEnricher;
        let reconciler =
            Reconciler::new(&sitemaps, &fetcher, &store, &sync_config()).with_enricher(&enricher);
        let options = ReconcileOptions {
            enrich: true,
            ..Default::default()
        };
        let result = reconciler
            .reconcile(&market("us"), options, &CancelFlag::new())
            .await
            .unwrap();

        assert_eq!(result.new_pages, 1);
        assert_eq!(result.errors.len(), 1);
        assert!(result.errors[0].contains("model unavailable"));
        let snapshot = store.find_snapshot(A).await.unwrap().unwrap();
        assert!(snapshot.summary.is_none());
        assert_eq!(store.event_count().await, 1);
    }
}
