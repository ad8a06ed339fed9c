//! Local filesystem storage implementation.
//!
//! Snapshots live in a single `snapshots.json` keyed by URL and rewritten
//! atomically (temp file + rename). Change events are appended to
//! `events.jsonl`, one JSON object per line, and never rewritten.
//!
//! Read-modify-write cycles are serialized per process by a mutex, so
//! concurrent market runs sharing one `LocalStorage` do not lose updates.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Serialize, de::DeserializeOwned};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::error::{AppError, Result};
use crate::models::{ChangeEvent, ContentSnapshot, Enrichment};
use crate::storage::{ContentStore, SnapshotTable, filter_events};

const SNAPSHOTS_KEY: &str = "snapshots.json";
const EVENTS_KEY: &str = "events.jsonl";

/// Local filesystem storage backend.
#[derive(Clone)]
pub struct LocalStorage {
    root_dir: PathBuf,
    snapshot_lock: Arc<Mutex<()>>,
    event_lock: Arc<Mutex<()>>,
}

impl LocalStorage {
    /// Create a new LocalStorage rooted at the given directory.
    pub fn new(root_dir: impl Into<PathBuf>) -> Self {
        Self {
            root_dir: root_dir.into(),
            snapshot_lock: Arc::new(Mutex::new(())),
            event_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    /// Get the full path for a relative key.
    fn path(&self, key: &str) -> PathBuf {
        self.root_dir.join(key)
    }

    /// Ensure parent directory exists.
    async fn ensure_dir(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        Ok(())
    }

    /// Write bytes atomically (write to temp, then rename).
    async fn write_bytes(&self, key: &str, bytes: &[u8]) -> Result<()> {
        let path = self.path(key);
        self.ensure_dir(&path).await?;

        let tmp = path.with_extension("tmp");
        let mut file = tokio::fs::File::create(&tmp).await?;
        file.write_all(bytes).await?;
        file.flush().await?;
        drop(file);

        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }

    /// Write JSON data.
    async fn write_json<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(value)?;
        self.write_bytes(key, &bytes).await
    }

    /// Read bytes, returning None if file doesn't exist.
    async fn read_bytes(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let path = self.path(key);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(AppError::Io(e)),
        }
    }

    /// Read JSON data.
    async fn read_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.read_bytes(key).await? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes).map_err(|e| {
                AppError::persistence(format!("Corrupt {key}: {e}"))
            })?)),
            None => Ok(None),
        }
    }

    async fn load_table(&self) -> Result<SnapshotTable> {
        Ok(self.read_json(SNAPSHOTS_KEY).await?.unwrap_or_default())
    }

    /// Load, mutate and rewrite the snapshot table under the lock.
    async fn update_table<F>(&self, mutate: F) -> Result<()>
    where
        F: FnOnce(&mut SnapshotTable) -> Result<()> + Send,
    {
        let _guard = self.snapshot_lock.lock().await;
        let mut table = self.load_table().await?;
        mutate(&mut table)?;
        self.write_json(SNAPSHOTS_KEY, &table).await
    }
}

#[async_trait]
impl ContentStore for LocalStorage {
    async fn find_snapshot(&self, url: &str) -> Result<Option<ContentSnapshot>> {
        let _guard = self.snapshot_lock.lock().await;
        Ok(self.load_table().await?.get(url).cloned())
    }

    async fn upsert_snapshot(&self, snapshot: &ContentSnapshot) -> Result<()> {
        self.update_table(|table| {
            table.upsert(snapshot);
            Ok(())
        })
        .await
    }

    async fn mark_crawled(&self, url: &str, at: DateTime<Utc>) -> Result<()> {
        self.update_table(|table| table.mark_crawled(url, at)).await
    }

    async fn save_enrichment(&self, url: &str, enrichment: &Enrichment) -> Result<()> {
        self.update_table(|table| table.save_enrichment(url, enrichment))
            .await
    }

    async fn append_event(&self, event: &ChangeEvent) -> Result<()> {
        let _guard = self.event_lock.lock().await;
        let path = self.path(EVENTS_KEY);
        self.ensure_dir(&path).await?;

        let mut line = serde_json::to_vec(event)?;
        line.push(b'\n');

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        file.write_all(&line).await?;
        file.flush().await?;
        Ok(())
    }

    async fn list_snapshots(&self, market: &str) -> Result<Vec<ContentSnapshot>> {
        let _guard = self.snapshot_lock.lock().await;
        Ok(self.load_table().await?.for_market(market))
    }

    async fn list_events(&self, market: Option<&str>) -> Result<Vec<ChangeEvent>> {
        let bytes = {
            let _guard = self.event_lock.lock().await;
            self.read_bytes(EVENTS_KEY).await?
        };
        let Some(bytes) = bytes else {
            return Ok(Vec::new());
        };

        let text = String::from_utf8_lossy(&bytes);
        let mut events = Vec::new();
        for (line_no, line) in text.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let event: ChangeEvent = serde_json::from_str(line).map_err(|e| {
                AppError::persistence(format!("Corrupt {EVENTS_KEY} line {}: {e}", line_no + 1))
            })?;
            events.push(event);
        }
        Ok(filter_events(events, market))
    }
}
