//! AWS S3 storage implementation.
//!
//! Mirrors the local layout under a key prefix:
//! - `{prefix}/snapshots.json`: url -> snapshot table
//! - `{prefix}/events.json`: change events in append order
//!
//! S3 has no append, so the event document is rewritten with the new event
//! added at the end. Existing entries are never modified.

use std::sync::Arc;

use async_trait::async_trait;
use aws_sdk_s3::Client;
use aws_sdk_s3::primitives::ByteStream;
use chrono::{DateTime, Utc};
use serde::{Serialize, de::DeserializeOwned};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::{AppError, Result};
use crate::models::{ChangeEvent, Config, ContentSnapshot, Enrichment};
use crate::storage::{ContentStore, SnapshotTable, filter_events};

/// S3-based snapshot and event storage.
#[derive(Clone)]
pub struct S3Storage {
    client: Client,
    bucket: String,
    prefix: String,
    snapshot_lock: Arc<Mutex<()>>,
    event_lock: Arc<Mutex<()>>,
}

impl S3Storage {
    /// Create a new S3 storage instance.
    pub fn new(client: Client, bucket: impl Into<String>, prefix: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
            prefix: prefix.into(),
            snapshot_lock: Arc::new(Mutex::new(())),
            event_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Create S3 storage from environment configuration.
    pub async fn from_env() -> Result<Self> {
        let config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
        let client = Client::new(&config);

        let bucket = std::env::var("S3_BUCKET")
            .map_err(|_| AppError::config("S3_BUCKET environment variable is not set"))?;
        let prefix = std::env::var("S3_PREFIX").unwrap_or_else(|_| "sitesync".to_string());

        Ok(Self::new(client, bucket, prefix))
    }

    fn key(&self, name: &str) -> String {
        format!("{}/{}", self.prefix.trim_end_matches('/'), name)
    }

    /// Read bytes from S3, returning None if the object doesn't exist.
    pub async fn read_bytes_optional(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let result = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await;

        match result {
            Ok(output) => {
                let bytes = output
                    .body
                    .collect()
                    .await
                    .map_err(|e| AppError::S3(e.to_string()))?;
                Ok(Some(bytes.into_bytes().to_vec()))
            }
            Err(err) => {
                let service_err = err.into_service_error();
                if service_err.is_no_such_key() {
                    debug!("No existing object at s3://{}/{}", self.bucket, key);
                    Ok(None)
                } else {
                    Err(AppError::S3(service_err.to_string()))
                }
            }
        }
    }

    /// Read JSON from S3.
    pub async fn read_json_optional<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.read_bytes_optional(key).await? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes).map_err(|e| {
                AppError::persistence(format!("Corrupt s3://{}/{}: {e}", self.bucket, key))
            })?)),
            None => Ok(None),
        }
    }

    /// Read `{prefix}/config.toml`, if present.
    pub async fn read_config(&self) -> Result<Option<Config>> {
        let key = self.key("config.toml");
        match self.read_bytes_optional(&key).await? {
            Some(bytes) => {
                let text = String::from_utf8(bytes)
                    .map_err(|e| AppError::config(format!("s3://{}/{}: {e}", self.bucket, key)))?;
                Ok(Some(toml::from_str(&text)?))
            }
            None => Ok(None),
        }
    }

    /// Write JSON to S3.
    async fn write_json<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<()> {
        let json = serde_json::to_vec_pretty(value)?;
        let len = json.len();

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(json))
            .content_type("application/json")
            .send()
            .await
            .map_err(|e| AppError::S3(e.to_string()))?;

        debug!("Wrote {} bytes to s3://{}/{}", len, self.bucket, key);
        Ok(())
    }

    async fn load_table(&self) -> Result<SnapshotTable> {
        Ok(self
            .read_json_optional(&self.key("snapshots.json"))
            .await?
            .unwrap_or_default())
    }

    async fn update_table<F>(&self, mutate: F) -> Result<()>
    where
        F: FnOnce(&mut SnapshotTable) -> Result<()> + Send,
    {
        let _guard = self.snapshot_lock.lock().await;
        let mut table = self.load_table().await?;
        mutate(&mut table)?;
        self.write_json(&self.key("snapshots.json"), &table).await
    }

    async fn load_events(&self) -> Result<Vec<ChangeEvent>> {
        Ok(self
            .read_json_optional(&self.key("events.json"))
            .await?
            .unwrap_or_default())
    }
}

#[async_trait]
impl ContentStore for S3Storage {
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

    // Read-modify-write of the whole event document: each append costs
    // O(total events) in transfer and the object grows without bound.
    async fn append_event(&self, event: &ChangeEvent) -> Result<()> {
        let _guard = self.event_lock.lock().await;
        let mut events = self.load_events().await?;
        events.push(event.clone());
        self.write_json(&self.key("events.json"), &events).await?;
        info!(
            "Recorded {} event for {} ({} total)",
            event.event_type.as_str(),
            event.url,
            events.len()
        );
        Ok(())
    }

    async fn list_snapshots(&self, market: &str) -> Result<Vec<ContentSnapshot>> {
        let _guard = self.snapshot_lock.lock().await;
        Ok(self.load_table().await?.for_market(market))
    }

    async fn list_events(&self, market: Option<&str>) -> Result<Vec<ChangeEvent>> {
        let events = {
            let _guard = self.event_lock.lock().await;
            self.load_events().await?
        };
        Ok(filter_events(events, market))
    }
}
