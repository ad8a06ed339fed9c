//! AWS Lambda handler for scheduled syncs.
//!
//! Each invocation:
//! 1. Loads `config.toml` from the S3 prefix (defaults if absent)
//! 2. Reconciles one market or all configured markets
//! 3. Stops between URLs shortly before the invocation deadline

use std::collections::BTreeMap;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use lambda_runtime::{Error as LambdaError, LambdaEvent};
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument, warn};

use crate::error::{AppError, Result};
use crate::models::{Config, ReconcileOptions, ReconciliationResult};
use crate::pipeline::{CancelFlag, SyncServices};
use crate::storage::s3::S3Storage;

/// Time kept in reserve before the Lambda deadline.
const DEADLINE_MARGIN: Duration = Duration::from_secs(10);

/// Lambda invocation payload.
#[derive(Debug, Default, Deserialize)]
pub struct SyncRequest {
    /// Market to sync (all configured markets if not specified)
    pub market: Option<String>,

    #[serde(default)]
    pub force_refresh: bool,

    #[serde(default)]
    pub enrich: bool,
}

impl SyncRequest {
    fn options(&self) -> ReconcileOptions {
        ReconcileOptions {
            force_refresh: self.force_refresh,
            enrich: self.enrich,
        }
    }
}

/// Lambda response payload.
#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncResponse {
    pub success: bool,

    /// Per-market results keyed by market id
    pub results: BTreeMap<String, ReconciliationResult>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    pub execution_time_ms: u64,
}

/// Main Lambda handler function.
#[instrument(skip(event))]
pub async fn handler(
    event: LambdaEvent<SyncRequest>,
) -> std::result::Result<SyncResponse, LambdaError> {
    let start = std::time::Instant::now();
    let (request, context) = event.into_parts();

    info!(
        "Starting sync: market={:?}, force_refresh={}, enrich={}",
        request.market, request.force_refresh, request.enrich
    );

    let cancel = CancelFlag::new();
    let budget = remaining_budget(context.deadline, now_millis());
    info!("Time budget: {:?}", budget);
    let timer = cancel.cancel_after(budget);

    let outcome = run_sync(&request, &cancel).await;
    timer.abort();

    let execution_time_ms = start.elapsed().as_millis() as u64;
    match outcome {
        Ok(results) => {
            let changes: usize = results.values().map(|r| r.change_count()).sum();
            info!(
                "Sync completed: {} markets, {} changes in {}ms",
                results.len(),
                changes,
                execution_time_ms
            );
            Ok(SyncResponse {
                success: true,
                results,
                error: None,
                execution_time_ms,
            })
        }
        Err(e) => {
            error!("Sync failed: {}", e);
            Ok(SyncResponse {
                success: false,
                error: Some(e.to_string()),
                execution_time_ms,
                ..Default::default()
            })
        }
    }
}

async fn run_sync(
    request: &SyncRequest,
    cancel: &CancelFlag,
) -> Result<BTreeMap<String, ReconciliationResult>> {
    let storage = S3Storage::from_env().await?;
    let config = load_lambda_config(&storage).await?;

    let markets = match request.market.as_deref() {
        Some(id) => vec![
            config
                .market(id)
                .cloned()
                .ok_or_else(|| AppError::config(format!("Unknown market '{id}'")))?,
        ],
        None => config.markets.clone(),
    };

    let services = SyncServices::from_config(&config)?;
    services
        .reconciler(&storage)
        .reconcile_all(&markets, request.options(), cancel)
        .await
}

/// Configuration from S3 with environment overrides.
async fn load_lambda_config(storage: &S3Storage) -> Result<Config> {
    let mut config = match storage.read_config().await? {
        Some(config) => config,
        None => {
            warn!("No config.toml in bucket, using defaults");
            Config::default()
        }
    };
    config.apply_env_overrides();
    config.validate()?;
    Ok(config)
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Time left before the deadline minus the safety margin.
fn remaining_budget(deadline_ms: u64, now_ms: u64) -> Duration {
    Duration::from_millis(deadline_ms.saturating_sub(now_ms)).saturating_sub(DEADLINE_MARGIN)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sync_request_defaults() {
        let req: SyncRequest = serde_json::from_str("{}").unwrap();
        assert!(req.market.is_none());
        assert!(!req.force_refresh);
        assert!(!req.enrich);
    }

    #[test]
    fn test_sync_request_with_options() {
        let json = r#"{"market": "uk", "force_refresh": true, "enrich": true}"#;
        let req: SyncRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.market.as_deref(), Some("uk"));
        assert!(req.options().force_refresh);
        assert!(req.options().enrich);
    }

    #[test]
    fn test_remaining_budget() {
        assert_eq!(remaining_budget(70_000, 10_000), Duration::from_secs(50));
        assert_eq!(remaining_budget(15_000, 10_000), Duration::ZERO);
        assert_eq!(remaining_budget(5_000, 10_000), Duration::ZERO);
    }

    #[test]
    fn test_response_serializes_camel_case() {
        let response = SyncResponse {
            success: true,
            execution_time_ms: 12,
            ..Default::default()
        };
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["executionTimeMs"], 12);
        assert!(json.get("error").is_none());
    }
}
