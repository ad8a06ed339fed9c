//! AWS Lambda entry point for sitesync.
//!
//! Deploy with `cargo lambda build --release --features lambda`.
//!
//! ## Environment Variables
//!
//! - `S3_BUCKET`: bucket holding snapshots, events and `config.toml`
//! - `S3_PREFIX`: key prefix (default: `sitesync`)
//! - `SYNC_REQUEST_DELAY_MS`, `SYNC_STALE_AFTER_MINS`,
//!   `SYNC_MAX_CONCURRENT_MARKETS`, `HTTP_TIMEOUT_SECS`: config overrides
//! - `RUST_LOG`: log filter (e.g. `info`, `sitesync=debug`)

use lambda_runtime::{Error as LambdaError, service_fn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), LambdaError> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    tracing::info!("sitesync Lambda starting...");
    lambda_runtime::run(service_fn(sitesync::lambda::handler)).await
}
