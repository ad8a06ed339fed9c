//! sitesync CLI
//!
//! Local execution entry point. For AWS Lambda, use `sitesync-lambda`.

use std::path::PathBuf;
use std::time::Duration;

use chrono::Utc;
use clap::{Parser, Subcommand};
use sitesync::{
    error::{AppError, Result},
    models::{Config, Market, ReconcileOptions},
    pipeline::{self, CancelFlag},
    storage::{ContentStore, LocalStorage},
    utils::console,
};

/// sitesync - Sitemap-driven content sync
#[derive(Parser, Debug)]
#[command(
    name = "sitesync",
    version,
    about = "Incremental content reconciliation from sitemaps"
)]
struct Cli {
    /// Path to storage directory containing config and data files
    #[arg(short, long, default_value = "storage")]
    storage_dir: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Stop between URLs after this many seconds
    #[arg(long)]
    time_budget_secs: Option<u64>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Reconcile a single market
    Sync {
        /// Market id from config.toml
        market: String,

        #[command(flatten)]
        flags: SyncFlags,
    },

    /// Reconcile every configured market
    SyncAll {
        #[command(flatten)]
        flags: SyncFlags,
    },

    /// Show snapshot counts and stale backlog
    Status {
        /// Market id (all markets if omitted)
        market: Option<String>,
    },

    /// Show the most recent change events
    Activity {
        #[arg(long)]
        market: Option<String>,

        #[arg(long, default_value_t = 20)]
        limit: usize,
    },

    /// Validate configuration file
    Validate,

    /// Show storage and configuration info
    Info,
}

#[derive(clap::Args, Debug)]
struct SyncFlags {
    /// Refetch every known URL regardless of staleness
    #[arg(long)]
    force: bool,

    /// Run summary and category enrichment on changed pages
    #[arg(long)]
    enrich: bool,
}

impl SyncFlags {
    fn options(&self) -> ReconcileOptions {
        ReconcileOptions {
            force_refresh: self.force,
            enrich: self.enrich,
        }
    }
}

/// Initialize logging based on verbosity flag.
fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();
}

fn find_market<'a>(config: &'a Config, id: &str) -> Result<&'a Market> {
    config.market(id).ok_or_else(|| {
        AppError::config(format!(
            "Unknown market '{}'. Configured: {}",
            id,
            config
                .markets
                .iter()
                .map(|m| m.id.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        ))
    })
}

fn arm_cancel(budget_secs: Option<u64>) -> CancelFlag {
    let cancel = CancelFlag::new();
    if let Some(secs) = budget_secs {
        cancel.cancel_after(Duration::from_secs(secs));
    }
    cancel
}

/// Main entry point for the CLI application.
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config_path = cli.storage_dir.join("config.toml");
    let mut config = Config::load_or_default(&config_path);
    config.apply_env_overrides();
    log::debug!("Loaded configuration from {}", config_path.display());

    let storage = LocalStorage::new(&cli.storage_dir);

    match cli.command {
        Command::Sync { market, flags } => {
            config.validate()?;
            let market = find_market(&config, &market)?.clone();
            let cancel = arm_cancel(cli.time_budget_secs);
            pipeline::run_sync(&config, &storage, &[market], flags.options(), &cancel).await?;
        }

        Command::SyncAll { flags } => {
            config.validate()?;
            let cancel = arm_cancel(cli.time_budget_secs);
            pipeline::run_sync(&config, &storage, &config.markets, flags.options(), &cancel)
                .await?;
        }

        Command::Status { market } => {
            let ids: Vec<String> = match market {
                Some(id) => vec![find_market(&config, &id)?.id.clone()],
                None => config.markets.iter().map(|m| m.id.clone()).collect(),
            };

            console::header("Market status");
            let now = Utc::now();
            for id in ids {
                let status = pipeline::market_status(&storage, &id, &config.sync, now).await?;
                console::info(&format!(
                    "[{}] {} snapshots, {} stale",
                    status.market, status.total_snapshots, status.pending_urls
                ));
                match status.last_crawled_at {
                    Some(at) => console::sub_item(&format!("Last crawl: {}", at.to_rfc3339())),
                    None => console::sub_item("Never crawled"),
                }
            }
        }

        Command::Activity { market, limit } => {
            let events = pipeline::recent_activity(&storage, market.as_deref(), limit).await?;
            if events.is_empty() {
                console::info("No change events recorded yet.");
            }
            for event in &events {
                console::info(&event.format("[{market}] {type} {pct}% {url} at {time}"));
            }
        }

        Command::Validate => {
            log::info!("Validating configuration...");
            if let Err(e) = config.validate() {
                log::error!("Config validation failed: {}", e);
                return Err(e);
            }
            console::success(&format!(
                "Config OK ({} markets, {} category rules)",
                config.markets.len(),
                config.enrichment.categories.len()
            ));
        }

        Command::Info => {
            console::info(&format!("Storage directory: {}", cli.storage_dir.display()));
            console::info(&format!(
                "Config: {}",
                if config_path.exists() {
                    "config.toml"
                } else {
                    "defaults (config.toml not found)"
                }
            ));
            console::info(&format!(
                "Request delay: {}ms, stale after: {}min, concurrent markets: {}",
                config.sync.request_delay_ms,
                config.sync.stale_after_mins,
                config.sync.max_concurrent_markets
            ));

            let mut total = 0;
            for market in &config.markets {
                let snapshots = storage.list_snapshots(&market.id).await?;
                total += snapshots.len();
                console::sub_item(&format!(
                    "{} ({}): {} snapshots",
                    market.id,
                    market.base_url,
                    snapshots.len()
                ));
            }
            let events = storage.list_events(None).await?;
            console::info(&format!("{} snapshots, {} change events", total, events.len()));
        }
    }

    Ok(())
}
