//! Pipeline entry points for sync operations.
//!
//! - `Reconciler`: per-market sitemap reconciliation
//! - `run_sync`: CLI-facing run with console reporting
//! - `market_status` / `recent_activity`: read-only projections

pub mod cancel;
pub mod diff;
pub mod reconcile;
pub mod status;
pub mod sync;

pub use cancel::CancelFlag;
pub use reconcile::Reconciler;
pub use status::{market_status, recent_activity};
pub use sync::{SyncServices, run_sync};
