//! sitesync: sitemap-driven incremental content reconciliation.
//!
//! Reads each market's sitemap, fetches new and stale pages, and records
//! content snapshots plus an append-only change log.

pub mod error;
#[cfg(feature = "lambda")]
pub mod lambda;
pub mod models;
pub mod pipeline;
pub mod services;
pub mod storage;
pub mod utils;
