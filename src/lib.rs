//! Catalog Harvester - crawl, extract, dedup and batch-import product catalogs
//!
//! Discovers product pages across the categories of an online store,
//! extracts structured product data, and delivers the validated records to
//! an ingestion endpoint in batches, keeping failed batches on disk for a
//! later per-record replay.

pub mod application;
pub mod crawling;
pub mod delivery;
pub mod domain;
pub mod infrastructure;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use application::{HarvestPipeline, RunSummary};
pub use infrastructure::config::{AppConfig, ConfigManager};
