//! # Harvesting engine
//!
//! Two bounded worker-pool phases separated by a barrier:
//!
//! 1. Discovery: [`CrawlScheduler`] runs one [`CategoryCrawler`] per category,
//!    all writing into the shared [`DiscoveryIndex`].
//! 2. Extraction: [`ExtractionScheduler`] runs the [`DetailExtractor`] over a
//!    frozen [`DiscoverySnapshot`], routing rejects to the [`DiscardLedger`].

pub mod category_crawler;
pub mod crawl_scheduler;
pub mod detail_extractor;
pub mod discard_ledger;
pub mod discovery_index;
pub mod extraction_scheduler;
pub mod worker_pool;

pub use category_crawler::{CategoryCrawler, CategoryReport, CrawlOutcome, CrawlSettings};
pub use crawl_scheduler::{CrawlError, CrawlPhaseReport, CrawlScheduler};
pub use detail_extractor::{DetailExtractor, ExtractionSettings};
pub use discard_ledger::DiscardLedger;
pub use discovery_index::{DiscoveryIndex, DiscoverySnapshot, UpsertOutcome};
pub use extraction_scheduler::{ExtractionOutcome, ExtractionProgress, ExtractionScheduler, spawn_progress_reporter};
pub use worker_pool::{PoolConfig, PoolError, WorkerPool};
