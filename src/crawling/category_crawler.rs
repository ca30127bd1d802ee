//! Category crawler
//!
//! Walks the listing pages of one category, starting at page 0, and upserts
//! every item into the shared [`DiscoveryIndex`]. A page fault ends the
//! category early; whatever was already upserted stays in the index.

use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::discovery_index::{DiscoveryIndex, UpsertOutcome};
use crate::domain::{ListingPage, ListingSource, normalize};

/// Pagination limits for one category
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawlSettings {
    /// Pause between two page requests of the same category
    pub page_delay: Duration,
    /// Hard cap on pages per category, `None` for no cap
    pub max_pages: Option<u32>,
    /// Consecutive repeats of an unchanged total that end a category whose
    /// source has no running counter
    pub stale_total_limit: u32,
}

impl Default for CrawlSettings {
    fn default() -> Self {
        Self {
            page_delay: Duration::from_millis(300),
            max_pages: Some(100),
            stale_total_limit: 3,
        }
    }
}

/// Why a category stopped
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum CrawlOutcome {
    /// A page came back with no items
    Exhausted,
    /// The running counter reached the reported total
    CounterReached,
    /// The reported total stayed the same for too many pages
    StaleTotal,
    /// The page cap was hit
    PageCap,
    Cancelled,
    /// A page fault ended the category early
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryReport {
    pub category: String,
    pub pages_fetched: u32,
    pub items_seen: usize,
    pub new_keys: usize,
    pub invalid_locators: usize,
    pub outcome: CrawlOutcome,
}

impl CategoryReport {
    fn new(category: &str) -> Self {
        Self {
            category: category.to_string(),
            pages_fetched: 0,
            items_seen: 0,
            new_keys: 0,
            invalid_locators: 0,
            outcome: CrawlOutcome::Exhausted,
        }
    }
}

/// Tracks how many pages in a row reported the same total
#[derive(Debug, Default)]
struct StaleTotalTracker {
    last_total: Option<u64>,
    repeats: u32,
}

impl StaleTotalTracker {
    /// Record `total`, returning the number of consecutive repeats so far
    fn observe(&mut self, total: u64) -> u32 {
        if self.last_total == Some(total) {
            self.repeats += 1;
        } else {
            self.last_total = Some(total);
            self.repeats = 0;
        }
        self.repeats
    }
}

pub struct CategoryCrawler {
    source: Arc<dyn ListingSource>,
    index: DiscoveryIndex,
    settings: CrawlSettings,
}

impl CategoryCrawler {
    pub fn new(source: Arc<dyn ListingSource>, index: DiscoveryIndex, settings: CrawlSettings) -> Self {
        Self {
            source,
            index,
            settings,
        }
    }

    pub const fn index(&self) -> &DiscoveryIndex {
        &self.index
    }

    /// Crawl one category to completion or early termination
    pub async fn crawl(&self, category: &str, cancel: &CancellationToken) -> CategoryReport {
        let mut report = CategoryReport::new(category);
        let mut stale = StaleTotalTracker::default();
        let mut page_index: u32 = 0;

        info!("Crawling category '{}'", category);

        loop {
            if cancel.is_cancelled() {
                report.outcome = CrawlOutcome::Cancelled;
                break;
            }

            let page = match self.source.fetch_page(category, page_index).await {
                Ok(page) => page,
                Err(e) => {
                    warn!("Category '{}' stopped at page {}: {}", category, page_index, e);
                    report.outcome = CrawlOutcome::Failed(e.to_string());
                    break;
                }
            };
            report.pages_fetched += 1;

            if page.items.is_empty() {
                report.outcome = CrawlOutcome::Exhausted;
                break;
            }

            self.absorb_page(category, &page, &mut report).await;
            debug!(
                "Category '{}' page {}: {} items (total {:?}, shown {:?})",
                category,
                page_index,
                page.items.len(),
                page.total,
                page.shown_so_far
            );

            if let Some(outcome) = self.stop_condition(&page, &mut stale, report.pages_fetched) {
                report.outcome = outcome;
                break;
            }

            page_index += 1;
            if !self.settings.page_delay.is_zero() {
                tokio::select! {
                    () = tokio::time::sleep(self.settings.page_delay) => {}
                    () = cancel.cancelled() => {}
                }
            }
        }

        info!(
            "Category '{}' finished: {} pages, {} items, {} new keys ({:?})",
            category, report.pages_fetched, report.items_seen, report.new_keys, report.outcome
        );
        report
    }

    async fn absorb_page(&self, category: &str, page: &ListingPage, report: &mut CategoryReport) {
        for item in &page.items {
            report.items_seen += 1;
            let Some(key) = normalize(&item.locator) else {
                report.invalid_locators += 1;
                continue;
            };
            if self.index.upsert(key, &item.display_name, category).await == UpsertOutcome::Inserted {
                report.new_keys += 1;
            }
        }
    }

    fn stop_condition(&self, page: &ListingPage, stale: &mut StaleTotalTracker, pages_fetched: u32) -> Option<CrawlOutcome> {
        match (page.shown_so_far, page.total) {
            (Some(shown), Some(total)) if total == 0 || shown >= total => {
                return Some(CrawlOutcome::CounterReached);
            }
            (None, Some(total)) if stale.observe(total) >= self.settings.stale_total_limit => {
                return Some(CrawlOutcome::StaleTotal);
            }
            _ => {}
        }

        self.settings
            .max_pages
            .filter(|cap| pages_fetched >= *cap)
            .map(|_| CrawlOutcome::PageCap)
    }
}
