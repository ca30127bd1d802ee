//! Crawl scheduler: one category crawler per category on a bounded pool

use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::category_crawler::{CategoryCrawler, CategoryReport, CrawlOutcome};
use super::discovery_index::DiscoveryIndex;
use super::worker_pool::{PoolConfig, PoolError, WorkerPool};

#[derive(Error, Debug)]
pub enum CrawlError {
    #[error("no categories to crawl")]
    NoCategories,

    #[error(transparent)]
    Pool(#[from] PoolError),
}

/// Outcome of the whole discovery phase
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CrawlPhaseReport {
    pub categories: Vec<CategoryReport>,
    pub discovered_keys: usize,
}

impl CrawlPhaseReport {
    pub fn failed_categories(&self) -> impl Iterator<Item = &CategoryReport> {
        self.categories
            .iter()
            .filter(|r| matches!(r.outcome, CrawlOutcome::Failed(_)))
    }
}

pub struct CrawlScheduler {
    crawler: Arc<CategoryCrawler>,
    workers: usize,
}

impl CrawlScheduler {
    pub fn new(crawler: CategoryCrawler, workers: usize) -> Self {
        Self {
            crawler: Arc::new(crawler),
            workers,
        }
    }

    pub fn index(&self) -> &DiscoveryIndex {
        self.crawler.index()
    }

    /// Crawl every category and return once all of them have finished
    pub async fn run(&self, categories: Vec<String>, cancel: &CancellationToken) -> Result<CrawlPhaseReport, CrawlError> {
        if categories.is_empty() {
            return Err(CrawlError::NoCategories);
        }

        info!(
            "Discovery phase: {} categories on {} workers",
            categories.len(),
            self.workers
        );

        let reports = Arc::new(Mutex::new(Vec::with_capacity(categories.len())));
        let pool = {
            let crawler = Arc::clone(&self.crawler);
            let reports = Arc::clone(&reports);
            let cancel = cancel.clone();
            WorkerPool::start(
                "crawl",
                PoolConfig::with_workers(self.workers),
                cancel.clone(),
                move |category: String| {
                    let crawler = Arc::clone(&crawler);
                    let reports = Arc::clone(&reports);
                    let cancel = cancel.clone();
                    async move {
                        let report = crawler.crawl(&category, &cancel).await;
                        reports.lock().await.push(report);
                    }
                },
            )
        };

        for category in categories {
            if let Err(e) = pool.submit(category).await {
                warn!("Stopped submitting categories: {}", e);
                break;
            }
        }
        pool.join().await?;

        let categories = std::mem::take(&mut *reports.lock().await);
        let report = CrawlPhaseReport {
            discovered_keys: self.index().len().await,
            categories,
        };

        let failed = report.failed_categories().count();
        if failed > 0 {
            warn!("{} categories ended early on page faults", failed);
        }
        info!(
            "Discovery phase complete: {} unique items across {} categories",
            report.discovered_keys,
            report.categories.len()
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawling::category_crawler::CrawlSettings;
    use crate::domain::SourceError;
    use crate::test_utils::{ScriptedListingSource, listing_page};
    use std::time::Duration;

    fn scheduler(source: ScriptedListingSource, workers: usize) -> CrawlScheduler {
        let settings = CrawlSettings {
            page_delay: Duration::ZERO,
            max_pages: None,
            stale_total_limit: 3,
        };
        CrawlScheduler::new(
            CategoryCrawler::new(Arc::new(source), DiscoveryIndex::new(), settings),
            workers,
        )
    }

    #[tokio::test]
    async fn empty_category_list_is_an_error() {
        let scheduler = scheduler(ScriptedListingSource::new(), 2);
        let result = scheduler.run(Vec::new(), &CancellationToken::new()).await;
        assert!(matches!(result, Err(CrawlError::NoCategories)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn every_category_reports_even_when_one_fails() {
        let source = ScriptedListingSource::new()
            .with_category("a", vec![Ok(listing_page("shared", 0..10, None))])
            .with_category("b", vec![Ok(listing_page("shared", 5..15, None))])
            .with_category("c", vec![Err(SourceError::parse("unexpected markup"))]);
        let scheduler = scheduler(source, 2);

        let report = scheduler
            .run(vec!["a".into(), "b".into(), "c".into()], &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.categories.len(), 3);
        assert_eq!(report.failed_categories().count(), 1);
        assert_eq!(report.discovered_keys, 15);

        let overlap = crate::domain::normalize("https://shop.test/shared/7?sku=7").unwrap();
        let entry = scheduler.index().get(&overlap).await.unwrap();
        let mut categories = entry.categories.clone();
        categories.sort();
        assert_eq!(categories, vec!["a", "b"]);
    }
}
