//! Extraction scheduler
//!
//! Runs the detail extractor over a discovery snapshot on a bounded pool.
//! Records are collected in memory, discards go to the [`DiscardLedger`].
//! Progress is published on a watch channel so observers never slow the
//! workers down.

use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::detail_extractor::DetailExtractor;
use super::discard_ledger::DiscardLedger;
use super::discovery_index::DiscoverySnapshot;
use super::worker_pool::{PoolConfig, PoolError, WorkerPool};
use crate::domain::{DiscoveryEntry, NormalizedRecord};

/// Live counters of the extraction phase
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionProgress {
    pub processed: usize,
    pub total: usize,
    pub extracted: usize,
    pub discarded: usize,
}

impl ExtractionProgress {
    pub const fn is_complete(&self) -> bool {
        self.processed >= self.total
    }

    #[allow(clippy::cast_precision_loss)]
    pub fn percentage(&self) -> f64 {
        if self.total == 0 {
            100.0
        } else {
            self.processed as f64 / self.total as f64 * 100.0
        }
    }
}

/// Result of the extraction phase
#[derive(Debug, Clone)]
pub struct ExtractionOutcome {
    /// Validated records ordered by source URL
    pub records: Vec<NormalizedRecord>,
    pub progress: ExtractionProgress,
}

pub struct ExtractionScheduler {
    extractor: Arc<DetailExtractor>,
    ledger: DiscardLedger,
    workers: usize,
    progress: Arc<watch::Sender<ExtractionProgress>>,
}

impl ExtractionScheduler {
    pub fn new(extractor: DetailExtractor, ledger: DiscardLedger, workers: usize) -> Self {
        let (progress, _) = watch::channel(ExtractionProgress::default());
        Self {
            extractor: Arc::new(extractor),
            ledger,
            workers,
            progress: Arc::new(progress),
        }
    }

    pub const fn ledger(&self) -> &DiscardLedger {
        &self.ledger
    }

    /// Receiver for live progress updates
    pub fn subscribe(&self) -> watch::Receiver<ExtractionProgress> {
        self.progress.subscribe()
    }

    /// Extract every entry of `snapshot` and wait for the pool to drain
    pub async fn run(&self, snapshot: &DiscoverySnapshot, cancel: &CancellationToken) -> Result<ExtractionOutcome, PoolError> {
        let total = snapshot.len();
        self.progress.send_replace(ExtractionProgress {
            total,
            ..ExtractionProgress::default()
        });
        info!("Extraction phase: {} items on {} workers", total, self.workers);

        let records = Arc::new(Mutex::new(Vec::with_capacity(total)));
        let pool = {
            let extractor = Arc::clone(&self.extractor);
            let ledger = self.ledger.clone();
            let records = Arc::clone(&records);
            let progress = Arc::clone(&self.progress);
            WorkerPool::start(
                "extract",
                PoolConfig::with_workers(self.workers),
                cancel.clone(),
                move |entry: DiscoveryEntry| {
                    let extractor = Arc::clone(&extractor);
                    let ledger = ledger.clone();
                    let records = Arc::clone(&records);
                    let progress = Arc::clone(&progress);
                    async move {
                        let extracted = match extractor.extract(&entry).await {
                            Ok(record) => {
                                records.lock().await.push(record);
                                true
                            }
                            Err(discard) => {
                                ledger.record(discard).await;
                                false
                            }
                        };
                        progress.send_modify(|p| {
                            p.processed += 1;
                            if extracted {
                                p.extracted += 1;
                            } else {
                                p.discarded += 1;
                            }
                        });
                    }
                },
            )
        };

        for entry in snapshot.iter() {
            if let Err(e) = pool.submit(entry.clone()).await {
                warn!("Stopped submitting items: {}", e);
                break;
            }
        }
        pool.join().await?;

        let mut records = std::mem::take(&mut *records.lock().await);
        records.sort_by(|a, b| a.source_url.cmp(&b.source_url));
        let progress = *self.progress.borrow();

        info!(
            "Extraction phase complete: {} records, {} discarded, {} of {} processed",
            progress.extracted, progress.discarded, progress.processed, progress.total
        );
        Ok(ExtractionOutcome { records, progress })
    }
}

/// Log progress every `interval` until the phase completes or `cancel` fires
pub fn spawn_progress_reporter(
    mut progress: watch::Receiver<ExtractionProgress>,
    interval: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await;
        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }
            if progress.has_changed().is_err() {
                break;
            }
            let current = *progress.borrow_and_update();
            info!(
                "Extraction progress: {}/{} ({:.1}%), {} ok, {} discarded",
                current.processed,
                current.total,
                current.percentage(),
                current.extracted,
                current.discarded
            );
            if current.total > 0 && current.is_complete() {
                break;
            }
        }
    })
}
