//! Batch dispatcher
//!
//! Splits the validated records into fixed-size batches and sends each one
//! as a single ingestion request. A batch counts as delivered only when the
//! sink accepts it; otherwise it is written verbatim to the failure store.
//! Every batch is attempted regardless of earlier failures.

use serde::Serialize;
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, info_span, warn, Instrument};

use super::failure_store::FailureStore;
use crate::domain::{Batch, IngestionSink, NormalizedRecord};
use crate::infrastructure::json_store::{self, StoreResult};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchSettings {
    pub batch_size: NonZeroUsize,
    /// Pause between two consecutive requests
    pub delay: Duration,
    /// Delete pending failed batches before dispatching
    pub clear_failure_store: bool,
    /// Where to write the per-run log of failed batches
    pub log_path: Option<PathBuf>,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            batch_size: NonZeroUsize::new(100).unwrap_or(NonZeroUsize::MIN),
            delay: Duration::from_millis(500),
            clear_failure_store: false,
            log_path: None,
        }
    }
}

/// One entry of the dispatch log
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedBatchReport {
    pub batch: u64,
    /// HTTP status code, or `EXCEPTION` for transport failures
    pub status: String,
    pub response: String,
    pub records: usize,
    /// Failure-store file; `None` if persisting the batch itself failed
    pub saved_to: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchReport {
    pub delivered_count: usize,
    pub attempted_batches: usize,
    pub failed_batches: Vec<FailedBatchReport>,
}

impl DispatchReport {
    pub fn failed_record_count(&self) -> usize {
        self.failed_batches.iter().map(|f| f.records).sum()
    }

    /// Failed batches that could not be written to the failure store
    pub fn unsaved_batches(&self) -> impl Iterator<Item = &FailedBatchReport> {
        self.failed_batches.iter().filter(|f| f.saved_to.is_none())
    }
}

pub struct BatchDispatcher {
    sink: Arc<dyn IngestionSink>,
    store: FailureStore,
    settings: DispatchSettings,
}

impl BatchDispatcher {
    pub fn new(sink: Arc<dyn IngestionSink>, store: FailureStore, settings: DispatchSettings) -> Self {
        Self { sink, store, settings }
    }

    pub const fn store(&self) -> &FailureStore {
        &self.store
    }

    /// Deliver `records` batch by batch.
    ///
    /// Only failure-store housekeeping (listing or clearing) can make this
    /// return an error, and that happens before the first request.
    pub async fn dispatch(&self, records: Vec<NormalizedRecord>) -> StoreResult<DispatchReport> {
        if self.settings.clear_failure_store {
            self.store.clear_batches().await?;
        }

        let first_sequence = self.store.next_sequence().await?;
        let batches = Batch::partition(records, self.settings.batch_size, first_sequence);
        let mut report = DispatchReport::default();

        info!(
            "Dispatching {} batches of up to {} records",
            batches.len(),
            self.settings.batch_size
        );

        let total = batches.len();
        for (position, batch) in batches.into_iter().enumerate() {
            if position > 0 && !self.settings.delay.is_zero() {
                tokio::time::sleep(self.settings.delay).await;
            }

            let span = info_span!("batch", sequence = batch.sequence, size = batch.len());
            self.dispatch_one(batch, &mut report).instrument(span).await;
            report.attempted_batches += 1;

            if (position + 1) % 10 == 0 {
                info!("Dispatched {}/{} batches", position + 1, total);
            }
        }

        if let Some(log_path) = &self.settings.log_path {
            if let Err(e) = json_store::write_json_array(log_path, &report.failed_batches).await {
                warn!("Could not write dispatch log {}: {}", log_path.display(), e);
            }
        }

        info!(
            "Dispatch finished: {} records delivered, {} of {} batches failed",
            report.delivered_count,
            report.failed_batches.len(),
            report.attempted_batches
        );
        Ok(report)
    }

    async fn dispatch_one(&self, batch: Batch, report: &mut DispatchReport) {
        let failure = match self.sink.deliver(&batch.records).await {
            Ok(()) => {
                report.delivered_count += batch.len();
                info!("Batch {} delivered", batch.sequence);
                return;
            }
            Err(e) => e,
        };

        warn!("Batch {} rejected: {}", batch.sequence, failure);
        let saved_to = match self.store.persist_batch(&batch).await {
            Ok(path) => Some(path),
            Err(e) => {
                error!("Batch {} could not be saved for retry: {}", batch.sequence, e);
                None
            }
        };

        report.failed_batches.push(FailedBatchReport {
            batch: batch.sequence,
            status: failure.status_label(),
            response: failure.response().to_string(),
            records: batch.len(),
            saved_to,
        });
    }
}
