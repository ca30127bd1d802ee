//! Retry reconciler
//!
//! Replays every pending failed batch one record per request, so a single
//! bad record can no longer take its siblings down with it. Records that
//! still fail are written to a residual file under the batch's sequence
//! number and the original batch file is removed.

use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, info_span, warn, Instrument};

use super::failure_store::{FailedBatch, FailureStore, StoredBatch};
use crate::domain::IngestionSink;
use crate::infrastructure::json_store::StoreResult;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileSettings {
    /// Pause between two single-record requests
    pub delay: Duration,
}

impl Default for ReconcileSettings {
    fn default() -> Self {
        Self {
            delay: Duration::from_millis(200),
        }
    }
}

/// Outcome for one replayed batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchReconciliation {
    pub sequence: u64,
    pub replayed: usize,
    pub delivered: usize,
    pub residual: usize,
    pub residual_path: Option<PathBuf>,
}

/// A batch file that could not be processed and was left in place
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedBatch {
    pub path: PathBuf,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileReport {
    pub batches: Vec<BatchReconciliation>,
    pub skipped: Vec<SkippedBatch>,
}

impl ReconcileReport {
    pub fn delivered(&self) -> usize {
        self.batches.iter().map(|b| b.delivered).sum()
    }

    pub fn residual(&self) -> usize {
        self.batches.iter().map(|b| b.residual).sum()
    }
}

pub struct RetryReconciler {
    sink: Arc<dyn IngestionSink>,
    store: FailureStore,
    settings: ReconcileSettings,
}

impl RetryReconciler {
    pub fn new(sink: Arc<dyn IngestionSink>, store: FailureStore, settings: ReconcileSettings) -> Self {
        Self { sink, store, settings }
    }

    /// Replay every pending failed batch.
    ///
    /// An empty or missing store is a no-op that writes nothing.
    pub async fn reconcile(&self) -> StoreResult<ReconcileReport> {
        let pending = self.store.list_batches().await?;
        let mut report = ReconcileReport::default();

        if pending.is_empty() {
            info!("No pending batches in {}", self.store.batch_dir().display());
            return Ok(report);
        }
        info!("Reconciling {} failed batches", pending.len());

        for stored in pending {
            let span = info_span!("reconcile", sequence = stored.sequence);
            match self.reconcile_one(&stored).instrument(span).await {
                Ok(outcome) => report.batches.push(outcome),
                Err(reason) => {
                    warn!("Skipping {}: {}", stored.path.display(), reason);
                    report.skipped.push(SkippedBatch {
                        path: stored.path,
                        reason,
                    });
                }
            }
        }

        info!(
            "Reconcile finished: {} records delivered, {} still failing, {} files skipped",
            report.delivered(),
            report.residual(),
            report.skipped.len()
        );
        Ok(report)
    }

    async fn reconcile_one(&self, stored: &StoredBatch) -> Result<BatchReconciliation, String> {
        let FailedBatch { sequence, records, .. } = self.store.load(stored).await.map_err(|e| e.to_string())?;

        let mut residual = Vec::new();
        for (position, record) in records.iter().enumerate() {
            if position > 0 && !self.settings.delay.is_zero() {
                tokio::time::sleep(self.settings.delay).await;
            }
            if let Err(e) = self.sink.deliver(std::slice::from_ref(record)).await {
                warn!("Record {} of batch {} still failing: {}", record.identifier(), sequence, e);
                residual.push(record.clone());
            }
        }

        // The original goes away only once its residue is safely on disk.
        let residual_path = if residual.is_empty() {
            None
        } else {
            Some(
                self.store
                    .persist_residual(sequence, &residual)
                    .await
                    .map_err(|e| format!("residual not saved, batch kept: {e}"))?,
            )
        };

        self.store.remove(stored).await.map_err(|e| e.to_string())?;

        info!(
            "Batch {}: {} of {} records delivered on replay",
            sequence,
            records.len() - residual.len(),
            records.len()
        );
        Ok(BatchReconciliation {
            sequence,
            replayed: records.len(),
            delivered: records.len() - residual.len(),
            residual: residual.len(),
            residual_path,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Batch;
    use crate::test_utils::{RecordingSink, record};
    use tempfile::TempDir;

    fn store(dir: &TempDir) -> FailureStore {
        FailureStore::new(dir.path().join("batches"), dir.path().join("residual"))
    }

    fn reconciler(sink: Arc<RecordingSink>, store: FailureStore) -> RetryReconciler {
        RetryReconciler::new(sink, store, ReconcileSettings { delay: Duration::ZERO })
    }

    #[tokio::test]
    async fn fully_recovered_batch_leaves_no_residue() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        store
            .persist_batch(&Batch {
                sequence: 1,
                records: vec![record("A", 1.0), record("B", 2.0)],
            })
            .await
            .unwrap();
        let sink = Arc::new(RecordingSink::new());

        let report = reconciler(sink.clone(), store.clone()).reconcile().await.unwrap();

        assert_eq!(sink.call_sizes().await, vec![1, 1]);
        assert_eq!(report.delivered(), 2);
        assert!(report.batches[0].residual_path.is_none());
        assert!(store.list_batches().await.unwrap().is_empty());
        assert!(!store.residual_dir().exists());
    }

    #[tokio::test]
    async fn unreadable_batch_is_skipped_and_kept() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        tokio::fs::create_dir_all(store.batch_dir()).await.unwrap();
        let broken = store.batch_dir().join("batch_0002.json");
        tokio::fs::write(&broken, "{not json").await.unwrap();
        store
            .persist_batch(&Batch {
                sequence: 3,
                records: vec![record("C", 1.0)],
            })
            .await
            .unwrap();

        let report = reconciler(Arc::new(RecordingSink::new()), store.clone())
            .reconcile()
            .await
            .unwrap();

        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].path, broken);
        assert_eq!(report.batches.len(), 1);
        assert!(broken.exists());
        assert_eq!(store.list_batches().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn second_run_is_a_no_op() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        store
            .persist_batch(&Batch {
                sequence: 5,
                records: vec![record("A", 1.0), record("B", 1.0)],
            })
            .await
            .unwrap();
        let sink = Arc::new(RecordingSink::new().rejecting_identifier("B"));
        let reconciler = reconciler(sink.clone(), store.clone());

        let first = reconciler.reconcile().await.unwrap();
        assert_eq!(first.residual(), 1);

        let second = reconciler.reconcile().await.unwrap();
        assert_eq!(second, ReconcileReport::default());
        assert_eq!(sink.call_count().await, 2);
        assert_eq!(store.list_residuals().await.unwrap().len(), 1);
    }
}
