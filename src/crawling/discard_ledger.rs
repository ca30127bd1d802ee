//! Discard ledger
//!
//! Append-only collection of rejected items, shared by the extraction
//! workers. Written once to disk at the end of a run.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;

use crate::domain::DiscardRecord;
use crate::infrastructure::json_store::{self, StoreResult};

#[derive(Debug, Clone, Default)]
pub struct DiscardLedger {
    records: Arc<Mutex<Vec<DiscardRecord>>>,
}

impl DiscardLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn record(&self, discard: DiscardRecord) {
        self.records.lock().await.push(discard);
    }

    pub async fn len(&self) -> usize {
        self.records.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.lock().await.is_empty()
    }

    /// Copy of all entries ordered by key
    pub async fn snapshot(&self) -> Vec<DiscardRecord> {
        let mut records = self.records.lock().await.clone();
        records.sort_by(|a, b| a.key.cmp(&b.key));
        records
    }

    /// Number of discards per reason code
    pub async fn counts_by_reason(&self) -> BTreeMap<&'static str, usize> {
        let records = self.records.lock().await;
        let mut counts = BTreeMap::new();
        for record in records.iter() {
            *counts.entry(record.reason.code()).or_insert(0) += 1;
        }
        counts
    }

    /// Write the ledger as one JSON array
    pub async fn write_to(&self, path: &Path) -> StoreResult<usize> {
        let records = self.snapshot().await;
        json_store::write_json_array(path, &records).await?;
        info!("Wrote {} discarded items to {}", records.len(), path.display());
        Ok(records.len())
    }
}
