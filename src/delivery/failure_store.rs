//! Failure store
//!
//! Two directories of JSON array files:
//! - `batch_dir` holds whole batches the sink rejected (`batch_0007.json`)
//! - `residual_dir` holds the records that still failed when a batch was
//!   replayed one record at a time (`batch_0007_errors.json`)
//!
//! Directories are created on first write only; reading a store that was
//! never written touches nothing.

use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};

use crate::domain::NormalizedRecord;
use crate::domain::batch::{Batch, batch_file_name, parse_sequence, residual_file_name};
use crate::infrastructure::json_store::{self, StoreError, StoreResult};

/// Location of one persisted failed batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredBatch {
    pub sequence: u64,
    pub path: PathBuf,
}

/// A failed batch loaded back from disk
#[derive(Debug, Clone)]
pub struct FailedBatch {
    pub sequence: u64,
    pub path: PathBuf,
    pub records: Vec<NormalizedRecord>,
}

#[derive(Debug, Clone)]
pub struct FailureStore {
    batch_dir: PathBuf,
    residual_dir: PathBuf,
}

impl FailureStore {
    pub fn new(batch_dir: impl Into<PathBuf>, residual_dir: impl Into<PathBuf>) -> Self {
        Self {
            batch_dir: batch_dir.into(),
            residual_dir: residual_dir.into(),
        }
    }

    pub fn batch_dir(&self) -> &Path {
        &self.batch_dir
    }

    pub fn residual_dir(&self) -> &Path {
        &self.residual_dir
    }

    /// Failed batches waiting for replay, ordered by sequence
    pub async fn list_batches(&self) -> StoreResult<Vec<StoredBatch>> {
        Self::list_in(&self.batch_dir, false).await
    }

    /// Residual files left by earlier replays, ordered by sequence
    pub async fn list_residuals(&self) -> StoreResult<Vec<StoredBatch>> {
        Self::list_in(&self.residual_dir, true).await
    }

    async fn list_in(dir: &Path, residual: bool) -> StoreResult<Vec<StoredBatch>> {
        let mut stored: Vec<_> = json_store::list_json_files(dir)
            .await?
            .into_iter()
            .filter_map(|path| {
                let name = path.file_name()?.to_str()?;
                let is_residual = name.ends_with("_errors.json");
                if is_residual != residual {
                    return None;
                }
                let sequence = parse_sequence(name)?;
                Some(StoredBatch { sequence, path })
            })
            .collect();
        stored.sort_by_key(|s| s.sequence);
        Ok(stored)
    }

    /// Sequence number for the next batch: one past the highest number in
    /// either directory, starting at 1
    pub async fn next_sequence(&self) -> StoreResult<u64> {
        let highest = self
            .list_batches()
            .await?
            .into_iter()
            .chain(self.list_residuals().await?)
            .map(|s| s.sequence)
            .max()
            .unwrap_or(0);
        Ok(highest + 1)
    }

    /// Persist a rejected batch verbatim
    pub async fn persist_batch(&self, batch: &Batch) -> StoreResult<PathBuf> {
        let path = self.batch_dir.join(batch_file_name(batch.sequence));
        json_store::write_json_array(&path, &batch.records).await?;
        info!("Saved failed batch {} ({} records) to {}", batch.sequence, batch.len(), path.display());
        Ok(path)
    }

    /// Persist the records of batch `sequence` that failed individual replay
    pub async fn persist_residual(&self, sequence: u64, records: &[NormalizedRecord]) -> StoreResult<PathBuf> {
        let path = self.residual_dir.join(residual_file_name(sequence));
        json_store::write_json_array(&path, records).await?;
        info!("Saved {} residual records of batch {} to {}", records.len(), sequence, path.display());
        Ok(path)
    }

    pub async fn load(&self, stored: &StoredBatch) -> StoreResult<FailedBatch> {
        let records: Vec<NormalizedRecord> = json_store::read_json(&stored.path).await?;
        Ok(FailedBatch {
            sequence: stored.sequence,
            path: stored.path.clone(),
            records,
        })
    }

    pub async fn remove(&self, stored: &StoredBatch) -> StoreResult<()> {
        fs::remove_file(&stored.path)
            .await
            .map_err(|e| StoreError::io(&stored.path, e))?;
        debug!("Removed {}", stored.path.display());
        Ok(())
    }

    /// Delete every pending failed batch. Residual files are kept.
    pub async fn clear_batches(&self) -> StoreResult<usize> {
        let batches = self.list_batches().await?;
        for stored in &batches {
            self.remove(stored).await?;
        }
        if !batches.is_empty() {
            info!("Cleared {} pending batches from {}", batches.len(), self.batch_dir.display());
        }
        Ok(batches.len())
    }
}
