//! # Delivery engine
//!
//! Moves validated records into the ingestion endpoint:
//!
//! - [`BatchDispatcher`] sends fixed-size batches and demotes rejected ones
//!   to the [`FailureStore`]
//! - [`RetryReconciler`] later replays those batches one record at a time
//! - [`record_loader`] validates records coming from import files

pub mod batch_dispatcher;
pub mod failure_store;
pub mod ingestion_sink;
pub mod record_loader;
pub mod retry_reconciler;

pub use batch_dispatcher::{BatchDispatcher, DispatchReport, DispatchSettings, FailedBatchReport};
pub use failure_store::{FailedBatch, FailureStore, StoredBatch};
pub use ingestion_sink::{DryRunSink, HttpIngestionSink, SinkConfig};
pub use record_loader::{InvalidRecord, LoadedRecords, ValidationCode};
pub use retry_reconciler::{ReconcileReport, ReconcileSettings, RetryReconciler};
