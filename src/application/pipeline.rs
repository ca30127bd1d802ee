//! Harvest pipeline
//!
//! Wires the crawl, extraction and delivery engines to their collaborators
//! and runs them in order:
//!
//! 1. harvest: discovery, barrier, extraction, output files
//! 2. dispatch: batched delivery of the harvested records
//! 3. reconcile: single-record replay of batches that failed
//!
//! Harvest failures abort the run. Dispatch and reconcile failures are
//! reported in the [`RunSummary`] and the run carries on.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::crawling::{
    CategoryCrawler, CrawlPhaseReport, CrawlScheduler, DetailExtractor, DiscardLedger, DiscoveryIndex,
    ExtractionProgress, ExtractionScheduler, spawn_progress_reporter,
};
use crate::delivery::record_loader::{self, InvalidRecord};
use crate::delivery::{
    BatchDispatcher, DispatchReport, DryRunSink, FailureStore, HttpIngestionSink, ReconcileReport, RetryReconciler,
};
use crate::domain::{DetailSource, IngestionSink, ListingSource, NormalizedRecord};
use crate::infrastructure::config::AppConfig;
use crate::infrastructure::http_client::{HttpClient, HttpClientConfig};
use crate::infrastructure::json_store;
use crate::infrastructure::sources::{HtmlListingSource, JsonLdDetailSource};

/// External collaborators of a pipeline
#[derive(Clone)]
pub struct Collaborators {
    pub listing: Arc<dyn ListingSource>,
    pub detail: Arc<dyn DetailSource>,
    /// Sink used for whole batches
    pub batch_sink: Arc<dyn IngestionSink>,
    /// Sink used for single-record replays
    pub record_sink: Arc<dyn IngestionSink>,
}

/// Result of the harvest step
#[derive(Debug, Clone)]
pub struct HarvestReport {
    pub crawl: CrawlPhaseReport,
    pub progress: ExtractionProgress,
    pub records: Vec<NormalizedRecord>,
    pub discards_by_reason: BTreeMap<&'static str, usize>,
    pub products_path: PathBuf,
    pub discards_path: PathBuf,
}

/// Result of a standalone import
#[derive(Debug, Clone)]
pub struct ImportReport {
    pub valid: usize,
    pub invalid: usize,
    /// `_errores` file, written only when some records were invalid
    pub invalid_path: Option<PathBuf>,
    pub skipped_files: Vec<PathBuf>,
    pub dispatch: DispatchReport,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "detail", rename_all = "lowercase")]
pub enum StepStatus {
    Ok,
    Failed(String),
    Skipped(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepResult {
    pub name: &'static str,
    #[serde(flatten)]
    pub status: StepStatus,
    pub elapsed_ms: u128,
}

/// Per-step outcome and headline counters of a full run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub steps: Vec<StepResult>,
    pub discovered: usize,
    pub extracted: usize,
    pub discarded: usize,
    pub delivered: usize,
    pub failed_batches: usize,
    pub recovered: usize,
    pub residual: usize,
}

impl RunSummary {
    /// No step failed; skipped steps do not count as failures
    pub fn all_ok(&self) -> bool {
        !self.steps.iter().any(|s| matches!(s.status, StepStatus::Failed(_)))
    }

    fn push(&mut self, name: &'static str, started: Instant, status: StepStatus) {
        self.steps.push(StepResult {
            name,
            status,
            elapsed_ms: started.elapsed().as_millis(),
        });
    }

    pub fn log(&self) {
        info!("=== Pipeline summary ===");
        if let (Some(start), Some(end)) = (self.started_at, self.finished_at) {
            info!("Started {} / finished {}", start.to_rfc3339(), end.to_rfc3339());
        }
        for step in &self.steps {
            match &step.status {
                StepStatus::Ok => info!(" - {}: OK ({} ms)", step.name, step.elapsed_ms),
                StepStatus::Failed(reason) => error!(" - {}: ERROR ({})", step.name, reason),
                StepStatus::Skipped(reason) => warn!(" - {}: SKIPPED ({})", step.name, reason),
            }
        }
        info!("{}", self);
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "discovered {}, extracted {}, discarded {}, delivered {}, failed batches {}, recovered {}, residual {}",
            self.discovered,
            self.extracted,
            self.discarded,
            self.delivered,
            self.failed_batches,
            self.recovered,
            self.residual
        )
    }
}

pub struct HarvestPipeline {
    config: AppConfig,
    collaborators: Collaborators,
    store: FailureStore,
}

impl HarvestPipeline {
    pub fn new(config: AppConfig, collaborators: Collaborators) -> Self {
        let store = FailureStore::new(&config.storage.batch_dir, &config.storage.residual_dir);
        Self {
            config,
            collaborators,
            store,
        }
    }

    /// Build the HTTP-backed pipeline described by `config`.
    ///
    /// With `dry_run` nothing is sent to the ingestion endpoint.
    pub fn from_config(config: AppConfig, dry_run: bool) -> Result<Self> {
        config.validate().context("Invalid configuration")?;

        let http = Arc::new(HttpClient::new(HttpClientConfig::from(&config.http))?);
        let listing = HtmlListingSource::new(Arc::clone(&http), &config.source)
            .context("Invalid listing source configuration")?;
        let detail = JsonLdDetailSource::new(http);

        let (batch_sink, record_sink): (Arc<dyn IngestionSink>, Arc<dyn IngestionSink>) = if dry_run {
            (Arc::new(DryRunSink), Arc::new(DryRunSink))
        } else {
            (
                Arc::new(HttpIngestionSink::new(&config.batch_sink_config())?),
                Arc::new(HttpIngestionSink::new(&config.record_sink_config())?),
            )
        };

        Ok(Self::new(
            config,
            Collaborators {
                listing: Arc::new(listing),
                detail: Arc::new(detail),
                batch_sink,
                record_sink,
            },
        ))
    }

    pub const fn config(&self) -> &AppConfig {
        &self.config
    }

    pub const fn failure_store(&self) -> &FailureStore {
        &self.store
    }

    /// Crawl every configured category, extract the discovered items and
    /// write `products.json` and `discards.json`.
    ///
    /// A cancelled run still writes whatever was collected before the token fired.
    pub async fn harvest(&self, cancel: &CancellationToken) -> Result<HarvestReport> {
        info!(
            "Harvesting {} ({} categories)",
            self.config.source.name,
            self.config.source.categories.len()
        );

        let crawler = CategoryCrawler::new(
            Arc::clone(&self.collaborators.listing),
            DiscoveryIndex::new(),
            self.config.crawl_settings(),
        );
        let crawl_scheduler = CrawlScheduler::new(crawler, self.config.crawl.workers);
        let crawl = crawl_scheduler
            .run(self.config.source.categories.clone(), cancel)
            .await
            .context("Discovery phase failed")?;

        // Barrier: extraction only ever sees the complete, frozen index
        let snapshot = crawl_scheduler.index().snapshot().await;

        let extractor = DetailExtractor::new(
            Arc::clone(&self.collaborators.detail),
            self.config.extraction_settings(),
        );
        let ledger = DiscardLedger::new();
        let extraction = ExtractionScheduler::new(extractor, ledger.clone(), self.config.extraction.workers);

        let reporter_stop = cancel.child_token();
        let reporter = spawn_progress_reporter(
            extraction.subscribe(),
            Duration::from_secs(self.config.extraction.progress_interval_secs.max(1)),
            reporter_stop.clone(),
        );
        let outcome = extraction.run(&snapshot, cancel).await;
        reporter_stop.cancel();
        if let Err(e) = reporter.await {
            warn!("Progress reporter ended abnormally: {}", e);
        }
        let outcome = outcome.context("Extraction phase failed")?;

        let products_path = self.config.products_path();
        let discards_path = self.config.discards_path();
        json_store::write_json_array(&products_path, &outcome.records)
            .await
            .context("Failed to write products file")?;
        ledger
            .write_to(&discards_path)
            .await
            .context("Failed to write discards file")?;

        info!(
            "Harvest complete: {} records written to {}",
            outcome.records.len(),
            products_path.display()
        );

        Ok(HarvestReport {
            crawl,
            progress: outcome.progress,
            records: outcome.records,
            discards_by_reason: ledger.counts_by_reason().await,
            products_path,
            discards_path,
        })
    }

    /// Deliver `records` in batches; rejected batches land in the failure store
    pub async fn dispatch(&self, records: Vec<NormalizedRecord>) -> Result<DispatchReport> {
        let dispatcher = BatchDispatcher::new(
            Arc::clone(&self.collaborators.batch_sink),
            self.store.clone(),
            self.config.dispatch_settings(),
        );
        dispatcher.dispatch(records).await.context("Dispatch failed")
    }

    /// Validate and deliver records from a file or directory of JSON arrays.
    ///
    /// Invalid records are written next to the source with their error codes.
    pub async fn import(&self, path: &Path) -> Result<ImportReport> {
        let loaded = record_loader::load_records(path, &self.config.non_record_files())
            .await
            .with_context(|| format!("Failed to load records from {}", path.display()))?;

        let invalid_path = if loaded.invalid.is_empty() {
            None
        } else {
            let target = record_loader::invalid_records_path(path);
            json_store::write_json_array::<InvalidRecord>(&target, &loaded.invalid)
                .await
                .context("Failed to write invalid records")?;
            warn!(
                "{} invalid records written to {}",
                loaded.invalid.len(),
                target.display()
            );
            Some(target)
        };

        let valid = loaded.valid.len();
        let dispatch = self.dispatch(loaded.valid).await?;

        Ok(ImportReport {
            valid,
            invalid: loaded.invalid.len(),
            invalid_path,
            skipped_files: loaded.skipped_files,
            dispatch,
        })
    }

    /// Replay every pending failed batch one record at a time
    pub async fn reconcile(&self) -> Result<ReconcileReport> {
        let reconciler = RetryReconciler::new(
            Arc::clone(&self.collaborators.record_sink),
            self.store.clone(),
            self.config.reconcile_settings(),
        );
        reconciler.reconcile().await.context("Reconcile failed")
    }

    /// Harvest, dispatch and, when `reconcile` is set, replay failed batches.
    ///
    /// Only a harvest failure is returned as an error.
    pub async fn run(&self, cancel: &CancellationToken, reconcile: bool) -> Result<RunSummary> {
        let mut summary = RunSummary {
            started_at: Some(Utc::now()),
            ..RunSummary::default()
        };

        let started = Instant::now();
        let harvest = self.harvest(cancel).await?;
        summary.discovered = harvest.crawl.discovered_keys;
        summary.extracted = harvest.progress.extracted;
        summary.discarded = harvest.progress.discarded;
        summary.push("harvest", started, StepStatus::Ok);

        if cancel.is_cancelled() {
            let reason = "run cancelled".to_string();
            summary.push("dispatch", Instant::now(), StepStatus::Skipped(reason.clone()));
            summary.push("reconcile", Instant::now(), StepStatus::Skipped(reason));
            summary.finished_at = Some(Utc::now());
            return Ok(summary);
        }

        let started = Instant::now();
        match self.dispatch(harvest.records).await {
            Ok(report) => {
                summary.delivered = report.delivered_count;
                summary.failed_batches = report.failed_batches.len();
                summary.push("dispatch", started, StepStatus::Ok);
            }
            Err(e) => {
                error!("Dispatch step failed: {:#}", e);
                summary.push("dispatch", started, StepStatus::Failed(format!("{e:#}")));
            }
        }

        let started = Instant::now();
        if !reconcile {
            summary.push("reconcile", started, StepStatus::Skipped("disabled".to_string()));
            summary.finished_at = Some(Utc::now());
            return Ok(summary);
        }
        match self.reconcile().await {
            Ok(report) => {
                summary.recovered = report.delivered();
                summary.residual = report.residual();
                summary.push("reconcile", started, StepStatus::Ok);
            }
            Err(e) => {
                error!("Reconcile step failed: {:#}", e);
                summary.push("reconcile", started, StepStatus::Failed(format!("{e:#}")));
            }
        }

        summary.finished_at = Some(Utc::now());
        Ok(summary)
    }
}
