//! Configuration infrastructure
//!
//! One JSON file holds every section of [`AppConfig`]. Sections missing from
//! the file fall back to their defaults, so older files keep loading after
//! new settings are added. The sink endpoint and key can be overridden with
//! the `API_URL` and `API_KEY` environment variables.

#![allow(clippy::struct_excessive_bools)]

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tokio::fs;
use tracing::{info, warn};

use crate::crawling::{CrawlSettings, ExtractionSettings};
use crate::delivery::{DispatchSettings, ReconcileSettings, SinkConfig};

pub const ENV_API_URL: &str = "API_URL";
pub const ENV_API_KEY: &str = "API_KEY";

/// Complete application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub source: SourceConfig,
    pub crawl: CrawlConfig,
    pub extraction: ExtractionConfig,
    pub delivery: DeliveryConfig,
    pub storage: StorageConfig,
    pub http: HttpConfig,
    pub logging: LoggingConfig,
}

/// Where and how listing pages are fetched
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// Human-readable store name, used in logs
    pub name: String,

    /// Identifier of the store stamped on each record (`storeRut`)
    pub store_id: Option<String>,

    /// Category paths as understood by the listing URL template
    pub categories: Vec<String>,

    /// Listing URL with `{category}` and `{page}` placeholders
    pub listing_url_template: String,

    /// Added to the zero-based page index when filling `{page}`
    pub page_number_offset: u32,

    /// CSS selector matching one listing item
    pub item_selector: String,

    /// CSS selector of the item link inside an item; the item itself when unset
    pub link_selector: Option<String>,

    /// CSS selector of the item name inside an item; the link text when unset
    pub name_selector: Option<String>,

    /// Regex over the page text with optional `shown` and `total` named groups
    pub counter_pattern: Option<String>,
}

/// Discovery phase settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CrawlConfig {
    pub workers: usize,
    pub page_delay_ms: u64,
    /// Page cap per category, 0 for none
    pub max_pages: u32,
    /// Pages in a row with an unchanged total before a category is considered done
    pub stale_total_limit: u32,
}

/// Extraction phase settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    pub workers: usize,
    pub delay_min_ms: u64,
    pub delay_max_ms: u64,
    pub default_currency: String,
    /// Carry every discovered category in `otherCategories`
    pub keep_all_categories: bool,
    pub progress_interval_secs: u64,
}

/// Ingestion sink and batching settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeliveryConfig {
    pub api_url: String,
    pub api_key: String,
    pub batch_size: usize,
    pub batch_delay_ms: u64,
    pub record_delay_ms: u64,
    pub batch_timeout_secs: u64,
    pub record_timeout_secs: u64,
    /// Delete pending failed batches before a new dispatch
    pub clear_failure_store: bool,
    /// Replay failed batches right after dispatch in a full run
    pub reconcile_after_dispatch: bool,
}

/// Output and failure-store locations
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub output_dir: PathBuf,
    pub products_file: String,
    pub discards_file: String,
    pub batch_dir: PathBuf,
    pub residual_dir: PathBuf,
    pub dispatch_log_file: String,
}

/// Outbound HTTP settings for listing and detail sources
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub user_agent: String,
    pub timeout_seconds: u64,
    pub max_requests_per_second: u32,
}

/// Logging configuration settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "error", "warn", "info", "debug", "trace"
    pub level: String,

    /// Enable JSON formatted logs
    pub json_format: bool,

    pub console_output: bool,
    pub file_output: bool,

    /// Directory for log files; next to the executable when unset
    pub log_dir: Option<PathBuf>,

    /// File rotation: "daily" or "never"
    pub rotation: String,

    /// Number of log files to keep (older files will be deleted)
    pub max_files: usize,

    /// Module-specific log level filters (e.g., "reqwest": "warn")
    pub module_filters: HashMap<String, String>,
}

pub mod defaults {
    pub const CRAWL_WORKERS: usize = 10;
    pub const PAGE_DELAY_MS: u64 = 300;
    pub const MAX_PAGES: u32 = 100;
    pub const STALE_TOTAL_LIMIT: u32 = 3;

    pub const EXTRACTION_WORKERS: usize = 15;
    pub const DETAIL_DELAY_MIN_MS: u64 = 1500;
    pub const DETAIL_DELAY_MAX_MS: u64 = 3000;
    pub const CURRENCY: &str = "UYU";
    pub const PROGRESS_INTERVAL_SECS: u64 = 10;

    /// Local import endpoint used when `API_URL` is not set
    pub const API_URL: &str = "http://localhost:8080/api/products/import";
    /// Placeholder shared secret used when `API_KEY` is not set
    pub const API_KEY: &str = "clave_secreta_optify";
    pub const BATCH_SIZE: usize = 100;
    pub const BATCH_DELAY_MS: u64 = 500;
    pub const RECORD_DELAY_MS: u64 = 200;
    pub const BATCH_TIMEOUT_SECS: u64 = 30;
    pub const RECORD_TIMEOUT_SECS: u64 = 15;

    pub const USER_AGENT: &str = "Mozilla/5.0 (compatible; catalog-harvester/0.1)";
    pub const REQUEST_TIMEOUT_SECONDS: u64 = 30;
    pub const MAX_REQUESTS_PER_SECOND: u32 = 20;

    pub const COUNTER_PATTERN: &str = r"\(\s*\d+\s*-\s*(?P<shown>\d+)\s*de\s*(?P<total>\d+)\s*\)";
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            name: "tienda".to_string(),
            store_id: None,
            categories: Vec::new(),
            listing_url_template: "https://www.example.com/{category}?page={page}".to_string(),
            page_number_offset: 0,
            item_selector: "a.product-item".to_string(),
            link_selector: None,
            name_selector: None,
            counter_pattern: Some(defaults::COUNTER_PATTERN.to_string()),
        }
    }
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            workers: defaults::CRAWL_WORKERS,
            page_delay_ms: defaults::PAGE_DELAY_MS,
            max_pages: defaults::MAX_PAGES,
            stale_total_limit: defaults::STALE_TOTAL_LIMIT,
        }
    }
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            workers: defaults::EXTRACTION_WORKERS,
            delay_min_ms: defaults::DETAIL_DELAY_MIN_MS,
            delay_max_ms: defaults::DETAIL_DELAY_MAX_MS,
            default_currency: defaults::CURRENCY.to_string(),
            keep_all_categories: false,
            progress_interval_secs: defaults::PROGRESS_INTERVAL_SECS,
        }
    }
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            api_url: defaults::API_URL.to_string(),
            api_key: defaults::API_KEY.to_string(),
            batch_size: defaults::BATCH_SIZE,
            batch_delay_ms: defaults::BATCH_DELAY_MS,
            record_delay_ms: defaults::RECORD_DELAY_MS,
            batch_timeout_secs: defaults::BATCH_TIMEOUT_SECS,
            record_timeout_secs: defaults::RECORD_TIMEOUT_SECS,
            clear_failure_store: false,
            reconcile_after_dispatch: true,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("output"),
            products_file: "products.json".to_string(),
            discards_file: "discards.json".to_string(),
            batch_dir: PathBuf::from("batches"),
            residual_dir: PathBuf::from("batches_errors"),
            dispatch_log_file: "batch_errors_log.json".to_string(),
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            user_agent: defaults::USER_AGENT.to_string(),
            timeout_seconds: defaults::REQUEST_TIMEOUT_SECONDS,
            max_requests_per_second: defaults::MAX_REQUESTS_PER_SECOND,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        let mut module_filters = HashMap::new();
        module_filters.insert("reqwest".to_string(), "warn".to_string());
        module_filters.insert("hyper".to_string(), "warn".to_string());
        module_filters.insert("html5ever".to_string(), "error".to_string());
        module_filters.insert("selectors".to_string(), "error".to_string());

        Self {
            level: "info".to_string(),
            json_format: false,
            console_output: true,
            file_output: true,
            log_dir: None,
            rotation: "daily".to_string(),
            max_files: 7,
            module_filters,
        }
    }
}

/// Configuration rejected by [`AppConfig::validate`]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{section}.workers must be at least 1")]
    ZeroWorkers { section: &'static str },

    #[error("delivery.batch_size must be at least 1")]
    ZeroBatchSize,

    #[error("extraction delay range is inverted: min {min}ms > max {max}ms")]
    InvertedDelayRange { min: u64, max: u64 },

    #[error("delivery.api_url must not be empty")]
    EmptyApiUrl,

    #[error("http.max_requests_per_second must be at least 1")]
    ZeroRateLimit,

    #[error("source.listing_url_template must contain {{category}} and {{page}}")]
    InvalidUrlTemplate,
}

impl AppConfig {
    /// Apply `API_URL` / `API_KEY` from the process environment
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|name| std::env::var(name).ok());
    }

    /// Apply overrides from any variable lookup. Empty values are ignored.
    pub fn apply_overrides_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(url) = get(ENV_API_URL) {
            info!("Using ingestion endpoint from {}", ENV_API_URL);
            self.delivery.api_url = url;
        }
        if let Some(key) = get(ENV_API_KEY) {
            self.delivery.api_key = key;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.crawl.workers == 0 {
            return Err(ConfigError::ZeroWorkers { section: "crawl" });
        }
        if self.extraction.workers == 0 {
            return Err(ConfigError::ZeroWorkers { section: "extraction" });
        }
        if self.delivery.batch_size == 0 {
            return Err(ConfigError::ZeroBatchSize);
        }
        if self.extraction.delay_min_ms > self.extraction.delay_max_ms {
            return Err(ConfigError::InvertedDelayRange {
                min: self.extraction.delay_min_ms,
                max: self.extraction.delay_max_ms,
            });
        }
        if self.delivery.api_url.trim().is_empty() {
            return Err(ConfigError::EmptyApiUrl);
        }
        if self.http.max_requests_per_second == 0 {
            return Err(ConfigError::ZeroRateLimit);
        }
        let template = &self.source.listing_url_template;
        if !template.contains("{category}") || !template.contains("{page}") {
            return Err(ConfigError::InvalidUrlTemplate);
        }
        Ok(())
    }

    pub fn crawl_settings(&self) -> CrawlSettings {
        CrawlSettings {
            page_delay: Duration::from_millis(self.crawl.page_delay_ms),
            max_pages: (self.crawl.max_pages > 0).then_some(self.crawl.max_pages),
            stale_total_limit: self.crawl.stale_total_limit,
        }
    }

    pub fn extraction_settings(&self) -> ExtractionSettings {
        ExtractionSettings {
            delay_min: Duration::from_millis(self.extraction.delay_min_ms),
            delay_max: Duration::from_millis(self.extraction.delay_max_ms),
            default_currency: self.extraction.default_currency.clone(),
            store_id: self.source.store_id.clone(),
            keep_all_categories: self.extraction.keep_all_categories,
        }
    }

    pub fn dispatch_settings(&self) -> DispatchSettings {
        DispatchSettings {
            batch_size: NonZeroUsize::new(self.delivery.batch_size).unwrap_or(NonZeroUsize::MIN),
            delay: Duration::from_millis(self.delivery.batch_delay_ms),
            clear_failure_store: self.delivery.clear_failure_store,
            log_path: Some(self.storage.output_dir.join(&self.storage.dispatch_log_file)),
        }
    }

    pub fn reconcile_settings(&self) -> ReconcileSettings {
        ReconcileSettings {
            delay: Duration::from_millis(self.delivery.record_delay_ms),
        }
    }

    /// Sink settings for whole batches
    pub fn batch_sink_config(&self) -> SinkConfig {
        self.sink_config(self.delivery.batch_timeout_secs)
    }

    /// Sink settings for single-record replays
    pub fn record_sink_config(&self) -> SinkConfig {
        self.sink_config(self.delivery.record_timeout_secs)
    }

    fn sink_config(&self, timeout_secs: u64) -> SinkConfig {
        SinkConfig {
            url: self.delivery.api_url.clone(),
            api_key: self.delivery.api_key.clone(),
            timeout: Duration::from_secs(timeout_secs),
            user_agent: self.http.user_agent.clone(),
        }
    }

    pub fn products_path(&self) -> PathBuf {
        self.storage.output_dir.join(&self.storage.products_file)
    }

    pub fn discards_path(&self) -> PathBuf {
        self.storage.output_dir.join(&self.storage.discards_file)
    }

    /// Output files that share the products directory but hold no records
    pub fn non_record_files(&self) -> Vec<String> {
        vec![
            self.storage.discards_file.clone(),
            self.storage.dispatch_log_file.clone(),
        ]
    }
}

/// Configuration manager for loading and saving settings
pub struct ConfigManager {
    config_path: PathBuf,
}

impl ConfigManager {
    /// Get the application configuration directory
    pub fn get_config_dir() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Failed to get user config directory")?
            .join("catalog-harvester");
        Ok(config_dir)
    }

    /// Manager for the default configuration file
    pub fn new() -> Result<Self> {
        Ok(Self {
            config_path: Self::get_config_dir()?.join("config.json"),
        })
    }

    pub fn with_path(config_path: impl Into<PathBuf>) -> Self {
        Self {
            config_path: config_path.into(),
        }
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// Load configuration from file, creating default if it doesn't exist
    pub async fn load_config(&self) -> Result<AppConfig> {
        if !self.config_path.exists() {
            info!("Configuration file not found, creating default: {:?}", self.config_path);
            let default_config = AppConfig::default();
            self.save_config(&default_config).await?;
            return Ok(default_config);
        }

        let content = fs::read_to_string(&self.config_path)
            .await
            .context("Failed to read configuration file")?;

        match serde_json::from_str::<AppConfig>(&content) {
            Ok(config) => {
                info!("Loaded configuration from: {:?}", self.config_path);
                Ok(config)
            }
            Err(parse_error) => {
                warn!("Configuration file is invalid: {}", parse_error);

                let backup_path = self.config_path.with_extension("json.corrupted");
                fs::copy(&self.config_path, &backup_path)
                    .await
                    .context("Failed to back up invalid configuration")?;
                info!("Backed up invalid config to: {:?}", backup_path);

                let default_config = AppConfig::default();
                self.save_config(&default_config)
                    .await
                    .context("Failed to save default configuration")?;
                warn!("Reset to default configuration");
                Ok(default_config)
            }
        }
    }

    /// Save configuration to file
    pub async fn save_config(&self, config: &AppConfig) -> Result<()> {
        if let Some(parent) = self.config_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .await
                .context("Failed to create config directory")?;
        }

        let content = serde_json::to_string_pretty(config).context("Failed to serialize configuration")?;
        fs::write(&self.config_path, content)
            .await
            .context("Failed to write configuration file")?;

        info!("Saved configuration to: {:?}", self.config_path);
        Ok(())
    }

    /// Write a default configuration file; an existing file is only
    /// replaced when `overwrite` is set
    pub async fn initialize(&self, overwrite: bool) -> Result<AppConfig> {
        if self.config_path.exists() && !overwrite {
            anyhow::bail!(
                "Configuration already exists at {}; pass --force to overwrite",
                self.config_path.display()
            );
        }
        let config = AppConfig::default();
        self.save_config(&config).await?;
        Ok(config)
    }
}
