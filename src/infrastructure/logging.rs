//! Logging system configuration and initialization
//!
//! - Console and file output, each optional
//! - Daily or single-file rotation with old files pruned on start
//! - Optional JSON lines for the file output
//! - `RUST_LOG` overrides the configured filter

#![allow(clippy::uninlined_format_args)]

use anyhow::{Result, anyhow};
use chrono::Local;
use lazy_static::lazy_static;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{info, warn};
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::{
    EnvFilter, Registry,
    fmt::{self, time::FormatTime},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

pub use crate::infrastructure::config::LoggingConfig;

const LOG_FILE_PREFIX: &str = "catalog-harvester.log";

// Keeps the non-blocking file writers flushing until process exit
lazy_static! {
    static ref LOG_GUARDS: Mutex<Vec<tracing_appender::non_blocking::WorkerGuard>> = Mutex::new(Vec::new());
}

/// Local wall-clock timestamps with offset
struct LocalTimeFormatter;

impl FormatTime for LocalTimeFormatter {
    fn format_time(&self, w: &mut fmt::format::Writer<'_>) -> std::fmt::Result {
        write!(w, "{}", Local::now().format("%Y-%m-%d %H:%M:%S%.3f %:z"))
    }
}

/// Default log directory: `logs/` next to the executable
pub fn get_log_directory() -> PathBuf {
    let exe_dir = std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(Path::to_path_buf))
        .unwrap_or_else(|| std::env::current_dir().unwrap_or_default());

    exe_dir.join("logs")
}

fn resolve_log_directory(config: &LoggingConfig) -> PathBuf {
    config.log_dir.clone().unwrap_or_else(get_log_directory)
}

/// Filter used when `RUST_LOG` is not set.
///
/// HTTP and HTML parsing internals are held at `warn` unless the level is
/// `trace`; per-module entries from the config are applied last.
pub fn build_env_filter(config: &LoggingConfig) -> Result<EnvFilter> {
    let mut directives = vec![config.level.clone()];

    if !config.level.eq_ignore_ascii_case("trace") {
        directives.extend(
            ["reqwest=warn", "hyper=warn", "hyper_util=warn", "h2=warn", "html5ever=error", "selectors=error"]
                .map(String::from),
        );
        directives.push(format!("catalog_harvester={}", config.level));
    }

    let mut modules: Vec<_> = config.module_filters.iter().collect();
    modules.sort();
    directives.extend(modules.into_iter().map(|(module, level)| format!("{module}={level}")));

    let mut filter = EnvFilter::new("");
    for directive in directives {
        filter = filter.add_directive(
            directive
                .parse()
                .map_err(|e| anyhow!("Invalid log directive '{}': {}", directive, e))?,
        );
    }
    Ok(filter)
}

/// Initialize the logging system with default configuration
pub fn init_logging() -> Result<()> {
    init_logging_with_config(&LoggingConfig::default())
}

/// Initialize logging with custom configuration.
///
/// Fails if no output is enabled or a global subscriber is already set.
pub fn init_logging_with_config(config: &LoggingConfig) -> Result<()> {
    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => build_env_filter(config)?,
    };
    let registry = Registry::default().with(env_filter);

    let console_layer = config.console_output.then(|| {
        fmt::Layer::new()
            .with_writer(std::io::stdout)
            .with_timer(LocalTimeFormatter)
            .with_target(false)
    });

    let mut log_dir = None;
    let (json_file_layer, text_file_layer) = if config.file_output {
        let dir = resolve_log_directory(config);
        std::fs::create_dir_all(&dir)
            .map_err(|e| anyhow!("Failed to create log directory {:?}: {}", dir, e))?;
        cleanup_old_logs(&dir, config.max_files)?;

        let appender = match config.rotation.as_str() {
            "never" => rolling::never(&dir, LOG_FILE_PREFIX),
            _ => rolling::daily(&dir, LOG_FILE_PREFIX),
        };
        let (file_writer, file_guard) = non_blocking(appender);
        LOG_GUARDS
            .lock()
            .map_err(|_| anyhow!("Log guard registry poisoned"))?
            .push(file_guard);
        log_dir = Some(dir);

        if config.json_format {
            let layer = fmt::Layer::new()
                .json()
                .with_writer(file_writer)
                .with_timer(LocalTimeFormatter)
                .with_target(true)
                .with_thread_ids(true)
                .with_current_span(true)
                .with_ansi(false);
            (Some(layer), None)
        } else {
            let layer = fmt::Layer::new()
                .with_writer(file_writer)
                .with_timer(LocalTimeFormatter)
                .with_target(false)
                .with_ansi(false);
            (None, Some(layer))
        }
    } else {
        (None, None)
    };

    if console_layer.is_none() && log_dir.is_none() {
        return Err(anyhow!("No logging output configured"));
    }

    registry
        .with(console_layer)
        .with(json_file_layer)
        .with(text_file_layer)
        .try_init()
        .map_err(|e| anyhow!("Failed to install log subscriber: {}", e))?;

    info!("Logging system initialized");
    info!("Log level: {}", config.level);
    if let Some(dir) = log_dir {
        info!("Log directory: {:?} (rotation: {})", dir, config.rotation);
    }
    Ok(())
}

/// Log system information for diagnostics
pub fn log_system_info() {
    info!("=== Catalog Harvester ===");
    info!("Application version: {}", env!("CARGO_PKG_VERSION"));
    info!("Operating system: {}", std::env::consts::OS);
    info!("Architecture: {}", std::env::consts::ARCH);

    if let Ok(current_dir) = std::env::current_dir() {
        info!("Working directory: {:?}", current_dir);
    }
}

/// Delete all but the `max_files` newest log files in `log_dir`
pub fn cleanup_old_logs(log_dir: &Path, max_files: usize) -> Result<usize> {
    if !log_dir.exists() {
        return Ok(0);
    }

    let mut log_files = Vec::new();
    for entry in std::fs::read_dir(log_dir)? {
        let entry = entry?;
        let path = entry.path();
        let is_log = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with(LOG_FILE_PREFIX));
        if !path.is_file() || !is_log {
            continue;
        }
        if let Ok(modified) = entry.metadata().and_then(|m| m.modified()) {
            log_files.push((path, modified));
        }
    }

    // Newest first
    log_files.sort_by(|a, b| b.1.cmp(&a.1));

    let mut removed = 0;
    for (path, _) in log_files.iter().skip(max_files) {
        match std::fs::remove_file(path) {
            Ok(()) => removed += 1,
            Err(e) => warn!("Failed to remove old log file {:?}: {}", path, e),
        }
    }
    Ok(removed)
}
