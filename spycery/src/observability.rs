//! Observability: tracing init for console and file log modes.
//!
//! Uses config::ObservabilityConfig for SPYCERY_QUIET, LOG_LEVEL, LOG_JSON, LOG_MODE, LOG_DIR.

use anyhow::{Context, Result};
use std::fs::{self, OpenOptions};
use std::path::PathBuf;
use std::sync::Mutex;

use clap::ValueEnum;
use spycery_core::config::ObservabilityConfig;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::{prelude::*, EnvFilter, Layer};

/// Where log records go.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum LogMode {
    /// No log output
    None,
    /// stderr
    #[default]
    Console,
    /// stderr plus a log file
    File,
}

impl LogMode {
    /// SPYCERY_LOG_MODE, falling back to console on unknown values.
    pub fn from_config(cfg: &ObservabilityConfig) -> Self {
        match LogMode::from_str(&cfg.log_mode, true) {
            Ok(mode) => mode,
            Err(_) => {
                eprintln!(
                    "Warning: invalid SPYCERY_LOG_MODE '{}', using console",
                    cfg.log_mode
                );
                LogMode::Console
            }
        }
    }
}

fn filter_directive(cfg: &ObservabilityConfig, level: Option<LevelFilter>) -> String {
    if cfg.quiet {
        return "spycery=warn,spycery_env=warn".to_string();
    }
    match level {
        Some(level) => {
            let level = level.to_string().to_lowercase();
            format!("spycery={},spycery_env={}", level, level)
        }
        None => cfg.log_level.clone(),
    }
}

/// Initialize tracing. Call at process startup.
///
/// Returns the log file path in file mode. When SPYCERY_QUIET=1 only WARN and
/// above are logged; an explicit `level` takes precedence over SPYCERY_LOG_LEVEL.
pub fn init_tracing(
    mode: LogMode,
    log_name: &str,
    level: Option<LevelFilter>,
) -> Result<Option<PathBuf>> {
    if mode == LogMode::None {
        return Ok(None);
    }
    let cfg = ObservabilityConfig::from_env();
    let directive = filter_directive(cfg, level);
    let filter = if level.is_some() {
        EnvFilter::new(&directive)
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&directive))
    };

    let console = if cfg.log_json {
        tracing_subscriber::fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_thread_ids(false)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_thread_ids(false)
            .boxed()
    };

    let (file_layer, log_path) = if mode == LogMode::File {
        let dir = PathBuf::from(&cfg.log_dir);
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create log directory: {}", dir.display()))?;
        let path = dir.join(format!("{}.log", log_name));
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("Failed to open log file: {}", path.display()))?;
        let layer = tracing_subscriber::fmt::layer()
            .with_writer(Mutex::new(file))
            .with_ansi(false)
            .with_target(true);
        (Some(layer), Some(path))
    } else {
        (None, None)
    };

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(file_layer)
        .try_init();
    Ok(log_path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg(quiet: bool) -> ObservabilityConfig {
        ObservabilityConfig {
            quiet,
            log_level: "spycery=info,spycery_env=info".to_string(),
            log_json: false,
            log_mode: "FILE".to_string(),
            log_dir: "results".to_string(),
        }
    }

    #[test]
    fn test_log_mode_from_config() {
        assert_eq!(LogMode::from_config(&cfg(false)), LogMode::File);
        let mut bad = cfg(false);
        bad.log_mode = "syslog".to_string();
        assert_eq!(LogMode::from_config(&bad), LogMode::Console);
    }

    #[test]
    fn test_filter_directive() {
        assert_eq!(filter_directive(&cfg(true), Some(LevelFilter::DEBUG)), "spycery=warn,spycery_env=warn");
        assert_eq!(
            filter_directive(&cfg(false), Some(LevelFilter::DEBUG)),
            "spycery=debug,spycery_env=debug"
        );
        assert_eq!(filter_directive(&cfg(false), None), "spycery=info,spycery_env=info");
    }
}
