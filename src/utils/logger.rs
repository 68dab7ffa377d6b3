//! Tracing setup for balancing runs
//!
//! Interactive runs log human-readable events to stderr so stdout stays free
//! for the report and dry-run plans. Batch runs over a whole database usually
//! want JSON lines, optionally appended to a file next to the package.

use crate::utils::config::LoggingConfig;
use anyhow::{bail, Context, Result};
use std::fs::File;
use std::path::Path;
use std::sync::Mutex;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// How balancing events are rendered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

impl LogFormat {
    pub fn parse(name: &str) -> Result<Self> {
        match name {
            "pretty" | "" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            other => bail!("unknown log output '{}', expected 'pretty' or 'json'", other),
        }
    }
}

fn open_log_file(path: &Path) -> Result<Mutex<File>> {
    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("opening log file {}", path.display()))?;
    Ok(Mutex::new(file))
}

/// Install the global subscriber
///
/// `RUST_LOG` overrides `level`. Fails when the log file cannot be opened or
/// a subscriber is already installed.
pub fn init_logger(level: &str, format: LogFormat, log_file: Option<&Path>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let registry = tracing_subscriber::registry().with(filter);

    match (format, log_file) {
        (LogFormat::Json, Some(path)) => {
            let file = open_log_file(path)?;
            registry.with(fmt::layer().json().with_writer(file)).try_init()?;
        }
        (LogFormat::Json, None) => {
            registry.with(fmt::layer().json().with_writer(std::io::stderr)).try_init()?;
        }
        (LogFormat::Pretty, Some(path)) => {
            let file = open_log_file(path)?;
            registry
                .with(fmt::layer().with_ansi(false).with_writer(file))
                .try_init()?;
        }
        (LogFormat::Pretty, None) => {
            registry.with(fmt::layer().pretty().with_writer(std::io::stderr)).try_init()?;
        }
    }

    Ok(())
}

/// Install the subscriber described by the `[logging]` section
pub fn init_from_config(config: &LoggingConfig) -> Result<()> {
    let format = LogFormat::parse(&config.output)?;
    let log_file = (!config.file_path.is_empty()).then(|| Path::new(&config.file_path));
    init_logger(&config.level, format, log_file)
}
