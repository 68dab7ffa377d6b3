use serde::{Deserialize, Serialize};
use anyhow::{Context, Result};
use std::path::Path;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub general: GeneralConfig,
    pub sampling: SamplingConfig,
    pub lookup: LookupConfig,
    pub output: OutputConfig,
    pub logging: LoggingConfig,
    pub metrics: MetricsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Inventory JSON file
    pub inventory: String,
    pub database: String,
    pub biosphere: String,
    pub release_version: Option<String>,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            inventory: "data/inventory.json".to_string(),
            database: String::new(),
            biosphere: "biosphere3".to_string(),
            release_version: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplingConfig {
    pub iterations: usize,
    pub seed: Option<u64>,
    /// Worker threads; 1 balances sequentially
    pub workers: usize,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            iterations: 1000,
            seed: None,
            workers: 1,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LookupConfig {
    /// Water product tables; the built-in tables are used when empty
    pub tables_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub directory: String,
    pub package_name: String,
    pub overwrite: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: "output".to_string(),
            package_name: "water balancing".to_string(),
            overwrite: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub output: String,
    pub file_path: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            output: "pretty".to_string(),
            file_path: String::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub enabled: bool,
    /// File receiving the Prometheus text export
    pub output_path: String,
}

impl Config {
    /// Load configuration from TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config: Config = toml::from_str(&contents)
            .with_context(|| format!("parsing config {}", path.display()))?;
        Ok(config)
    }

    /// Load from `$CONFIG_FILE` or the default path.
    ///
    /// A config file that does not exist yields the defaults. A file that exists
    /// and cannot be read or parsed is still an error.
    pub fn load_or_default() -> Result<Self> {
        Self::from_file_or_default(Self::default_path())
    }

    pub fn from_file_or_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            tracing::debug!(path = %path.display(), "No config file, using defaults");
            return Ok(Self::default());
        }
        Self::from_file(path)
    }

    fn default_path() -> String {
        std::env::var("CONFIG_FILE").unwrap_or_else(|_| "config/water_balancer.toml".to_string())
    }
}
