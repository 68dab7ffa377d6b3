use crate::diagnostics::{Diagnostic, DiagnosticKind};
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

const BUILTIN_TABLES: &str = include_str!("../../data/water_products.toml");

/// Water product names of one dataset release
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Release {
    pub version: String,
    pub products: Vec<String>,
}

impl Release {
    pub fn contains(&self, product: &str) -> bool {
        self.products.iter().any(|p| p == product)
    }
}

#[derive(Deserialize)]
struct TablesFile {
    #[serde(default)]
    release: Vec<Release>,
}

/// Versioned lookup of technosphere water products, oldest release first
#[derive(Debug, Clone, PartialEq)]
pub struct WaterProductTables {
    releases: Vec<Release>,
}

impl WaterProductTables {
    pub fn new(releases: Vec<Release>) -> Result<Self> {
        if releases.is_empty() {
            bail!("water product tables must list at least one release");
        }
        Ok(Self { releases })
    }

    /// Tables shipped with the crate
    pub fn builtin() -> Result<Self> {
        Self::from_toml_str(BUILTIN_TABLES).context("parsing built-in water product tables")
    }

    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let file: TablesFile = toml::from_str(contents)?;
        Self::new(file.release)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("reading water product tables {}", path.display()))?;
        Self::from_toml_str(&contents)
    }

    pub fn versions(&self) -> impl Iterator<Item = &str> {
        self.releases.iter().map(|r| r.version.as_str())
    }

    pub fn latest(&self) -> &Release {
        // `new` rejects empty tables
        &self.releases[self.releases.len() - 1]
    }

    /// Release matching `requested`, or the latest one with a fallback diagnostic
    pub fn resolve(&self, requested: Option<&str>) -> (&Release, Option<Diagnostic>) {
        if let Some(found) = requested.and_then(|v| self.releases.iter().find(|r| r.version == v)) {
            return (found, None);
        }
        let latest = self.latest();
        let diagnostic = Diagnostic::new(
            None,
            DiagnosticKind::ReleaseFallback {
                requested: requested.unwrap_or("none").to_string(),
                used: latest.version.clone(),
            },
        )
        .emit();
        (latest, Some(diagnostic))
    }
}
