use super::assembler::{MatrixBlock, MatrixCollection};
use crate::data::NodeKey;
use crate::diagnostics::{Diagnostic, DiagnosticKind};
use crate::error::PackageError;
use chrono::Utc;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

const DESCRIPTOR_FILE: &str = "datapackage.json";

/// Where and how to write a sample package
#[derive(Debug, Clone, PartialEq)]
pub struct PackageOptions {
    pub name: String,
    /// Explicit package id; defaults to the content hash
    pub id: Option<String>,
    pub directory: PathBuf,
    pub overwrite: bool,
    pub seed: Option<u64>,
}

#[derive(Serialize)]
struct BlockFile<'a> {
    indices: Vec<(&'a NodeKey, &'a NodeKey, &'static str)>,
    samples: &'a [Vec<f64>],
}

impl<'a> BlockFile<'a> {
    fn new(block: &'a MatrixBlock) -> Self {
        Self {
            indices: block.indices.iter().map(|i| i.to_triple()).collect(),
            samples: &block.samples,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PackageResource {
    pub name: String,
    pub path: String,
    pub rows: usize,
}

#[derive(Serialize)]
struct Descriptor<'a> {
    name: &'a str,
    id: &'a str,
    version: &'static str,
    created_at: String,
    seed: Option<u64>,
    iterations: usize,
    resources: &'a [PackageResource],
}

/// A written package of sampled matrices
#[derive(Debug, Clone, PartialEq)]
pub struct SamplePackage {
    pub id: String,
    pub path: PathBuf,
    pub resources: Vec<PackageResource>,
}

impl SamplePackage {
    /// Write `collection` as `<directory>/<id>/`
    ///
    /// Returns `None` (with a logged diagnostic) when there is nothing to write.
    pub fn write(collection: &MatrixCollection, options: &PackageOptions) -> Result<Option<Self>, PackageError> {
        if collection.is_empty() {
            Diagnostic::new(None, DiagnosticKind::NoSamples).emit();
            return Ok(None);
        }

        let mut payloads = Vec::new();
        for block in collection.blocks().filter(|b| !b.is_empty()) {
            payloads.push((block, serde_json::to_vec(&BlockFile::new(block))?));
        }

        let id = match &options.id {
            Some(id) => id.clone(),
            None => content_id(&options.name, payloads.iter().map(|(_, bytes)| bytes.as_slice())),
        };

        let path = options.directory.join(&id);
        prepare_directory(&path, options.overwrite)?;

        let mut resources = Vec::with_capacity(payloads.len());
        for (block, bytes) in &payloads {
            let file_name = format!("{}.json", block.kind);
            fs::write(path.join(&file_name), bytes)?;
            resources.push(PackageResource {
                name: block.kind.as_str().to_string(),
                path: file_name,
                rows: block.len(),
            });
        }

        let descriptor = Descriptor {
            name: &options.name,
            id: &id,
            version: env!("CARGO_PKG_VERSION"),
            created_at: Utc::now().to_rfc3339(),
            seed: options.seed,
            iterations: collection.iterations().unwrap_or(0),
            resources: &resources,
        };
        fs::write(path.join(DESCRIPTOR_FILE), serde_json::to_vec_pretty(&descriptor)?)?;

        info!(id = %id, path = %path.display(), rows = collection.row_count(), "Wrote sample package");

        Ok(Some(Self { id, path, resources }))
    }
}

fn content_id<'a>(name: &str, payloads: impl Iterator<Item = &'a [u8]>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(name.as_bytes());
    for payload in payloads {
        hasher.update(payload);
    }
    hex::encode(hasher.finalize())
}

fn prepare_directory(path: &Path, overwrite: bool) -> Result<(), PackageError> {
    if path.exists() {
        if !overwrite {
            return Err(PackageError::AlreadyExists(path.display().to_string()));
        }
        fs::remove_dir_all(path)?;
    }
    fs::create_dir_all(path)?;
    Ok(())
}
