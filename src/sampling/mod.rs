pub mod materializer;

pub use materializer::MonteCarloMaterializer;

use crate::balance::{Expr, Parameter};
use crate::data::NodeKey;
use crate::error::SamplingError;
use std::collections::HashMap;

/// Formula whose draws become one output row
#[derive(Debug, Clone, PartialEq)]
pub struct SamplingTarget {
    pub name: String,
    pub formula: Expr,
}

impl SamplingTarget {
    /// Target for the flow at `index` of the owning process
    pub fn for_flow(index: usize, formula: Expr) -> Self {
        Self {
            name: Self::flow_name(index),
            formula,
        }
    }

    pub fn flow_name(index: usize) -> String {
        format!("flow_{}", index)
    }
}

/// Everything a materializer needs for one process
#[derive(Debug, Clone)]
pub struct SamplingRequest<'a> {
    pub owner: &'a NodeKey,
    /// Dependency-ordered parameter list
    pub parameters: &'a [Parameter],
    pub targets: Vec<SamplingTarget>,
}

/// Named rows of length `iterations`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Samples {
    iterations: usize,
    rows: HashMap<String, Vec<f64>>,
}

impl Samples {
    pub fn new(iterations: usize) -> Self {
        Self {
            iterations,
            rows: HashMap::new(),
        }
    }

    pub fn insert(&mut self, name: impl Into<String>, row: Vec<f64>) {
        self.rows.insert(name.into(), row);
    }

    pub fn row(&self, name: &str) -> Option<&[f64]> {
        self.rows.get(name).map(Vec::as_slice)
    }

    pub fn iterations(&self) -> usize {
        self.iterations
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Turns parameters and formulas into numeric draws
pub trait Materializer: Sync {
    fn materialize(&self, request: &SamplingRequest<'_>, iterations: usize) -> Result<Samples, SamplingError>;
}
