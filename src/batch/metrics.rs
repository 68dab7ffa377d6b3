//! Prometheus counters for batch runs

use crate::balance::Strategy;
use anyhow::{Context, Result};
use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};

/// Counters for one balancing run
#[derive(Clone)]
pub struct BalancerMetrics {
    registry: Registry,

    /// Processes balanced, by strategy
    pub processes_total: IntCounterVec,

    /// Processes whose balancing failed
    pub failures_total: IntCounter,

    /// Sampled rows added to the collection
    pub sample_rows_total: IntCounter,
}

impl BalancerMetrics {
    /// Create and register the counters on a fresh registry
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();

        let processes_total = IntCounterVec::new(
            Opts::new("water_processes_total", "Processes balanced by strategy"),
            &["strategy"],
        )?;
        registry.register(Box::new(processes_total.clone()))?;
        // Every strategy is exported from the start, even with a zero count
        for strategy in Strategy::ALL {
            processes_total.with_label_values(&[strategy.as_str()]);
        }

        let failures_total = IntCounter::new(
            "water_process_failures_total",
            "Processes whose balancing failed",
        )?;
        registry.register(Box::new(failures_total.clone()))?;

        let sample_rows_total = IntCounter::new(
            "water_sample_rows_total",
            "Sampled rows added to the matrix collection",
        )?;
        registry.register(Box::new(sample_rows_total.clone()))?;

        Ok(Self {
            registry,
            processes_total,
            failures_total,
            sample_rows_total,
        })
    }

    pub fn record_outcome(&self, strategy: Strategy, rows: usize) {
        self.processes_total
            .with_label_values(&[strategy.as_str()])
            .inc();
        self.sample_rows_total.inc_by(rows as u64);
    }

    pub fn record_failure(&self) {
        self.failures_total.inc();
    }

    /// Export in Prometheus text format
    pub fn render(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder
            .encode(&self.registry.gather(), &mut buffer)
            .context("encoding metrics")?;
        String::from_utf8(buffer).context("metrics are not valid UTF-8")
    }
}
