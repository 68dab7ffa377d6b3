use super::metrics::BalancerMetrics;
use crate::assembly::MatrixCollection;
use crate::balance::{BalancePlan, ProcessBalancer, ProcessOutcome, Strategy, WaterUniverse};
use crate::data::{ElementaryKind, Inventory, NodeKey, Process, WaterProductTables};
use crate::diagnostics::{Diagnostic, DiagnosticKind};
use crate::error::{BalanceError, Result};
use crate::sampling::Materializer;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::panic::{self, AssertUnwindSafe};
use tracing::{info, warn};

/// Marker in elementary flow names that makes them water flows
const WATER_NAME_MARKER: &str = "Water";

/// Which collection to balance, against which biosphere and release
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BalancerSettings {
    pub database: String,
    #[serde(default = "default_biosphere")]
    pub biosphere: String,
    /// Release version of the water product tables
    #[serde(default)]
    pub release: Option<String>,
}

fn default_biosphere() -> String {
    "biosphere3".to_string()
}

impl BalancerSettings {
    pub fn new(database: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            biosphere: default_biosphere(),
            release: None,
        }
    }

    pub fn with_biosphere(mut self, biosphere: impl Into<String>) -> Self {
        self.biosphere = biosphere.into();
        self
    }

    pub fn with_release(mut self, release: impl Into<String>) -> Self {
        self.release = Some(release.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessFailure {
    pub key: NodeKey,
    pub message: String,
}

/// Tally of a batch run
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatchReport {
    pub processed: usize,
    pub strategies: BTreeMap<String, usize>,
    pub rows: usize,
    pub failures: Vec<ProcessFailure>,
}

impl BatchReport {
    pub fn count(&self, strategy: Strategy) -> usize {
        self.strategies.get(strategy.as_str()).copied().unwrap_or(0)
    }

    fn record_outcome(&mut self, outcome: &ProcessOutcome) {
        self.processed += 1;
        *self.strategies.entry(outcome.strategy.as_str().to_string()).or_default() += 1;
        self.rows += outcome.row_count();
    }

    fn record_failure(&mut self, key: NodeKey, error: &BalanceError) {
        self.processed += 1;
        self.failures.push(ProcessFailure {
            key,
            message: error.to_string(),
        });
    }
}

/// Balances every process of one collection and accumulates the sampled matrices
pub struct DatabaseBalancer {
    database: String,
    release: String,
    universe: WaterUniverse,
    diagnostics: Vec<Diagnostic>,
    collection: MatrixCollection,
    report: BatchReport,
    metrics: Option<BalancerMetrics>,
}

impl DatabaseBalancer {
    /// Validate the settings and identify the water universe of the collection
    pub fn new(inventory: &Inventory, settings: &BalancerSettings, tables: &WaterProductTables) -> Result<Self> {
        for name in [&settings.database, &settings.biosphere] {
            if !inventory.has_database(name) {
                return Err(BalanceError::DatabaseNotFound(name.clone()));
            }
        }

        let mut diagnostics = Vec::new();
        let (release, fallback) = tables.resolve(settings.release.as_deref());
        diagnostics.extend(fallback);

        // Water-supplying and water-treating processes
        let mut transformation = Vec::new();
        let mut treatment = Vec::new();
        for process in inventory.processes_in(&settings.database) {
            if !release.contains(&process.reference_product) {
                continue;
            }
            if process.production_amount > 0.0 {
                transformation.push(process.key.clone());
            } else if process.production_amount < 0.0 {
                treatment.push(process.key.clone());
            } else {
                diagnostics.push(
                    Diagnostic::new(
                        Some(process.key.clone()),
                        DiagnosticKind::ZeroProductionAmount {
                            product: process.reference_product.clone(),
                        },
                    )
                    .emit(),
                );
            }
        }

        // Water elementary flows actually used by the collection
        let used: HashSet<&NodeKey> = inventory
            .processes_in(&settings.database)
            .flat_map(|p| p.flows.iter().map(|f| &f.input))
            .collect();
        let mut resources = Vec::new();
        let mut emissions = Vec::new();
        for flow in inventory.elementary_flows_in(&settings.biosphere) {
            if !flow.name.contains(WATER_NAME_MARKER) || !used.contains(&flow.key) {
                continue;
            }
            match flow.kind {
                ElementaryKind::NaturalResource => resources.push(flow.key.clone()),
                ElementaryKind::Emission => emissions.push(flow.key.clone()),
                ElementaryKind::Other => diagnostics.push(
                    Diagnostic::new(None, DiagnosticKind::UnknownElementaryType { flow: flow.key.clone() }).emit(),
                ),
            }
        }

        info!(
            database = %settings.database,
            release = %release.version,
            transformation = transformation.len(),
            treatment = treatment.len(),
            resources = resources.len(),
            emissions = emissions.len(),
            "Identified water flows"
        );

        Ok(Self {
            database: settings.database.clone(),
            release: release.version.clone(),
            universe: WaterUniverse::new(transformation, treatment, resources, emissions),
            diagnostics,
            collection: MatrixCollection::new(),
            report: BatchReport::default(),
            metrics: None,
        })
    }

    pub fn with_metrics(mut self, metrics: BalancerMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    /// Release version actually used, after any fallback
    pub fn release(&self) -> &str {
        &self.release
    }

    pub fn universe(&self) -> &WaterUniverse {
        &self.universe
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn collection(&self) -> &MatrixCollection {
        &self.collection
    }

    pub fn into_collection(self) -> MatrixCollection {
        self.collection
    }

    pub fn report(&self) -> &BatchReport {
        &self.report
    }

    pub fn metrics(&self) -> Option<&BalancerMetrics> {
        self.metrics.as_ref()
    }

    /// Balance plans for every process of the collection, nothing sampled
    pub fn plan_all(&self, inventory: &Inventory) -> Vec<(NodeKey, Result<Option<BalancePlan>>)> {
        let balancer = ProcessBalancer::new(&self.universe);
        inventory
            .processes_in(&self.database)
            .map(|p| (p.key.clone(), balancer.plan(p)))
            .collect()
    }

    /// Balance one process and add its rows to the collection
    pub fn add_samples_for_process(
        &mut self,
        inventory: &mut Inventory,
        key: &NodeKey,
        materializer: &dyn Materializer,
        iterations: usize,
    ) -> Result<Strategy> {
        let process = inventory
            .process_mut(key)
            .ok_or_else(|| BalanceError::ProcessNotFound(key.clone()))?;
        let outcome = balance_isolated(&ProcessBalancer::new(&self.universe), process, materializer, iterations)?;
        let strategy = outcome.strategy;
        self.record_outcome(outcome);
        Ok(strategy)
    }

    /// Balance every process in turn; failures are recorded and skipped
    pub fn add_samples_for_all(
        &mut self,
        inventory: &mut Inventory,
        materializer: &dyn Materializer,
        iterations: usize,
    ) -> &BatchReport {
        let keys = inventory.process_keys_in(&self.database);
        info!(database = %self.database, processes = keys.len(), "Balancing processes");

        for key in keys {
            if let Err(error) = self.add_samples_for_process(inventory, &key, materializer, iterations) {
                self.record_failure(key, error);
            }
        }
        self.log_summary();
        &self.report
    }

    /// Balance every process on `workers` threads
    ///
    /// Each worker owns a disjoint chunk of processes, so no scratch state is
    /// shared. Outcomes are appended in arrival order.
    pub fn add_samples_parallel(
        &mut self,
        inventory: &mut Inventory,
        materializer: &dyn Materializer,
        iterations: usize,
        workers: usize,
    ) -> Result<&BatchReport> {
        let mut processes = inventory.processes_in_mut(&self.database);
        if processes.is_empty() {
            return Ok(&self.report);
        }
        let workers = workers.max(1);
        let chunk_size = (processes.len() + workers - 1) / workers;
        info!(
            database = %self.database,
            processes = processes.len(),
            workers,
            "Balancing processes in parallel"
        );

        let balancer = ProcessBalancer::new(&self.universe);
        let (tx, rx) = crossbeam::channel::unbounded();
        let results = crossbeam::scope(|scope| {
            for chunk in processes.chunks_mut(chunk_size) {
                let tx = tx.clone();
                let balancer = &balancer;
                scope.spawn(move |_| {
                    for process in chunk.iter_mut() {
                        let key = process.key.clone();
                        let result = balance_isolated(balancer, process, materializer, iterations);
                        if tx.send((key, result)).is_err() {
                            break;
                        }
                    }
                });
            }
            drop(tx);
            rx.iter().collect::<Vec<_>>()
        })
        .map_err(|_| BalanceError::WorkerPanicked)?;

        for (key, result) in results {
            match result {
                Ok(outcome) => self.record_outcome(outcome),
                Err(error) => self.record_failure(key, error),
            }
        }
        self.log_summary();
        Ok(&self.report)
    }

    fn record_outcome(&mut self, outcome: ProcessOutcome) {
        self.report.record_outcome(&outcome);
        if let Some(metrics) = &self.metrics {
            metrics.record_outcome(outcome.strategy, outcome.row_count());
        }
        self.diagnostics.extend(outcome.diagnostics);
        self.collection.extend(outcome.blocks);
    }

    fn record_failure(&mut self, key: NodeKey, error: BalanceError) {
        warn!(process = %key, error = %error, "Balancing failed");
        self.report.record_failure(key, &error);
        if let Some(metrics) = &self.metrics {
            metrics.record_failure();
        }
    }

    fn log_summary(&self) {
        info!(
            processed = self.report.processed,
            rows = self.report.rows,
            failures = self.report.failures.len(),
            strategies = ?self.report.strategies,
            "Batch finished"
        );
    }
}

/// Balance one process, turning a panic into a per-process failure.
/// The pass guard has already rolled the process back when the panic is caught.
fn balance_isolated(
    balancer: &ProcessBalancer<'_>,
    process: &mut Process,
    materializer: &dyn Materializer,
    iterations: usize,
) -> Result<ProcessOutcome> {
    panic::catch_unwind(AssertUnwindSafe(|| balancer.balance(process, materializer, iterations))).unwrap_or_else(
        |payload| {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            Err(BalanceError::Panicked(message))
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembly::BlockKind;
    use crate::data::{ElementaryFlow, Flow, FlowKind, Uncertainty};
    use crate::error::SamplingError;
    use crate::sampling::{MonteCarloMaterializer, Samples, SamplingRequest};

    /// Panics while sampling one process, delegates for the rest
    struct PanicsOn {
        owner: NodeKey,
        inner: MonteCarloMaterializer,
    }

    impl Materializer for PanicsOn {
        fn materialize(&self, request: &SamplingRequest<'_>, iterations: usize) -> std::result::Result<Samples, SamplingError> {
            if request.owner == &self.owner {
                panic!("sampler blew up on {}", request.owner);
            }
            self.inner.materialize(request, iterations)
        }
    }

    fn db(code: &str) -> NodeKey {
        NodeKey::new("db", code)
    }

    fn bio(code: &str) -> NodeKey {
        NodeKey::new("biosphere", code)
    }

    fn uncertain(input: NodeKey, output: &NodeKey, kind: FlowKind, amount: f64) -> Flow {
        Flow::new(input, output.clone(), kind, "kilogram", amount).with_uncertainty(Uncertainty::lognormal(amount, 0.1))
    }

    /// Tap water supply, wastewater treatment, and two consumers
    fn inventory() -> Inventory {
        let tap = db("tap");
        let wwt = db("wwt");
        let a = db("A");
        let b = db("B");
        let zero = db("Z");

        let processes = vec![
            Process::new(tap.clone(), "tap water production", "tap water", 1.0, "kilogram")
                .with_flow(Flow::new(tap.clone(), tap.clone(), FlowKind::Production, "kilogram", 1.0))
                .with_flow(uncertain(bio("from lake"), &tap, FlowKind::Biosphere, 1.1))
                .with_flow(uncertain(bio("to river"), &tap, FlowKind::Biosphere, 0.1)),
            Process::new(wwt.clone(), "wastewater treatment", "ww", -1.0, "kilogram")
                .with_flow(Flow::new(wwt.clone(), wwt.clone(), FlowKind::Production, "kilogram", -1.0))
                .with_flow(uncertain(bio("to river"), &wwt, FlowKind::Biosphere, 0.9))
                .with_flow(uncertain(bio("to air"), &wwt, FlowKind::Biosphere, 0.1)),
            Process::new(a.clone(), "A", "a", 1.0, "kilogram")
                .with_flow(uncertain(tap.clone(), &a, FlowKind::Technosphere, 2.0))
                .with_flow(uncertain(bio("from lake"), &a, FlowKind::Biosphere, 1.0))
                .with_flow(uncertain(wwt.clone(), &a, FlowKind::Technosphere, -3.0)),
            Process::new(b.clone(), "B", "b", 1.0, "kilogram")
                .with_flow(uncertain(tap.clone(), &b, FlowKind::Technosphere, 2.0))
                .with_flow(Flow::new(bio("to river"), b.clone(), FlowKind::Biosphere, "kilogram", 2.0)),
            Process::new(zero.clone(), "Z", "tap water", 0.0, "kilogram"),
        ];
        let flows = vec![
            ElementaryFlow::new(bio("from lake"), "Water, lake", ElementaryKind::NaturalResource, "cubic meter"),
            ElementaryFlow::new(bio("to river"), "Water", ElementaryKind::Emission, "cubic meter"),
            ElementaryFlow::new(bio("to air"), "Water", ElementaryKind::Emission, "cubic meter"),
            ElementaryFlow::new(bio("unused"), "Water, well", ElementaryKind::NaturalResource, "cubic meter"),
            ElementaryFlow::new(bio("co2"), "Carbon dioxide", ElementaryKind::Emission, "kilogram"),
            ElementaryFlow::new(bio("odd"), "Water, odd", ElementaryKind::Other, "kilogram"),
        ];
        let mut inventory = Inventory::new(processes, flows);
        // Make the odd flow used so its type gets reported
        if let Some(b) = inventory.process_mut(&db("B")) {
            b.flows.push(Flow::new(bio("odd"), db("B"), FlowKind::Biosphere, "kilogram", 0.0));
        }
        inventory
    }

    fn settings() -> BalancerSettings {
        BalancerSettings::new("db").with_biosphere("biosphere").with_release("test_db")
    }

    fn tables() -> WaterProductTables {
        WaterProductTables::builtin().unwrap()
    }

    #[test]
    fn test_identifies_universe() {
        let balancer = DatabaseBalancer::new(&inventory(), &settings(), &tables()).unwrap();
        let u = balancer.universe();
        assert!(u.transformation().contains(&db("tap")));
        assert!(u.treatment().contains(&db("wwt")));
        assert!(!u.transformation().contains(&db("Z")));
        assert!(u.resources().contains(&bio("from lake")));
        assert!(!u.resources().contains(&bio("unused")));
        assert_eq!(u.emissions().len(), 2);
        assert_eq!(balancer.release(), "test_db");

        let kinds: Vec<&DiagnosticKind> = balancer.diagnostics().iter().map(|d| &d.kind).collect();
        assert!(kinds.iter().any(|k| matches!(k, DiagnosticKind::ZeroProductionAmount { .. })));
        assert!(kinds.iter().any(|k| matches!(k, DiagnosticKind::UnknownElementaryType { .. })));
    }

    #[test]
    fn test_missing_database() {
        let err = DatabaseBalancer::new(&inventory(), &BalancerSettings::new("nope"), &tables())
            .err()
            .unwrap();
        assert!(matches!(err, BalanceError::DatabaseNotFound(name) if name == "nope"));
    }

    #[test]
    fn test_unknown_release_falls_back() {
        let settings = settings().with_release("9.9");
        let balancer = DatabaseBalancer::new(&inventory(), &settings, &tables()).unwrap();
        assert_eq!(balancer.release(), "3.6");
        assert!(balancer
            .diagnostics()
            .iter()
            .any(|d| matches!(d.kind, DiagnosticKind::ReleaseFallback { .. })));
    }

    #[test]
    fn test_balance_all_sequential() {
        let mut inventory = inventory();
        let mut balancer = DatabaseBalancer::new(&inventory, &settings(), &tables())
            .unwrap()
            .with_metrics(BalancerMetrics::new().unwrap());

        let report = balancer
            .add_samples_for_all(&mut inventory, &MonteCarloMaterializer::with_seed(3), 10)
            .clone();

        assert_eq!(report.processed, 5);
        assert!(report.failures.is_empty());
        assert_eq!(report.count(Strategy::Default), 2);
        assert_eq!(report.count(Strategy::Inverse), 1);
        assert_eq!(report.count(Strategy::SetStatic), 1);
        assert_eq!(report.count(Strategy::Skip), 1);
        assert_eq!(balancer.collection().row_count(), report.rows);
        assert_eq!(balancer.collection().block(BlockKind::Technosphere).len(), 5);

        let rendered = balancer.metrics().unwrap().render().unwrap();
        assert!(rendered.contains("water_processes_total{strategy=\"default\"} 2"));
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let mut sequential = inventory();
        let mut parallel = inventory();
        let materializer = MonteCarloMaterializer::with_seed(8);

        let mut first = DatabaseBalancer::new(&sequential, &settings(), &tables()).unwrap();
        first.add_samples_for_all(&mut sequential, &materializer, 6);

        let mut second = DatabaseBalancer::new(&parallel, &settings(), &tables()).unwrap();
        let report = second
            .add_samples_parallel(&mut parallel, &materializer, 6, 3)
            .unwrap()
            .clone();

        assert_eq!(&report, first.report());
        assert_eq!(second.collection().row_count(), first.collection().row_count());
        assert_eq!(sequential.processes(), parallel.processes());
    }

    #[test]
    fn test_failures_do_not_abort_batch() {
        let mut inventory = inventory();
        let mut balancer = DatabaseBalancer::new(&inventory, &settings(), &tables()).unwrap();

        // Drop the scale of one distribution so its sampling fails
        if let Some(a) = inventory.process_mut(&db("A")) {
            a.flows[0].uncertainty.scale = None;
        }

        let report = balancer
            .add_samples_for_all(&mut inventory, &MonteCarloMaterializer::with_seed(1), 4)
            .clone();
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].key, db("A"));
        assert_eq!(report.processed, 5);
        assert!(!inventory.process(&db("A")).unwrap().has_pass_state());
        assert!(balancer.collection().row_count() > 0);
    }

    #[test]
    fn test_parallel_panic_is_a_process_failure() {
        let mut inventory = inventory();
        let mut balancer = DatabaseBalancer::new(&inventory, &settings(), &tables()).unwrap();
        let materializer = PanicsOn {
            owner: db("A"),
            inner: MonteCarloMaterializer::with_seed(5),
        };

        let report = balancer
            .add_samples_parallel(&mut inventory, &materializer, 4, 2)
            .unwrap()
            .clone();

        assert_eq!(report.processed, 5);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].key, db("A"));
        assert!(report.failures[0].message.contains("sampler blew up"));
        assert_eq!(report.count(Strategy::Default), 1);
        assert!(balancer.collection().row_count() > 0);
        assert!(!inventory.process(&db("A")).unwrap().has_pass_state());
    }

    #[test]
    fn test_sequential_panic_is_a_process_failure() {
        let mut inventory = inventory();
        let mut balancer = DatabaseBalancer::new(&inventory, &settings(), &tables()).unwrap();
        let materializer = PanicsOn {
            owner: db("tap"),
            inner: MonteCarloMaterializer::with_seed(5),
        };

        let report = balancer.add_samples_for_all(&mut inventory, &materializer, 4).clone();
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].key, db("tap"));
        assert_eq!(report.processed, 5);
    }

    #[test]
    fn test_unknown_process() {
        let mut inventory = inventory();
        let mut balancer = DatabaseBalancer::new(&inventory, &settings(), &tables()).unwrap();
        let err = balancer
            .add_samples_for_process(&mut inventory, &db("missing"), &MonteCarloMaterializer::new(), 1)
            .unwrap_err();
        assert!(matches!(err, BalanceError::ProcessNotFound(_)));
    }

    #[test]
    fn test_plan_all_is_pure() {
        let inventory = inventory();
        let balancer = DatabaseBalancer::new(&inventory, &settings(), &tables()).unwrap();
        let plans = balancer.plan_all(&inventory);
        assert_eq!(plans.len(), 5);
        let planned = plans.iter().filter(|(_, p)| matches!(p, Ok(Some(_)))).count();
        assert_eq!(planned, 4);
        assert!(inventory.processes().iter().all(|p| !p.has_pass_state()));
    }
}
