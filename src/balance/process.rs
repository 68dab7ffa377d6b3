use super::classify::{Classification, FlowClassifier, WaterUniverse};
use super::equation::{BalancePlan, EquationBuilder, StaticValue};
use super::pass::BalancingPass;
use super::strategy::{Strategy, StrategySelector};
use crate::assembly::{MatrixBlock, ResultAssembler};
use crate::data::{NodeKey, Process};
use crate::diagnostics::Diagnostic;
use crate::error::Result;
use crate::sampling::{Materializer, SamplingRequest, SamplingTarget};
use serde::Serialize;
use tracing::debug;

/// Pure view of a process: flow roles and the chosen strategy
#[derive(Debug, Clone, PartialEq)]
pub struct Analysis {
    pub classification: Classification,
    pub strategy: Strategy,
}

/// Result of balancing one process
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessOutcome {
    pub key: NodeKey,
    pub strategy: Strategy,
    pub static_ratio: StaticValue,
    pub static_balance: StaticValue,
    #[serde(skip)]
    pub blocks: Vec<MatrixBlock>,
    pub diagnostics: Vec<Diagnostic>,
}

impl ProcessOutcome {
    fn skipped(key: NodeKey, diagnostics: Vec<Diagnostic>) -> Self {
        Self {
            key,
            strategy: Strategy::Skip,
            static_ratio: StaticValue::NotCalculated,
            static_balance: StaticValue::NotCalculated,
            blocks: Vec::new(),
            diagnostics,
        }
    }

    pub fn row_count(&self) -> usize {
        self.blocks.iter().map(MatrixBlock::len).sum()
    }
}

/// Per-process entry point: classify, select, build, materialize, assemble
pub struct ProcessBalancer<'u> {
    classifier: FlowClassifier<'u>,
    selector: StrategySelector,
    builder: EquationBuilder,
    assembler: ResultAssembler,
}

impl<'u> ProcessBalancer<'u> {
    pub fn new(universe: &'u WaterUniverse) -> Self {
        Self {
            classifier: FlowClassifier::new(universe),
            selector: StrategySelector::new(),
            builder: EquationBuilder::new(),
            assembler: ResultAssembler::new(),
        }
    }

    pub fn analyze(&self, process: &Process) -> Analysis {
        let classification = self.classifier.classify(process);
        let strategy = self.selector.select(&classification, process);
        Analysis {
            classification,
            strategy,
        }
    }

    /// Balance plan without touching the process; `None` for `skip`
    pub fn plan(&self, process: &Process) -> Result<Option<BalancePlan>> {
        let analysis = self.analyze(process);
        if analysis.strategy == Strategy::Skip {
            return Ok(None);
        }
        self.builder
            .build(analysis.strategy, &analysis.classification, process)
            .map(Some)
    }

    /// Rebalance `process` and return its sampled blocks
    ///
    /// On any error the process formulas and parameters are back to their
    /// pre-pass values.
    pub fn balance(
        &self,
        process: &mut Process,
        materializer: &dyn Materializer,
        iterations: usize,
    ) -> Result<ProcessOutcome> {
        let Analysis {
            classification,
            strategy,
        } = self.analyze(process);
        let key = process.key.clone();

        if strategy == Strategy::Skip {
            debug!(process = %key, flows = classification.flows.len(), "Skipping process");
            return Ok(ProcessOutcome::skipped(key, classification.diagnostics));
        }

        let plan = self.builder.build(strategy, &classification, process)?;

        let mut pass = BalancingPass::begin(process);
        for classified in classification.active() {
            pass.annotate(classified.index, classified.conversion_factor, classified.abnormal_sign);
        }
        for hook in &plan.hooks {
            pass.derive(hook.flow_index, hook.formula.clone())?;
        }
        pass.activate();

        let request = SamplingRequest {
            owner: &key,
            parameters: &plan.parameters,
            targets: pass
                .active_formulas()
                .map(|(index, formula)| SamplingTarget::for_flow(index, formula.clone()))
                .collect(),
        };
        let samples = materializer.materialize(&request, iterations)?;
        let blocks = self.assembler.assemble(pass.process(), &samples)?;
        pass.finish();

        debug!(
            process = %key,
            strategy = %strategy,
            static_ratio = ?plan.static_ratio,
            rows = blocks.iter().map(MatrixBlock::len).sum::<usize>(),
            "Balanced process"
        );

        Ok(ProcessOutcome {
            key,
            strategy,
            static_ratio: plan.static_ratio,
            static_balance: plan.static_balance,
            blocks,
            diagnostics: classification.diagnostics,
        })
    }
}
