use super::classify::{Classification, Side};
use crate::data::Process;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Algebraic approach used to rebalance a process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// Nothing to rebalance
    Skip,
    /// Pin the single uncertain flow to its nominal value
    SetStatic,
    /// Rescale uncertain outputs
    Inverse,
    /// Rescale uncertain inputs
    Default,
}

impl Strategy {
    pub const ALL: [Strategy; 4] = [
        Strategy::Skip,
        Strategy::SetStatic,
        Strategy::Inverse,
        Strategy::Default,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::Skip => "skip",
            Strategy::SetStatic => "set_static",
            Strategy::Inverse => "inverse",
            Strategy::Default => "default",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything the selector looks at
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SelectionInputs {
    pub nonzero_in: bool,
    pub nonzero_out: bool,
    pub uncertain_in: usize,
    pub uncertain_out: usize,
}

impl SelectionInputs {
    /// Summarize the non-skip classified flows of `process`
    pub fn from_classification(classification: &Classification, process: &Process) -> Self {
        let mut inputs = Self::default();
        for classified in classification.active() {
            let flow = &process.flows[classified.index];
            match classified.class.side() {
                Some(Side::In) => {
                    inputs.nonzero_in |= flow.amount != 0.0;
                    if flow.is_uncertain() {
                        inputs.uncertain_in += 1;
                    }
                }
                Some(Side::Out) => {
                    inputs.nonzero_out |= flow.amount != 0.0;
                    if flow.is_uncertain() {
                        inputs.uncertain_out += 1;
                    }
                }
                None => {}
            }
        }
        inputs
    }

    pub fn uncertain_total(&self) -> usize {
        self.uncertain_in + self.uncertain_out
    }
}

/// Picks a strategy once per process
#[derive(Debug, Clone, Copy, Default)]
pub struct StrategySelector;

impl StrategySelector {
    pub fn new() -> Self {
        Self
    }

    /// Decision procedure, terminal on the first matching rule
    pub fn decide(&self, inputs: SelectionInputs) -> Strategy {
        // Need at least one non-zero flow on each side
        if !inputs.nonzero_in || !inputs.nonzero_out {
            return Strategy::Skip;
        }

        match inputs.uncertain_total() {
            0 => Strategy::Skip,
            1 => Strategy::SetStatic,
            _ if inputs.uncertain_in == 0 => Strategy::Inverse,
            _ => Strategy::Default,
        }
    }

    pub fn select(&self, classification: &Classification, process: &Process) -> Strategy {
        if classification.is_empty() {
            return Strategy::Skip;
        }
        self.decide(SelectionInputs::from_classification(classification, process))
    }
}
