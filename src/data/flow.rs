use super::types::{FlowKind, NodeKey, Uncertainty};
use crate::balance::Expr;
use serde::{Deserialize, Serialize};

/// State of a flow's formula slot across a balancing pass
///
/// At rest a flow is `Inactive`, holding whatever formula the host store
/// gave it (often an unrelated chemical formula on elementary exchanges).
/// A pass moves it through `Preserved` → `Derived` → `ActiveForSampling`
/// and `restore` always brings it back to `Inactive` with the host formula.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FormulaSlot {
    Inactive(Option<String>),
    Preserved(Option<String>),
    Derived {
        preserved: Option<String>,
        derived: Expr,
    },
    ActiveForSampling {
        preserved: Option<String>,
        derived: Expr,
    },
}

impl Default for FormulaSlot {
    fn default() -> Self {
        FormulaSlot::Inactive(None)
    }
}

impl FormulaSlot {
    /// Move the host formula aside. No-op outside the `Inactive` state.
    pub fn stash(&mut self) {
        if let FormulaSlot::Inactive(formula) = self {
            let preserved = formula.take();
            *self = FormulaSlot::Preserved(preserved);
        }
    }

    /// Attach a balancing formula to a stashed slot
    pub fn derive(&mut self, derived: Expr) -> Result<(), &'static str> {
        match self {
            FormulaSlot::Preserved(preserved) | FormulaSlot::Derived { preserved, .. } => {
                let preserved = preserved.take();
                *self = FormulaSlot::Derived { preserved, derived };
                Ok(())
            }
            FormulaSlot::Inactive(_) => Err("formula must be stashed before deriving"),
            FormulaSlot::ActiveForSampling { .. } => Err("formula is already active for sampling"),
        }
    }

    /// Promote a derived formula so the materializer picks it up
    pub fn activate(&mut self) {
        *self = match std::mem::take(self) {
            FormulaSlot::Derived { preserved, derived } => {
                FormulaSlot::ActiveForSampling { preserved, derived }
            }
            other => other,
        };
    }

    /// Return to rest, handing back the balancing formula if one was set
    pub fn restore(&mut self) -> Option<Expr> {
        let (at_rest, derived) = match std::mem::take(self) {
            FormulaSlot::Inactive(formula) => (formula, None),
            FormulaSlot::Preserved(preserved) => (preserved, None),
            FormulaSlot::Derived { preserved, derived }
            | FormulaSlot::ActiveForSampling { preserved, derived } => (preserved, Some(derived)),
        };
        *self = FormulaSlot::Inactive(at_rest);
        derived
    }

    /// Formula the materializer should evaluate for this flow
    pub fn active(&self) -> Option<&Expr> {
        match self {
            FormulaSlot::ActiveForSampling { derived, .. } => Some(derived),
            _ => None,
        }
    }

    /// Host formula, wherever it currently lives
    pub fn host_formula(&self) -> Option<&str> {
        match self {
            FormulaSlot::Inactive(formula) | FormulaSlot::Preserved(formula) => formula.as_deref(),
            FormulaSlot::Derived { preserved, .. }
            | FormulaSlot::ActiveForSampling { preserved, .. } => preserved.as_deref(),
        }
    }

    pub fn is_at_rest(&self) -> bool {
        matches!(self, FormulaSlot::Inactive(_))
    }
}

/// One directed quantity entering or leaving a process
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Flow {
    /// Counterpart: supplying process, the process itself for production, or the elementary flow
    pub input: NodeKey,
    /// Owning process
    pub output: NodeKey,
    pub kind: FlowKind,
    pub unit: String,
    pub amount: f64,
    #[serde(default)]
    pub uncertainty: Uncertainty,
    #[serde(default)]
    pub formula: FormulaSlot,
    /// Balancing formula kept from the last pass
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub water_formula: Option<Expr>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversion_factor: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub abnormal_sign: Option<bool>,
}

impl Flow {
    pub fn new(
        input: NodeKey,
        output: NodeKey,
        kind: FlowKind,
        unit: impl Into<String>,
        amount: f64,
    ) -> Self {
        Self {
            input,
            output,
            kind,
            unit: unit.into(),
            amount,
            uncertainty: Uncertainty::default(),
            formula: FormulaSlot::default(),
            water_formula: None,
            conversion_factor: None,
            abnormal_sign: None,
        }
    }

    pub fn with_uncertainty(mut self, uncertainty: Uncertainty) -> Self {
        self.uncertainty = uncertainty;
        self
    }

    pub fn with_formula(mut self, formula: impl Into<String>) -> Self {
        self.formula = FormulaSlot::Inactive(Some(formula.into()));
        self
    }

    pub fn is_uncertain(&self) -> bool {
        self.uncertainty.is_uncertain()
    }

    /// Bring the formula slot back to rest, keeping the balancing formula aside
    pub fn restore_formula(&mut self) {
        if let Some(derived) = self.formula.restore() {
            self.water_formula = Some(derived);
        }
    }
}
