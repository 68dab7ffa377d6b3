use super::classify::{Classification, ClassifiedFlow, Side};
use super::expr::{Expr, Terms};
use super::strategy::Strategy;
use crate::data::{Flow, NodeKey, Process, Uncertainty};
use crate::error::{BalanceError, Result};
use serde::Serialize;
use tracing::debug;

pub const STATIC_RATIO: &str = "static_ratio";
pub const SCALING: &str = "scaling";
pub const RATIO: &str = "ratio";
/// Parameter pinning the single uncertain flow of a `set_static` process
pub const CONSTANT: &str = "cst";
const FLOW_PARAM_PREFIX: &str = "water_param";

/// How a parameter gets its value in each draw
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ParameterDefinition {
    /// Drawn from a distribution (or repeated, when deterministic)
    Sampled { amount: f64, uncertainty: Uncertainty },
    /// Computed from other parameters of the same draw
    Derived(Expr),
}

/// Named input to the materializer, scoped to one balancing pass
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Parameter {
    pub name: String,
    pub owner: NodeKey,
    pub definition: ParameterDefinition,
}

impl Parameter {
    /// Parameter forwarding a flow's own distribution
    pub fn from_flow(flow: &Flow, name: impl Into<String>, owner: &NodeKey) -> Self {
        Self {
            name: name.into(),
            owner: owner.clone(),
            definition: ParameterDefinition::Sampled {
                amount: flow.amount,
                uncertainty: flow.uncertainty.clone(),
            },
        }
    }

    pub fn constant(name: impl Into<String>, owner: &NodeKey, value: f64) -> Self {
        Self {
            name: name.into(),
            owner: owner.clone(),
            definition: ParameterDefinition::Sampled {
                amount: value,
                uncertainty: Uncertainty::fixed(value),
            },
        }
    }

    pub fn derived(name: impl Into<String>, owner: &NodeKey, formula: Expr) -> Self {
        Self {
            name: name.into(),
            owner: owner.clone(),
            definition: ParameterDefinition::Derived(formula),
        }
    }
}

/// Nominal ratio or balance of a process
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StaticValue {
    Calculated(f64),
    NotCalculated,
}

impl StaticValue {
    pub fn value(&self) -> Option<f64> {
        match self {
            StaticValue::Calculated(v) => Some(*v),
            StaticValue::NotCalculated => None,
        }
    }
}

/// Formula tying one flow's sampled value to the plan's parameters
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FlowHook {
    pub flow_index: usize,
    pub formula: Expr,
}

/// Nominal water totals on a canonical mass basis
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BalanceTotals {
    pub in_total: f64,
    pub out_total: f64,
}

/// Everything the builder emits for one process
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BalancePlan {
    pub strategy: Strategy,
    /// Dependency-ordered: flow parameters, then static ratio, scaling, ratio
    pub parameters: Vec<Parameter>,
    pub hooks: Vec<FlowHook>,
    pub totals: Option<BalanceTotals>,
    pub static_ratio: StaticValue,
    pub static_balance: StaticValue,
}

impl BalancePlan {
    pub fn skip() -> Self {
        Self {
            strategy: Strategy::Skip,
            parameters: Vec::new(),
            hooks: Vec::new(),
            totals: None,
            static_ratio: StaticValue::NotCalculated,
            static_balance: StaticValue::NotCalculated,
        }
    }

    pub fn parameter(&self, name: &str) -> Option<&Parameter> {
        self.parameters.iter().find(|p| p.name == name)
    }

    pub fn hook_for(&self, flow_index: usize) -> Option<&Expr> {
        self.hooks
            .iter()
            .find(|h| h.flow_index == flow_index)
            .map(|h| &h.formula)
    }
}

/// Canonical-mass term of one flow: `(sign × factor) × param`
fn mass_term(classified: &ClassifiedFlow, param: &str) -> Expr {
    let factor = classified.conversion_factor.unwrap_or(1.0);
    Expr::lit(classified.class.sign() * factor) * Expr::param(param)
}

fn mass_value(classified: &ClassifiedFlow, flow: &Flow) -> f64 {
    flow.amount * classified.conversion_factor.unwrap_or(1.0) * classified.class.sign()
}

/// Builds parameters and formulas for a chosen strategy
#[derive(Debug, Clone, Copy, Default)]
pub struct EquationBuilder;

impl EquationBuilder {
    pub fn new() -> Self {
        Self
    }

    pub fn build(
        &self,
        strategy: Strategy,
        classification: &Classification,
        process: &Process,
    ) -> Result<BalancePlan> {
        let plan = match strategy {
            Strategy::Skip => BalancePlan::skip(),
            Strategy::SetStatic => self.build_set_static(classification, process)?,
            Strategy::Default => self.build_rescaling(Side::In, classification, process)?,
            Strategy::Inverse => self.build_rescaling(Side::Out, classification, process)?,
        };

        debug!(
            process = %process.key,
            strategy = %plan.strategy,
            parameters = plan.parameters.len(),
            hooks = plan.hooks.len(),
            "Built balance plan"
        );

        Ok(plan)
    }

    /// Shared body of `default` (rescale inputs) and `inverse` (rescale outputs)
    ///
    /// Uncertain flows on the rescaled side are multiplied by `scaling`, the
    /// unique factor that makes the sampled ratio of rescaled to fixed side
    /// equal the static ratio in every draw.
    ///
    /// Algorithm:
    /// 1. Give every active flow a `water_param_<n>` parameter and a signed,
    ///    kg-converted mass term
    /// 2. Sort terms into fixed (the other side), variable (uncertain, rescaled
    ///    side) and constant (deterministic, rescaled side)
    /// 3. Compute the static ratio from the nominal side totals
    /// 4. Derive `scaling = (static_ratio * fixed - constant) / variable`
    /// 5. Derive `ratio` back from the scaled terms so a draw can be checked
    ///
    /// # Errors
    /// * `EmptyTerms` - no fixed term, or no uncertain term on the rescaled side
    /// * `ContractViolation` - inverse with a single variable term
    /// * `ZeroTotal` - inverse whose input total is zero
    fn build_rescaling(
        &self,
        rescaled: Side,
        classification: &Classification,
        process: &Process,
    ) -> Result<BalancePlan> {
        let strategy = match rescaled {
            Side::In => Strategy::Default,
            Side::Out => Strategy::Inverse,
        };
        let owner = &process.key;

        let mut parameters = Vec::new();
        let mut hooks = Vec::new();
        let mut variable = Terms::new();
        let mut constant = Terms::new();
        let mut fixed = Terms::new();
        let mut in_total = 0.0;
        let mut out_total = 0.0;

        // 1-2. Parameters, hooks and term buckets
        for (n, classified) in classification.active().enumerate() {
            let Some(side) = classified.class.side() else {
                continue;
            };
            let flow = &process.flows[classified.index];
            let name = format!("{}_{}", FLOW_PARAM_PREFIX, n);
            let term = mass_term(classified, &name);

            match side {
                Side::In => in_total += mass_value(classified, flow),
                Side::Out => out_total += mass_value(classified, flow),
            }

            let formula = if side != rescaled {
                fixed.push(term);
                Expr::param(&name)
            } else if flow.is_uncertain() {
                variable.push(term);
                Expr::param(&name) * Expr::param(SCALING)
            } else {
                constant.push(term);
                Expr::param(&name)
            };

            parameters.push(Parameter::from_flow(flow, &name, owner));
            hooks.push(FlowHook {
                flow_index: classified.index,
                formula,
            });
        }

        // 3. Static ratio, rescaled side over fixed side
        let (static_ratio, static_balance) = match rescaled {
            Side::In => {
                let ratio = if out_total != 0.0 {
                    in_total / out_total
                } else {
                    f64::INFINITY
                };
                (ratio, in_total - out_total)
            }
            Side::Out => {
                if in_total == 0.0 {
                    return Err(BalanceError::ZeroTotal {
                        process: owner.clone(),
                        side: Side::In.as_str(),
                    });
                }
                (out_total / in_total, out_total - in_total)
            }
        };

        let fixed_side = match rescaled {
            Side::In => Side::Out,
            Side::Out => Side::In,
        };
        let fixed = fixed.non_empty().ok_or(BalanceError::EmptyTerms {
            side: fixed_side.as_str(),
            strategy: strategy.as_str(),
        })?;
        let constant = constant.total_or(0.0);
        if rescaled == Side::Out && variable.len() < 2 {
            // The selector routes a single uncertain flow to set_static
            return Err(BalanceError::ContractViolation {
                expected: 2,
                found: variable.len(),
            });
        }
        let variable = variable.non_empty().ok_or(BalanceError::EmptyTerms {
            side: "variable",
            strategy: strategy.as_str(),
        })?;

        // 4-5. Derived parameters
        let scaling = (Expr::param(STATIC_RATIO) * fixed.total() - constant.clone()) / variable.total();
        let ratio = (Expr::param(SCALING) * variable.total() + constant) / fixed.total();

        parameters.push(Parameter::constant(STATIC_RATIO, owner, static_ratio));
        parameters.push(Parameter::derived(SCALING, owner, scaling));
        parameters.push(Parameter::derived(RATIO, owner, ratio));

        Ok(BalancePlan {
            strategy,
            parameters,
            hooks,
            totals: Some(BalanceTotals { in_total, out_total }),
            static_ratio: StaticValue::Calculated(static_ratio),
            static_balance: StaticValue::Calculated(static_balance),
        })
    }

    /// Pin the only uncertain flow to its nominal amount
    fn build_set_static(&self, classification: &Classification, process: &Process) -> Result<BalancePlan> {
        let uncertain: Vec<&ClassifiedFlow> = classification
            .active()
            .filter(|c| process.flows[c.index].is_uncertain())
            .collect();

        let [only] = uncertain.as_slice() else {
            return Err(BalanceError::SetStaticPrecondition {
                found: uncertain.len(),
            });
        };
        let flow = &process.flows[only.index];

        Ok(BalancePlan {
            strategy: Strategy::SetStatic,
            parameters: vec![Parameter::constant(CONSTANT, &process.key, flow.amount)],
            hooks: vec![FlowHook {
                flow_index: only.index,
                formula: Expr::param(CONSTANT),
            }],
            totals: None,
            static_ratio: StaticValue::NotCalculated,
            static_balance: StaticValue::NotCalculated,
        })
    }
}
