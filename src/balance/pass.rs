use super::expr::Expr;
use crate::data::Process;
use crate::error::{BalanceError, Result};
use tracing::debug;

/// Scoped ownership of a process's formula and parameter slots
///
/// `begin` moves every host formula and the process parameters aside.
/// `finish` commits: derived formulas are demoted into `water_formula` and
/// the host state comes back. Dropping an unfinished pass rolls back instead,
/// discarding derived formulas, so every exit path restores the process.
pub struct BalancingPass<'p> {
    process: &'p mut Process,
    finished: bool,
}

impl<'p> BalancingPass<'p> {
    pub fn begin(process: &'p mut Process) -> Self {
        for flow in &mut process.flows {
            flow.formula.stash();
        }
        process.parameters.stash();
        Self {
            process,
            finished: false,
        }
    }

    pub fn process(&self) -> &Process {
        self.process
    }

    /// Persist classifier scratch fields on one flow
    pub fn annotate(&mut self, flow: usize, conversion_factor: Option<f64>, abnormal_sign: Option<bool>) {
        if let Some(flow) = self.process.flows.get_mut(flow) {
            flow.conversion_factor = conversion_factor;
            flow.abnormal_sign = abnormal_sign;
        }
    }

    pub fn derive(&mut self, flow: usize, formula: Expr) -> Result<()> {
        let slot = &mut self
            .process
            .flows
            .get_mut(flow)
            .ok_or(BalanceError::FormulaState {
                flow,
                reason: "no such flow",
            })?
            .formula;
        slot.derive(formula)
            .map_err(|reason| BalanceError::FormulaState { flow, reason })
    }

    /// Promote every derived formula for sampling
    pub fn activate(&mut self) {
        for flow in &mut self.process.flows {
            flow.formula.activate();
        }
    }

    /// Flows whose formulas are active, in process order
    pub fn active_formulas(&self) -> impl Iterator<Item = (usize, &Expr)> {
        self.process
            .flows
            .iter()
            .enumerate()
            .filter_map(|(index, flow)| flow.formula.active().map(|f| (index, f)))
    }

    /// Commit: keep derived formulas in `water_formula` and restore host state
    pub fn finish(mut self) {
        for flow in &mut self.process.flows {
            flow.restore_formula();
        }
        self.process.parameters.restore();
        self.finished = true;
    }

    fn rollback(&mut self) {
        for flow in &mut self.process.flows {
            flow.formula.restore();
        }
        self.process.parameters.restore();
    }
}

impl Drop for BalancingPass<'_> {
    fn drop(&mut self) {
        if !self.finished {
            debug!(process = %self.process.key, "Rolling back unfinished balancing pass");
            self.rollback();
        }
    }
}
