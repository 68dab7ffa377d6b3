pub mod classify;
pub mod equation;
pub mod expr;
pub mod pass;
pub mod process;
pub mod strategy;

pub use classify::{has_abnormal_sign, Classification, ClassifiedFlow, FlowClass, FlowClassifier, Side, WaterUniverse};
pub use equation::{
    BalancePlan, BalanceTotals, EquationBuilder, FlowHook, Parameter, ParameterDefinition, StaticValue,
};
pub use expr::{BinaryOp, Expr, NonEmptyTerms, Terms};
pub use pass::BalancingPass;
pub use process::{Analysis, ProcessBalancer, ProcessOutcome};
pub use strategy::{SelectionInputs, Strategy, StrategySelector};
