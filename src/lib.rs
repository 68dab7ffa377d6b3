pub mod assembly;
pub mod balance;
pub mod batch;
pub mod data;
pub mod diagnostics;
pub mod error;
pub mod sampling;
pub mod utils;

// Re-export commonly used types
pub use assembly::{MatrixBlock, MatrixCollection, MatrixIndex, PackageOptions, SamplePackage};
pub use balance::{
    BalancePlan, Expr, FlowClass, FlowClassifier, ProcessBalancer, ProcessOutcome, StaticValue, Strategy,
    StrategySelector, WaterUniverse,
};
pub use batch::{BalancerMetrics, BalancerSettings, BatchReport, DatabaseBalancer};
pub use data::{Flow, FlowKind, Inventory, NodeKey, Process, Uncertainty, WaterProductTables};
pub use diagnostics::{Diagnostic, DiagnosticKind};
pub use error::{BalanceError, PackageError, SamplingError};
pub use sampling::{Materializer, MonteCarloMaterializer};
pub use utils::Config;
