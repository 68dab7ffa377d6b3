use crate::data::NodeKey;
use thiserror::Error;

/// Errors raised while balancing one process or preparing a batch
#[derive(Debug, Error)]
pub enum BalanceError {
    #[error("Database {0} not imported")]
    DatabaseNotFound(String),

    #[error("Process {0} not found")]
    ProcessNotFound(NodeKey),

    #[error("Should only have one variable water flow for 'set_static' strategy, found {found}")]
    SetStaticPrecondition { found: usize },

    #[error("At least one {side} term is needed for the '{strategy}' strategy")]
    EmptyTerms {
        side: &'static str,
        strategy: &'static str,
    },

    /// Selector and builder disagree about what a strategy may receive
    #[error("Strategy contract violated: expected at least {expected} terms, got {found}")]
    ContractViolation { expected: usize, found: usize },

    #[error("Static ratio undefined for process {process}: {side} total is zero")]
    ZeroTotal {
        process: NodeKey,
        side: &'static str,
    },

    #[error("Invalid formula transition on flow {flow}: {reason}")]
    FormulaState { flow: usize, reason: &'static str },

    #[error("Sampling failed: {0}")]
    Sampling(#[from] SamplingError),

    #[error("Balancing panicked: {0}")]
    Panicked(String),

    #[error("Balancing worker panicked")]
    WorkerPanicked,
}

/// Errors raised by a materializer
#[derive(Debug, Error)]
pub enum SamplingError {
    #[error("Unknown parameter '{0}' referenced in formula")]
    UnknownParameter(String),

    #[error("Circular parameter dependency involving '{0}'")]
    CircularDependency(String),

    #[error("Duplicate parameter name '{0}'")]
    DuplicateParameter(String),

    #[error("Invalid distribution for parameter '{name}': {reason}")]
    InvalidDistribution { name: String, reason: String },

    #[error("Iteration count must be positive")]
    NoIterations,

    #[error("Materializer returned no row for '{0}'")]
    MissingRow(String),
}

/// Errors raised while writing a sample package
#[derive(Debug, Error)]
pub enum PackageError {
    #[error("Package directory {0} already exists (set overwrite to replace it)")]
    AlreadyExists(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T, E = BalanceError> = std::result::Result<T, E>;
