pub mod database;
pub mod metrics;

pub use database::{BalancerSettings, BatchReport, DatabaseBalancer, ProcessFailure};
pub use metrics::BalancerMetrics;
