pub mod types;
pub mod flow;
pub mod process;
pub mod store;
pub mod lookup;

pub use types::{to_kg_conversion_factor, FlowKind, NodeKey, Uncertainty, UncertaintyKind};
pub use flow::{Flow, FormulaSlot};
pub use process::{ElementaryFlow, ElementaryKind, ParameterSlot, Process};
pub use store::Inventory;
pub use lookup::{Release, WaterProductTables};
