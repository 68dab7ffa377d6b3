use super::flow::Flow;
use super::types::NodeKey;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Process-level host parameters, moved aside while a pass runs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParameterSlot {
    Active(Vec<Value>),
    Stashed(Vec<Value>),
}

impl Default for ParameterSlot {
    fn default() -> Self {
        ParameterSlot::Active(Vec::new())
    }
}

impl ParameterSlot {
    pub fn stash(&mut self) {
        if let ParameterSlot::Active(params) = self {
            let params = std::mem::take(params);
            *self = ParameterSlot::Stashed(params);
        }
    }

    pub fn restore(&mut self) {
        if let ParameterSlot::Stashed(params) = self {
            let params = std::mem::take(params);
            *self = ParameterSlot::Active(params);
        }
    }

    /// Parameters visible to the host; empty while stashed
    pub fn active(&self) -> &[Value] {
        match self {
            ParameterSlot::Active(params) => params,
            ParameterSlot::Stashed(_) => &[],
        }
    }

    pub fn is_stashed(&self) -> bool {
        matches!(self, ParameterSlot::Stashed(_))
    }
}

/// Unit of activity with its flows
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Process {
    pub key: NodeKey,
    pub name: String,
    pub reference_product: String,
    /// Amount of the reference product; negative for treatment processes
    pub production_amount: f64,
    pub unit: String,
    #[serde(default)]
    pub flows: Vec<Flow>,
    #[serde(default)]
    pub parameters: ParameterSlot,
}

impl Process {
    pub fn new(
        key: NodeKey,
        name: impl Into<String>,
        reference_product: impl Into<String>,
        production_amount: f64,
        unit: impl Into<String>,
    ) -> Self {
        Self {
            key,
            name: name.into(),
            reference_product: reference_product.into(),
            production_amount,
            unit: unit.into(),
            flows: Vec::new(),
            parameters: ParameterSlot::default(),
        }
    }

    pub fn with_flow(mut self, flow: Flow) -> Self {
        self.flows.push(flow);
        self
    }

    pub fn with_parameters(mut self, parameters: Vec<Value>) -> Self {
        self.parameters = ParameterSlot::Active(parameters);
        self
    }

    /// Whether any formula or parameter slot is mid-pass
    pub fn has_pass_state(&self) -> bool {
        self.parameters.is_stashed() || self.flows.iter().any(|f| !f.formula.is_at_rest())
    }
}

/// Classification of an elementary flow in the biosphere database
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElementaryKind {
    #[serde(rename = "natural resource")]
    NaturalResource,
    Emission,
    #[serde(other)]
    Other,
}

/// Substance exchanged with the environment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElementaryFlow {
    pub key: NodeKey,
    pub name: String,
    pub kind: ElementaryKind,
    pub unit: String,
}

impl ElementaryFlow {
    pub fn new(key: NodeKey, name: impl Into<String>, kind: ElementaryKind, unit: impl Into<String>) -> Self {
        Self {
            key,
            name: name.into(),
            kind,
            unit: unit.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parameter_slot_round_trip() {
        let mut slot = ParameterSlot::Active(vec![json!({"name": "p", "amount": 2.0})]);
        slot.stash();
        assert!(slot.is_stashed());
        assert!(slot.active().is_empty());
        slot.stash();
        slot.restore();
        assert_eq!(slot, ParameterSlot::Active(vec![json!({"name": "p", "amount": 2.0})]));
    }

    #[test]
    fn test_elementary_kind_from_host_labels() {
        let kind: ElementaryKind = serde_json::from_str("\"natural resource\"").unwrap();
        assert_eq!(kind, ElementaryKind::NaturalResource);
        let kind: ElementaryKind = serde_json::from_str("\"economic\"").unwrap();
        assert_eq!(kind, ElementaryKind::Other);
    }
}
