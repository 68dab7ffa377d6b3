use crate::data::{FlowKind, NodeKey};
use serde::Serialize;
use std::fmt;
use tracing::warn;

/// Non-fatal condition met while classifying, balancing or packaging
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DiagnosticKind {
    /// Counterpart is water-relevant but the role tag does not resolve to a class
    UnresolvedRole { counterpart: NodeKey, flow_kind: FlowKind },
    UnrecognizedUnit { counterpart: NodeKey, unit: String },
    ReleaseFallback { requested: String, used: String },
    /// Water product with a zero production amount cannot be told apart as supply or treatment
    ZeroProductionAmount { product: String },
    UnknownElementaryType { flow: NodeKey },
    NoSamples,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Diagnostic {
    /// Process (or other node) the event is about, when there is one
    pub subject: Option<NodeKey>,
    #[serde(flatten)]
    pub kind: DiagnosticKind,
}

impl Diagnostic {
    pub fn new(subject: Option<NodeKey>, kind: DiagnosticKind) -> Self {
        Self { subject, kind }
    }

    /// Log the event and hand it back for aggregation
    pub fn emit(self) -> Self {
        warn!(subject = ?self.subject, "{}", self);
        self
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            DiagnosticKind::UnresolvedRole { counterpart, flow_kind } => write!(
                f,
                "Flow type not understood for flow between {} and {} ({}), not considered in balance",
                counterpart,
                self.subject.as_ref().map(ToString::to_string).unwrap_or_default(),
                flow_kind
            ),
            DiagnosticKind::UnrecognizedUnit { counterpart, unit } => write!(
                f,
                "Unit '{}' for flow between {} and {} not recognized, skipping",
                unit,
                counterpart,
                self.subject.as_ref().map(ToString::to_string).unwrap_or_default()
            ),
            DiagnosticKind::ReleaseFallback { requested, used } => write!(
                f,
                "No data available for version {}, using version {} instead, which may result in some errors",
                requested, used
            ),
            DiagnosticKind::ZeroProductionAmount { product } => write!(
                f,
                "Process {} has a product flow {} with an amount of 0: skipped",
                self.subject.as_ref().map(ToString::to_string).unwrap_or_default(),
                product
            ),
            DiagnosticKind::UnknownElementaryType { flow } => {
                write!(f, "Elementary flow type not understood for {}", flow)
            }
            DiagnosticKind::NoSamples => f.write_str(
                "No package created because there were no matrix data; balance some processes first",
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_release_fallback_message() {
        let d = Diagnostic::new(
            None,
            DiagnosticKind::ReleaseFallback {
                requested: "x".into(),
                used: "3.6".into(),
            },
        );
        assert_eq!(
            d.to_string(),
            "No data available for version x, using version 3.6 instead, which may result in some errors"
        );
    }

    #[test]
    fn test_serializes_flat() {
        let d = Diagnostic::new(
            Some(NodeKey::new("db", "A")),
            DiagnosticKind::UnrecognizedUnit {
                counterpart: NodeKey::new("biosphere", "w"),
                unit: "litre".into(),
            },
        );
        let json = serde_json::to_value(&d).unwrap();
        assert_eq!(json["kind"], "unrecognized_unit");
        assert_eq!(json["unit"], "litre");
    }
}
