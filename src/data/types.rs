use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of a node in the inventory graph (a process or an elementary flow)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeKey {
    pub database: String,
    pub code: String,
}

impl NodeKey {
    pub fn new(database: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            code: code.into(),
        }
    }
}

impl fmt::Display for NodeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.database, self.code)
    }
}

/// Role tag of a flow within its owning process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlowKind {
    /// Reference product (or co-product) of the process
    Production,
    /// Input from another process's product
    Technosphere,
    /// Exchange with the environment
    Biosphere,
}

impl FlowKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FlowKind::Production => "production",
            FlowKind::Technosphere => "technosphere",
            FlowKind::Biosphere => "biosphere",
        }
    }
}

impl fmt::Display for FlowKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Distribution family of an uncertainty descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UncertaintyKind {
    #[default]
    Undefined,
    None,
    Lognormal,
    Normal,
    Uniform,
    Triangular,
}

impl UncertaintyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            UncertaintyKind::Undefined => "undefined",
            UncertaintyKind::None => "none",
            UncertaintyKind::Lognormal => "lognormal",
            UncertaintyKind::Normal => "normal",
            UncertaintyKind::Uniform => "uniform",
            UncertaintyKind::Triangular => "triangular",
        }
    }

    /// Whether draws of this kind vary between iterations
    pub fn is_uncertain(&self) -> bool {
        !matches!(self, UncertaintyKind::Undefined | UncertaintyKind::None)
    }
}

/// Uncertainty descriptor attached to a flow or a parameter
///
/// Field semantics follow the usual LCA conventions: for `lognormal`, `loc`
/// is the natural log of the median and `scale` the standard deviation of
/// the underlying normal; `negative` flips the sign of every draw.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Uncertainty {
    #[serde(default)]
    pub kind: UncertaintyKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loc: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minimum: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maximum: Option<f64>,
    #[serde(default)]
    pub negative: bool,
}

impl Uncertainty {
    /// Deterministic descriptor pinned at `value`
    pub fn fixed(value: f64) -> Self {
        Self {
            kind: UncertaintyKind::None,
            loc: Some(value),
            ..Self::default()
        }
    }

    pub fn lognormal(median: f64, sigma: f64) -> Self {
        Self {
            kind: UncertaintyKind::Lognormal,
            loc: Some(median.abs().ln()),
            scale: Some(sigma),
            negative: median < 0.0,
            ..Self::default()
        }
    }

    pub fn normal(mean: f64, std_dev: f64) -> Self {
        Self {
            kind: UncertaintyKind::Normal,
            loc: Some(mean),
            scale: Some(std_dev),
            ..Self::default()
        }
    }

    pub fn uniform(minimum: f64, maximum: f64) -> Self {
        Self {
            kind: UncertaintyKind::Uniform,
            minimum: Some(minimum),
            maximum: Some(maximum),
            ..Self::default()
        }
    }

    pub fn triangular(minimum: f64, mode: f64, maximum: f64) -> Self {
        Self {
            kind: UncertaintyKind::Triangular,
            loc: Some(mode),
            minimum: Some(minimum),
            maximum: Some(maximum),
            ..Self::default()
        }
    }

    pub fn is_uncertain(&self) -> bool {
        self.kind.is_uncertain()
    }
}

/// Conversion factor from a flow unit to kilograms of water
///
/// Only mass and water volume are understood; anything else is `None`.
pub fn to_kg_conversion_factor(unit: &str) -> Option<f64> {
    match unit {
        "kilogram" => Some(1.0),
        "cubic meter" => Some(1000.0),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conversion_factors() {
        assert_eq!(to_kg_conversion_factor("kilogram"), Some(1.0));
        assert_eq!(to_kg_conversion_factor("cubic meter"), Some(1000.0));
        assert_eq!(to_kg_conversion_factor("litre"), None);
    }

    #[test]
    fn test_deterministic_kinds() {
        assert!(!UncertaintyKind::Undefined.is_uncertain());
        assert!(!UncertaintyKind::None.is_uncertain());
        assert!(UncertaintyKind::Lognormal.is_uncertain());
        assert!(Uncertainty::uniform(0.0, 1.0).is_uncertain());
    }

    #[test]
    fn test_lognormal_of_negative_median() {
        let u = Uncertainty::lognormal(-2.0, 0.1);
        assert!(u.negative);
        assert!((u.loc.unwrap() - 2.0_f64.ln()).abs() < 1e-12);
    }

    #[test]
    fn test_uncertainty_deserializes_with_defaults() {
        let u: Uncertainty = serde_json::from_str(r#"{"kind": "normal", "loc": 1.0, "scale": 0.1}"#).unwrap();
        assert_eq!(u.kind, UncertaintyKind::Normal);
        assert!(!u.negative);
        assert_eq!(u.minimum, None);
    }
}
