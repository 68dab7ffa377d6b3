use crate::data::{to_kg_conversion_factor, Flow, FlowKind, NodeKey, Process};
use crate::diagnostics::{Diagnostic, DiagnosticKind};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// Side of the balance a flow contributes to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    In,
    Out,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::In => "input",
            Side::Out => "output",
        }
    }
}

/// Structural role of a flow in the water balance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowClass {
    /// Production of a water-supplying process
    TechnoTransfoOutput,
    /// Input of water supplied by another process
    TechnoTransfoInput,
    /// Production of a treatment process (negative amount)
    TechnoTreatOutput,
    /// Water sent to a treatment process (negative amount)
    TechnoTreatInput,
    BioRess,
    BioEmission,
    Skip,
}

impl FlowClass {
    pub fn side(&self) -> Option<Side> {
        match self {
            FlowClass::TechnoTransfoOutput | FlowClass::TechnoTreatInput | FlowClass::BioEmission => {
                Some(Side::Out)
            }
            FlowClass::TechnoTransfoInput | FlowClass::TechnoTreatOutput | FlowClass::BioRess => {
                Some(Side::In)
            }
            FlowClass::Skip => None,
        }
    }

    pub fn is_treatment(&self) -> bool {
        matches!(self, FlowClass::TechnoTreatOutput | FlowClass::TechnoTreatInput)
    }

    /// Treatment amounts already encode the opposite physical direction
    pub fn sign(&self) -> f64 {
        if self.is_treatment() {
            -1.0
        } else {
            1.0
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FlowClass::TechnoTransfoOutput => "techno_transfo_output",
            FlowClass::TechnoTransfoInput => "techno_transfo_input",
            FlowClass::TechnoTreatOutput => "techno_treat_output",
            FlowClass::TechnoTreatInput => "techno_treat_input",
            FlowClass::BioRess => "bio_ress",
            FlowClass::BioEmission => "bio_emission",
            FlowClass::Skip => "skip",
        }
    }
}

impl fmt::Display for FlowClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether `amount` has the wrong sign for `class`
///
/// Diagnostic only. Treatment roles expect negative amounts, every other
/// role expects positive ones.
pub fn has_abnormal_sign(class: FlowClass, amount: f64) -> bool {
    match class {
        FlowClass::Skip => false,
        c if c.is_treatment() => amount > 0.0,
        _ => amount < 0.0,
    }
}

/// The four key sets that make a counterpart water-relevant
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WaterUniverse {
    transformation: HashSet<NodeKey>,
    treatment: HashSet<NodeKey>,
    resources: HashSet<NodeKey>,
    emissions: HashSet<NodeKey>,
}

impl WaterUniverse {
    pub fn new(
        transformation: impl IntoIterator<Item = NodeKey>,
        treatment: impl IntoIterator<Item = NodeKey>,
        resources: impl IntoIterator<Item = NodeKey>,
        emissions: impl IntoIterator<Item = NodeKey>,
    ) -> Self {
        Self {
            transformation: transformation.into_iter().collect(),
            treatment: treatment.into_iter().collect(),
            resources: resources.into_iter().collect(),
            emissions: emissions.into_iter().collect(),
        }
    }

    pub fn contains(&self, key: &NodeKey) -> bool {
        self.transformation.contains(key)
            || self.treatment.contains(key)
            || self.resources.contains(key)
            || self.emissions.contains(key)
    }

    pub fn transformation(&self) -> &HashSet<NodeKey> {
        &self.transformation
    }

    pub fn treatment(&self) -> &HashSet<NodeKey> {
        &self.treatment
    }

    pub fn resources(&self) -> &HashSet<NodeKey> {
        &self.resources
    }

    pub fn emissions(&self) -> &HashSet<NodeKey> {
        &self.emissions
    }

    pub fn len(&self) -> usize {
        self.transformation.len() + self.treatment.len() + self.resources.len() + self.emissions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Class implied by set membership and role tag, if they agree
    fn resolve(&self, flow: &Flow) -> Option<FlowClass> {
        let key = &flow.input;
        if self.transformation.contains(key) {
            match flow.kind {
                FlowKind::Production => Some(FlowClass::TechnoTransfoOutput),
                FlowKind::Technosphere => Some(FlowClass::TechnoTransfoInput),
                FlowKind::Biosphere => None,
            }
        } else if self.treatment.contains(key) {
            match flow.kind {
                FlowKind::Production => Some(FlowClass::TechnoTreatOutput),
                FlowKind::Technosphere => Some(FlowClass::TechnoTreatInput),
                FlowKind::Biosphere => None,
            }
        } else if self.resources.contains(key) {
            (flow.kind == FlowKind::Biosphere).then_some(FlowClass::BioRess)
        } else if self.emissions.contains(key) {
            (flow.kind == FlowKind::Biosphere).then_some(FlowClass::BioEmission)
        } else {
            None
        }
    }
}

/// A water-relevant flow with its role
#[derive(Debug, Clone, PartialEq)]
pub struct ClassifiedFlow {
    /// Position in the owning process's flow list
    pub index: usize,
    pub class: FlowClass,
    pub conversion_factor: Option<f64>,
    pub abnormal_sign: Option<bool>,
}

/// Classifier output for one process
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Classification {
    /// Water-relevant flows in process order, `skip` included
    pub flows: Vec<ClassifiedFlow>,
    pub diagnostics: Vec<Diagnostic>,
}

impl Classification {
    /// True when no flow of the process touches the water universe
    pub fn is_empty(&self) -> bool {
        self.flows.is_empty()
    }

    /// Flows that take part in balancing
    pub fn active(&self) -> impl Iterator<Item = &ClassifiedFlow> {
        self.flows.iter().filter(|f| f.class != FlowClass::Skip)
    }
}

/// Labels every water-relevant flow of a process
pub struct FlowClassifier<'u> {
    universe: &'u WaterUniverse,
}

impl<'u> FlowClassifier<'u> {
    pub fn new(universe: &'u WaterUniverse) -> Self {
        Self { universe }
    }

    /// Classify without touching the process
    ///
    /// Algorithm:
    /// 1. Ignore flows whose counterpart is outside the water universe
    /// 2. Resolve the role from counterpart set and flow kind; an unresolved
    ///    role becomes `Skip` with a diagnostic
    /// 3. Look up the kg conversion factor; an unknown unit also becomes `Skip`
    /// 4. Flag amounts whose sign disagrees with the role
    ///
    /// Nothing is written back. The caller annotates flows only once it has
    /// decided to balance the process.
    pub fn classify(&self, process: &Process) -> Classification {
        let mut classification = Classification::default();

        for (index, flow) in process.flows.iter().enumerate() {
            if !self.universe.contains(&flow.input) {
                continue;
            }

            // 2. Role
            let class = match self.universe.resolve(flow) {
                Some(class) => class,
                None => {
                    classification.diagnostics.push(
                        Diagnostic::new(
                            Some(process.key.clone()),
                            DiagnosticKind::UnresolvedRole {
                                counterpart: flow.input.clone(),
                                flow_kind: flow.kind,
                            },
                        )
                        .emit(),
                    );
                    classification.flows.push(ClassifiedFlow {
                        index,
                        class: FlowClass::Skip,
                        conversion_factor: None,
                        abnormal_sign: None,
                    });
                    continue;
                }
            };

            // 3. Unit
            let conversion_factor = to_kg_conversion_factor(&flow.unit);
            if conversion_factor.is_none() {
                classification.diagnostics.push(
                    Diagnostic::new(
                        Some(process.key.clone()),
                        DiagnosticKind::UnrecognizedUnit {
                            counterpart: flow.input.clone(),
                            unit: flow.unit.clone(),
                        },
                    )
                    .emit(),
                );
                classification.flows.push(ClassifiedFlow {
                    index,
                    class: FlowClass::Skip,
                    conversion_factor: None,
                    abnormal_sign: None,
                });
                continue;
            }

            classification.flows.push(ClassifiedFlow {
                index,
                class,
                conversion_factor,
                // 4. Sign
                abnormal_sign: Some(has_abnormal_sign(class, flow.amount)),
            });
        }

        classification
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Uncertainty;

    fn key(code: &str) -> NodeKey {
        NodeKey::new("db", code)
    }

    fn bio(code: &str) -> NodeKey {
        NodeKey::new("biosphere", code)
    }

    fn universe() -> WaterUniverse {
        WaterUniverse::new(
            vec![key("tap")],
            vec![key("wwt")],
            vec![bio("from nature")],
            vec![bio("to water")],
        )
    }

    #[test]
    fn test_classes_by_membership_and_role() {
        let p = key("P");
        let process = Process::new(p.clone(), "P", "thing", 1.0, "kilogram")
            .with_flow(Flow::new(key("tap"), p.clone(), FlowKind::Technosphere, "kilogram", 2.0))
            .with_flow(Flow::new(key("wwt"), p.clone(), FlowKind::Technosphere, "cubic meter", -0.001))
            .with_flow(Flow::new(bio("from nature"), p.clone(), FlowKind::Biosphere, "kilogram", 1.0))
            .with_flow(Flow::new(bio("to water"), p.clone(), FlowKind::Biosphere, "kilogram", 2.0))
            .with_flow(Flow::new(key("other"), p.clone(), FlowKind::Technosphere, "kilogram", 5.0));

        let classification = FlowClassifier::new(&universe()).classify(&process);
        let classes: Vec<FlowClass> = classification.flows.iter().map(|f| f.class).collect();
        assert_eq!(
            classes,
            vec![
                FlowClass::TechnoTransfoInput,
                FlowClass::TechnoTreatInput,
                FlowClass::BioRess,
                FlowClass::BioEmission,
            ]
        );
        assert_eq!(classification.flows[1].conversion_factor, Some(1000.0));
        assert!(classification.diagnostics.is_empty());
    }

    #[test]
    fn test_production_of_water_processes() {
        let tap = key("tap");
        let wwt = key("wwt");
        let supply = Process::new(tap.clone(), "tap", "tap water", 1.0, "kilogram")
            .with_flow(Flow::new(tap.clone(), tap.clone(), FlowKind::Production, "kilogram", 1.0));
        let treatment = Process::new(wwt.clone(), "wwt", "ww", -1.0, "kilogram")
            .with_flow(Flow::new(wwt.clone(), wwt.clone(), FlowKind::Production, "kilogram", -1.0));

        let u = universe();
        let classifier = FlowClassifier::new(&u);
        assert_eq!(classifier.classify(&supply).flows[0].class, FlowClass::TechnoTransfoOutput);
        let treated = classifier.classify(&treatment);
        assert_eq!(treated.flows[0].class, FlowClass::TechnoTreatOutput);
        assert_eq!(treated.flows[0].abnormal_sign, Some(false));
    }

    #[test]
    fn test_unrecognized_unit_is_skipped_with_diagnostic() {
        let p = key("P");
        let process = Process::new(p.clone(), "P", "thing", 1.0, "kilogram")
            .with_flow(
                Flow::new(bio("from nature"), p.clone(), FlowKind::Biosphere, "litre", 1.0)
                    .with_uncertainty(Uncertainty::lognormal(1.0, 0.1)),
            );

        let classification = FlowClassifier::new(&universe()).classify(&process);
        assert_eq!(classification.flows[0].class, FlowClass::Skip);
        assert_eq!(classification.active().count(), 0);
        assert!(matches!(
            classification.diagnostics[0].kind,
            DiagnosticKind::UnrecognizedUnit { ref unit, .. } if unit == "litre"
        ));
    }

    #[test]
    fn test_mismatched_role_is_skipped_with_diagnostic() {
        let p = key("P");
        let process = Process::new(p.clone(), "P", "thing", 1.0, "kilogram")
            .with_flow(Flow::new(key("tap"), p.clone(), FlowKind::Biosphere, "kilogram", 1.0));

        let classification = FlowClassifier::new(&universe()).classify(&process);
        assert_eq!(classification.flows[0].class, FlowClass::Skip);
        assert!(matches!(
            classification.diagnostics[0].kind,
            DiagnosticKind::UnresolvedRole { flow_kind: FlowKind::Biosphere, .. }
        ));
    }

    #[test]
    fn test_process_outside_universe_is_empty() {
        let p = key("P");
        let process = Process::new(p.clone(), "P", "thing", 1.0, "kilogram")
            .with_flow(Flow::new(p.clone(), p.clone(), FlowKind::Production, "kilogram", 1.0));
        assert!(FlowClassifier::new(&universe()).classify(&process).is_empty());
    }

    #[test]
    fn test_abnormal_sign() {
        assert!(has_abnormal_sign(FlowClass::BioRess, -1.0));
        assert!(!has_abnormal_sign(FlowClass::BioEmission, 3.0));
        assert!(has_abnormal_sign(FlowClass::TechnoTreatInput, 6.0));
        assert!(!has_abnormal_sign(FlowClass::TechnoTreatOutput, -1.0));
        assert!(!has_abnormal_sign(FlowClass::Skip, -1.0));
    }

    #[test]
    fn test_sides_and_signs() {
        assert_eq!(FlowClass::TechnoTreatInput.side(), Some(Side::Out));
        assert_eq!(FlowClass::TechnoTreatOutput.side(), Some(Side::In));
        assert_eq!(FlowClass::TechnoTreatOutput.sign(), -1.0);
        assert_eq!(FlowClass::BioRess.sign(), 1.0);
        assert_eq!(FlowClass::Skip.side(), None);
    }
}
