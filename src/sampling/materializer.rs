use super::{Materializer, SamplingRequest, Samples};
use crate::balance::{Parameter, ParameterDefinition};
use crate::data::{NodeKey, Uncertainty, UncertaintyKind};
use crate::error::SamplingError;
use rand::distributions::Distribution;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use statrs::distribution::{LogNormal, Normal, Triangular, Uniform};
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use tracing::trace;

/// Reference materializer drawing independent Monte-Carlo samples
#[derive(Debug, Clone, Copy, Default)]
pub struct MonteCarloMaterializer {
    seed: Option<u64>,
}

impl MonteCarloMaterializer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reproducible draws; each process gets its own stream derived from `seed`
    pub fn with_seed(seed: u64) -> Self {
        Self { seed: Some(seed) }
    }

    pub fn seed(&self) -> Option<u64> {
        self.seed
    }

    fn rng_for(&self, owner: &NodeKey) -> StdRng {
        match self.seed {
            Some(seed) => {
                let mut hasher = DefaultHasher::new();
                owner.hash(&mut hasher);
                StdRng::seed_from_u64(seed ^ hasher.finish())
            }
            None => StdRng::from_entropy(),
        }
    }
}

impl Materializer for MonteCarloMaterializer {
    fn materialize(&self, request: &SamplingRequest<'_>, iterations: usize) -> Result<Samples, SamplingError> {
        if iterations == 0 {
            return Err(SamplingError::NoIterations);
        }

        let order = evaluation_order(request.parameters)?;
        let mut rng = self.rng_for(request.owner);
        let mut columns: HashMap<&str, Vec<f64>> = HashMap::with_capacity(request.parameters.len());

        for index in order {
            let parameter = &request.parameters[index];
            let column = match &parameter.definition {
                ParameterDefinition::Sampled { amount, uncertainty } => {
                    draw(&parameter.name, *amount, uncertainty, iterations, &mut rng)?
                }
                ParameterDefinition::Derived(formula) => (0..iterations)
                    .map(|i| formula.eval(&|name| columns.get(name).map(|c| c[i])))
                    .collect::<Result<Vec<_>, _>>()?,
            };
            columns.insert(parameter.name.as_str(), column);
        }

        let mut samples = Samples::new(iterations);
        for target in &request.targets {
            if columns.contains_key(target.name.as_str()) {
                return Err(SamplingError::DuplicateParameter(target.name.clone()));
            }
            let row = (0..iterations)
                .map(|i| target.formula.eval(&|name| columns.get(name).map(|c| c[i])))
                .collect::<Result<Vec<_>, _>>()?;
            samples.insert(target.name.clone(), row);
        }

        trace!(
            process = %request.owner,
            parameters = columns.len(),
            targets = request.targets.len(),
            iterations,
            "Materialized samples"
        );

        for (name, column) in columns {
            samples.insert(name, column);
        }
        Ok(samples)
    }
}

#[derive(Clone, Copy, PartialEq)]
enum Mark {
    Unvisited,
    Visiting,
    Done,
}

/// Indices of `parameters` with every derived parameter after its references
fn evaluation_order(parameters: &[Parameter]) -> Result<Vec<usize>, SamplingError> {
    let mut by_name = HashMap::with_capacity(parameters.len());
    for (index, parameter) in parameters.iter().enumerate() {
        if by_name.insert(parameter.name.as_str(), index).is_some() {
            return Err(SamplingError::DuplicateParameter(parameter.name.clone()));
        }
    }

    let mut marks = vec![Mark::Unvisited; parameters.len()];
    let mut order = Vec::with_capacity(parameters.len());
    for index in 0..parameters.len() {
        visit(index, parameters, &by_name, &mut marks, &mut order)?;
    }
    Ok(order)
}

fn visit(
    index: usize,
    parameters: &[Parameter],
    by_name: &HashMap<&str, usize>,
    marks: &mut [Mark],
    order: &mut Vec<usize>,
) -> Result<(), SamplingError> {
    match marks[index] {
        Mark::Done => return Ok(()),
        Mark::Visiting => return Err(SamplingError::CircularDependency(parameters[index].name.clone())),
        Mark::Unvisited => {}
    }

    marks[index] = Mark::Visiting;
    if let ParameterDefinition::Derived(formula) = &parameters[index].definition {
        for name in formula.references() {
            let dependency = *by_name
                .get(name)
                .ok_or_else(|| SamplingError::UnknownParameter(name.to_string()))?;
            visit(dependency, parameters, by_name, marks, order)?;
        }
    }
    marks[index] = Mark::Done;
    order.push(index);
    Ok(())
}

fn sample_n<D: Distribution<f64>, R: Rng>(dist: &D, n: usize, rng: &mut R) -> Vec<f64> {
    (0..n).map(|_| dist.sample(rng)).collect()
}

/// Draw `n` values for one parameter
fn draw(
    name: &str,
    amount: f64,
    uncertainty: &Uncertainty,
    n: usize,
    rng: &mut StdRng,
) -> Result<Vec<f64>, SamplingError> {
    let invalid = |reason: String| SamplingError::InvalidDistribution {
        name: name.to_string(),
        reason,
    };
    let required = |field: Option<f64>, what: &str| {
        field.ok_or_else(|| invalid(format!("{} requires {}", uncertainty.kind.as_str(), what)))
    };

    match uncertainty.kind {
        UncertaintyKind::Undefined | UncertaintyKind::None => Ok(vec![amount; n]),
        UncertaintyKind::Lognormal => {
            let loc = uncertainty.loc.unwrap_or_else(|| amount.abs().ln());
            let scale = required(uncertainty.scale, "a scale")?;
            let sign = if uncertainty.negative { -1.0 } else { 1.0 };
            if scale == 0.0 {
                return Ok(vec![sign * loc.exp(); n]);
            }
            let dist = LogNormal::new(loc, scale).map_err(|e| invalid(e.to_string()))?;
            Ok(sample_n(&dist, n, rng).into_iter().map(|v| sign * v).collect())
        }
        UncertaintyKind::Normal => {
            let loc = uncertainty.loc.unwrap_or(amount);
            let scale = required(uncertainty.scale, "a scale")?;
            if scale == 0.0 {
                return Ok(vec![loc; n]);
            }
            let dist = Normal::new(loc, scale).map_err(|e| invalid(e.to_string()))?;
            Ok(sample_n(&dist, n, rng))
        }
        UncertaintyKind::Uniform => {
            let min = required(uncertainty.minimum, "a minimum")?;
            let max = required(uncertainty.maximum, "a maximum")?;
            if min == max {
                return Ok(vec![min; n]);
            }
            let dist = Uniform::new(min, max).map_err(|e| invalid(e.to_string()))?;
            Ok(sample_n(&dist, n, rng))
        }
        UncertaintyKind::Triangular => {
            let min = required(uncertainty.minimum, "a minimum")?;
            let max = required(uncertainty.maximum, "a maximum")?;
            let mode = uncertainty.loc.unwrap_or(amount);
            if min == max {
                return Ok(vec![min; n]);
            }
            let dist = Triangular::new(min, max, mode).map_err(|e| invalid(e.to_string()))?;
            Ok(sample_n(&dist, n, rng))
        }
    }
}
