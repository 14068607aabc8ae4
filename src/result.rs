// src/result.rs
//! Result bundles and the top-level orchestration functions (§6) that
//! assemble them from `mc::scenario::run_scenarios`, `events::evaluate`,
//! and `aggregate`.

use crate::aggregate::{percentile_map, probability_estimate, var_cvar, PercentileSet, ProbabilityEstimate};
use crate::copula::{self, CopulaFamily, Rotation};
use crate::error::{SdeError, SdeResult};
use crate::events::{self, Event, Trajectory};
use crate::mc::covenant::CovenantAccumulator;
use crate::mc::scenario::{run_scenarios, NoiseSpec, ScenarioConfig, Variable};
use crate::math_utils::Timer;
use nalgebra::DMatrix;
use std::collections::HashMap;

#[derive(Debug, Clone)]
pub struct SimulationResult {
    pub percentiles: HashMap<String, PercentileSet>,
    pub var_99: Option<f64>,
    pub es_99: Option<f64>,
    pub n_scenarios: usize,
    pub compute_time_ms: f64,
    pub degraded: bool,
    pub degraded_reasons: Vec<String>,
    pub covenants: HashMap<String, CovenantAccumulator>,
}

/// Runs the base scenario batch (no event evaluation) and aggregates
/// percentiles / tail risk for a designated `risk_variable`.
pub fn run_simulation(
    variables: &[Variable],
    noise_spec: NoiseSpec,
    config: &ScenarioConfig,
    risk_variable: Option<&str>,
) -> SdeResult<SimulationResult> {
    let timer = Timer::new();
    let output = run_scenarios(variables, noise_spec, config, false)?;
    let percentiles = percentile_map(&output.final_values);

    let (var_99, es_99) = match risk_variable.and_then(|name| output.final_values.get(name)) {
        Some(values) => {
            let mut sorted = values.clone();
            sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
            let (var, es) = var_cvar(&sorted, 99.0);
            (Some(var), Some(es))
        }
        None => (None, None),
    };

    Ok(SimulationResult {
        percentiles,
        var_99,
        es_99,
        n_scenarios: output.n_scenarios_run,
        compute_time_ms: timer.elapsed_ms(),
        degraded: output.degraded,
        degraded_reasons: output.degraded_reasons,
        covenants: output.covenants,
    })
}

#[derive(Debug, Clone)]
pub struct Decomposition {
    pub per_variable: HashMap<String, f64>,
    pub joint_independent: f64,
    pub joint_copula: f64,
    pub copula_risk_multiplier: f64,
}

#[derive(Debug, Clone)]
pub struct EventProbabilityResult {
    pub probability: ProbabilityEstimate,
    pub decomposition: Decomposition,
    pub n_scenarios: usize,
    pub compute_time_ms: f64,
    pub model_comparison: Option<HashMap<String, ProbabilityEstimate>>,
}

fn build_trajectory_sets(
    trajectories: &[HashMap<String, Vec<f64>>],
    dt_months: f64,
) -> Vec<HashMap<String, Trajectory>> {
    trajectories
        .iter()
        .map(|per_var| {
            per_var
                .iter()
                .map(|(name, values)| {
                    (
                        name.clone(),
                        Trajectory {
                            values: values.as_slice(),
                            dt_months,
                        },
                    )
                })
                .collect()
        })
        .collect()
}

/// Resolves an event's probability against a batch of per-scenario
/// trajectory sets. `conditional` events are resolved at this level (§4.6):
/// the per-scenario callback only reports `event`'s truth, and this
/// function divides by the count of scenarios where `given` held.
fn resolve_probability(
    event: &Event,
    trajectory_sets: &[HashMap<String, Trajectory>],
) -> SdeResult<(usize, usize)> {
    if let Event::Conditional { event: inner, given } = event {
        let mut joint = 0usize;
        let mut given_count = 0usize;
        for traj in trajectory_sets {
            if events::evaluate(given, traj)? {
                given_count += 1;
                if events::evaluate(inner, traj)? {
                    joint += 1;
                }
            }
        }
        if given_count == 0 {
            return Err(SdeError::NoObservations {
                context: "conditional event's 'given' leg never occurred".to_string(),
            });
        }
        return Ok((joint, given_count));
    }
    let mut count = 0usize;
    for traj in trajectory_sets {
        if events::evaluate(event, traj)? {
            count += 1;
        }
    }
    Ok((count, trajectory_sets.len()))
}

fn decompose(
    event: &Event,
    trajectory_sets: &[HashMap<String, Trajectory>],
    joint_copula: f64,
) -> SdeResult<Decomposition> {
    let mut per_variable: HashMap<String, f64> = HashMap::new();
    for (variable, op, threshold, horizon_months) in events::leaf_thresholds(event) {
        if per_variable.contains_key(&variable) {
            continue;
        }
        let leaf = Event::ThresholdBreach {
            variable: variable.clone(),
            op,
            threshold,
            horizon_months,
        };
        let mut count = 0usize;
        for traj in trajectory_sets {
            if events::evaluate(&leaf, traj)? {
                count += 1;
            }
        }
        per_variable.insert(variable, count as f64 / trajectory_sets.len().max(1) as f64);
    }

    let joint_independent: f64 = per_variable.values().product();
    let copula_risk_multiplier = if joint_independent > 0.0 {
        joint_copula / joint_independent
    } else {
        1.0
    };

    Ok(Decomposition {
        per_variable,
        joint_independent,
        joint_copula,
        copula_risk_multiplier,
    })
}

/// Evaluates `event`'s probability across a scenario batch run under
/// `noise_spec`.
pub fn run_event_simulation(
    event: &Event,
    variables: &[Variable],
    noise_spec: NoiseSpec,
    config: &ScenarioConfig,
) -> SdeResult<EventProbabilityResult> {
    let timer = Timer::new();
    let known: Vec<String> = variables.iter().map(|v| v.name.clone()).collect();
    event.validate(&known)?;

    let dt_months = config.dt_unit.dt_months();
    let output = run_scenarios(variables, noise_spec, config, true)?;
    let trajectories = output
        .trajectories
        .as_ref()
        .expect("run_scenarios returns trajectories when need_trajectories is true");
    let trajectory_sets = build_trajectory_sets(trajectories, dt_months);

    let (k, n) = resolve_probability(event, &trajectory_sets)?;
    let probability = probability_estimate(k, n);
    let decomposition = decompose(event, &trajectory_sets, probability.mean)?;

    Ok(EventProbabilityResult {
        probability,
        decomposition,
        n_scenarios: output.n_scenarios_run,
        compute_time_ms: timer.elapsed_ms(),
        model_comparison: None,
    })
}

/// Runs `event` under Gaussian, Clayton, Gumbel, and Student-t copulas with
/// an identical seed, and returns the Clayton run augmented with a
/// `model_comparison` map of the other three (§6). Restricted to `d == 2`
/// since Clayton/Gumbel are only defined pairwise. `tau` is the target
/// Kendall's-tau dependence strength shared across all four families so
/// the comparison isolates the choice of dependence structure rather than
/// its strength; Student-t's degrees of freedom is fixed at 5, a moderate
/// tail-heaviness choice with no closed-form link to `tau`.
pub fn run_event_simulation_with_comparison(
    event: &Event,
    variables: &[Variable],
    config: &ScenarioConfig,
    tau: f64,
) -> SdeResult<EventProbabilityResult> {
    if variables.len() != 2 {
        return Err(SdeError::CopulaDimensionUnsupported {
            family: "clayton/gumbel".to_string(),
            dimension: variables.len(),
        });
    }
    const STUDENT_T_DOF: f64 = 5.0;

    let rho = (tau * std::f64::consts::PI / 2.0).sin();
    let correlation = DMatrix::from_row_slice(2, 2, &[1.0, rho, rho, 1.0]);

    let families = [
        ("gaussian", CopulaFamily::Gaussian { correlation: correlation.clone() }),
        (
            "clayton",
            CopulaFamily::Clayton {
                theta: copula::fit::clayton_theta_from_tau(tau)?,
                rotation: Rotation::None,
            },
        ),
        (
            "gumbel",
            CopulaFamily::Gumbel {
                theta: copula::fit::gumbel_theta_from_tau(tau)?,
                rotation: Rotation::None,
            },
        ),
        (
            "student_t",
            CopulaFamily::StudentT {
                correlation,
                dof: STUDENT_T_DOF,
            },
        ),
    ];

    let mut results: HashMap<String, EventProbabilityResult> = HashMap::new();
    for (name, family) in families {
        let result = run_event_simulation(event, variables, NoiseSpec::Copula(family), config)?;
        results.insert(name.to_string(), result);
    }

    let mut clayton = results.remove("clayton").expect("clayton always runs");
    let comparison = results
        .into_iter()
        .map(|(name, r)| (name, r.probability))
        .chain(std::iter::once(("clayton".to_string(), clayton.probability)))
        .collect();
    clayton.model_comparison = Some(comparison);
    Ok(clayton)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::ComparisonOp;
    use crate::mc::scenario::TimeStepUnit;
    use crate::models::{Discretization, Gbm, VariableModel};

    fn gbm_variable(name: &str) -> Variable {
        Variable {
            name: name.to_string(),
            model: VariableModel::Gbm(Gbm::new(100.0, 0.05, 0.2).unwrap()),
            initial_value: 100.0,
        }
    }

    fn config(n: usize) -> ScenarioConfig {
        ScenarioConfig {
            n_scenarios: n,
            horizon_months: 12.0,
            dt_unit: TimeStepUnit::Monthly,
            discretization: Discretization::Euler,
            random_seed: Some(3),
            covenants: Vec::new(),
            cancellation: None,
        }
    }

    #[test]
    fn run_simulation_reports_percentiles_and_var() {
        let variables = vec![gbm_variable("price")];
        let result = run_simulation(&variables, NoiseSpec::None, &config(2000), Some("price")).unwrap();
        assert!(result.percentiles.contains_key("price"));
        assert!(result.var_99.is_some());
        assert!(result.es_99.unwrap() <= result.var_99.unwrap());
    }

    #[test]
    fn run_event_simulation_decomposes_single_variable_event() {
        let variables = vec![gbm_variable("price")];
        let event = Event::ThresholdBreach {
            variable: "price".to_string(),
            op: ComparisonOp::Gt,
            threshold: 90.0,
            horizon_months: 12.0,
        };
        let result = run_event_simulation(&event, &variables, NoiseSpec::None, &config(500)).unwrap();
        assert!(result.probability.mean > 0.5);
        assert!((result.decomposition.joint_copula - result.probability.mean).abs() < 1e-12);
    }

    #[test]
    fn run_event_simulation_rejects_unknown_variable() {
        let variables = vec![gbm_variable("price")];
        let event = Event::ThresholdBreach {
            variable: "ghost".to_string(),
            op: ComparisonOp::Gt,
            threshold: 1.0,
            horizon_months: 12.0,
        };
        assert!(run_event_simulation(&event, &variables, NoiseSpec::None, &config(10)).is_err());
    }

    #[test]
    fn comparison_returns_all_four_families() {
        let variables = vec![gbm_variable("x"), gbm_variable("y")];
        let event = Event::Compound {
            op: crate::events::CompoundOp::And,
            conditions: vec![
                Event::ThresholdBreach {
                    variable: "x".to_string(),
                    op: ComparisonOp::Gt,
                    threshold: 100.0,
                    horizon_months: 12.0,
                },
                Event::ThresholdBreach {
                    variable: "y".to_string(),
                    op: ComparisonOp::Gt,
                    threshold: 100.0,
                    horizon_months: 12.0,
                },
            ],
        };
        let result = run_event_simulation_with_comparison(&event, &variables, &config(500), 0.4).unwrap();
        let comparison = result.model_comparison.unwrap();
        assert!(comparison.contains_key("gaussian"));
        assert!(comparison.contains_key("clayton"));
        assert!(comparison.contains_key("gumbel"));
        assert!(comparison.contains_key("student_t"));
    }
}
