// src/sensitivity.rs
//! Sensitivity sweeps and named stress scenarios (C10): how a simulation's
//! output responds to perturbing one input, and how a bundle of
//! `initial_value`/`mu` shocks moves every variable's final-period
//! statistics.
//!
//! Grounded in the scenario orchestrator's down-sampled rerun pattern —
//! sensitivity and stress both reuse `mc::scenario::run_scenarios` rather
//! than duplicating the stepping loop.

use crate::aggregate::{percentile, percentile_map, PercentileSet};
use crate::error::{validation::*, SdeError, SdeResult};
use crate::mc::scenario::{run_scenarios, NoiseSpec, ScenarioConfig, Variable};
use std::collections::HashMap;

/// A down-sampled rerun is capped at this many scenarios per sweep step
/// or per stress scenario (§4.10).
const MAX_SENSITIVITY_SCENARIOS: usize = 1000;

#[derive(Debug, Clone)]
pub struct SensitivityPoint {
    pub multiplier: f64,
    pub mean: f64,
    pub p10: f64,
    pub p90: f64,
}

#[derive(Debug, Clone)]
pub struct SensitivityResult {
    pub points: Vec<SensitivityPoint>,
    /// `(dy/y) / (dx/x)` evaluated at the midpoint of the sweep.
    pub elasticity_at_midpoint: f64,
    /// Change in output mean from the low endpoint to the high endpoint.
    pub tornado_impact: f64,
}

/// Sweeps `vary`'s multiplier from `lo` to `hi` over `n_steps` points,
/// rerunning a down-sampled simulation at each, and tracks `output`'s
/// mean/p10/p90 across the sweep.
pub fn run_sensitivity(
    base_variables: &[Variable],
    noise_spec_at: impl Fn() -> SdeResult<NoiseSpec>,
    base_config: &ScenarioConfig,
    vary: &str,
    lo: f64,
    hi: f64,
    output: &str,
    n_steps: usize,
) -> SdeResult<SensitivityResult> {
    if n_steps < 2 {
        return Err(SdeError::InvalidParameter {
            parameter: "n_steps".to_string(),
            value: n_steps as f64,
            constraint: "must be at least 2".to_string(),
        });
    }
    if !base_variables.iter().any(|v| v.name == vary) {
        return Err(SdeError::UnknownVariable { name: vary.to_string() });
    }
    if !base_variables.iter().any(|v| v.name == output) {
        return Err(SdeError::UnknownVariable { name: output.to_string() });
    }

    let mut config = base_config.clone();
    validate_positive("lo", lo)?;
    validate_positive("hi", hi)?;
    config.n_scenarios = config.n_scenarios.min(MAX_SENSITIVITY_SCENARIOS);

    let mut points = Vec::with_capacity(n_steps);
    for step in 0..n_steps {
        let multiplier = lo + (hi - lo) * step as f64 / (n_steps - 1) as f64;
        let variables = apply_multiplier(base_variables, vary, multiplier);
        let noise_spec = noise_spec_at()?;
        let result = run_scenarios(&variables, noise_spec, &config, false)?;
        let mut values = result.final_values[output].clone();
        values.sort_by(|a, b| a.partial_cmp(b).unwrap());
        let mean = values.iter().sum::<f64>() / values.len().max(1) as f64;
        points.push(SensitivityPoint {
            multiplier,
            mean,
            p10: percentile(&values, 10.0),
            p90: percentile(&values, 90.0),
        });
    }

    let mid_idx = points.len() / 2;
    let elasticity_at_midpoint = if mid_idx > 0 && mid_idx + 1 < points.len() {
        let (x0, y0) = (points[mid_idx - 1].multiplier, points[mid_idx - 1].mean);
        let (x1, y1) = (points[mid_idx + 1].multiplier, points[mid_idx + 1].mean);
        let y_mid = points[mid_idx].mean;
        let x_mid = points[mid_idx].multiplier;
        if y_mid.abs() > 0.0 && x_mid.abs() > 0.0 {
            ((y1 - y0) / y_mid) / ((x1 - x0) / x_mid)
        } else {
            0.0
        }
    } else {
        0.0
    };

    let tornado_impact = points.last().unwrap().mean - points.first().unwrap().mean;

    Ok(SensitivityResult {
        points,
        elasticity_at_midpoint,
        tornado_impact,
    })
}

fn apply_multiplier(variables: &[Variable], vary: &str, multiplier: f64) -> Vec<Variable> {
    variables
        .iter()
        .map(|v| {
            if v.name == vary {
                Variable {
                    name: v.name.clone(),
                    model: v.model,
                    initial_value: v.initial_value * multiplier,
                }
            } else {
                v.clone()
            }
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShockKind {
    Additive,
    Multiplicative,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShockTarget {
    InitialValue,
    Mu,
}

#[derive(Debug, Clone)]
pub struct Shock {
    pub variable: String,
    pub target: ShockTarget,
    pub kind: ShockKind,
    pub amount: f64,
}

#[derive(Debug, Clone)]
pub struct StressScenario {
    pub name: &'static str,
    pub shocks: Vec<Shock>,
}

fn shock_value(current: f64, shock: &Shock) -> f64 {
    match shock.kind {
        ShockKind::Additive => current + shock.amount,
        ShockKind::Multiplicative => current * shock.amount,
    }
}

fn apply_shocks(variables: &[Variable], shocks: &[Shock]) -> Vec<Variable> {
    variables
        .iter()
        .map(|v| {
            let mut initial_value = v.initial_value;
            let mut model = v.model;
            for shock in shocks.iter().filter(|s| s.variable == v.name) {
                match shock.target {
                    ShockTarget::InitialValue => {
                        initial_value = shock_value(initial_value, shock);
                    }
                    ShockTarget::Mu => {
                        if let Some(current_mu) = model.mu() {
                            model = model.with_mu(shock_value(current_mu, shock));
                        }
                    }
                }
            }
            Variable {
                name: v.name.clone(),
                model,
                initial_value,
            }
        })
        .collect()
}

#[derive(Debug, Clone)]
pub struct StressTestResult {
    pub scenario_name: String,
    pub per_variable: HashMap<String, PercentileSet>,
    pub per_variable_mean: HashMap<String, f64>,
}

/// Applies `scenario`'s shocks to `base_variables`' `initial_value`/`mu`
/// before simulation, then reports per-variable final-period statistics.
pub fn run_stress(
    base_variables: &[Variable],
    noise_spec: NoiseSpec,
    base_config: &ScenarioConfig,
    scenario: &StressScenario,
) -> SdeResult<StressTestResult> {
    for shock in &scenario.shocks {
        if !base_variables.iter().any(|v| v.name == shock.variable) {
            return Err(SdeError::UnknownVariable {
                name: shock.variable.clone(),
            });
        }
    }

    let mut config = base_config.clone();
    config.n_scenarios = config.n_scenarios.min(MAX_SENSITIVITY_SCENARIOS);

    let variables = apply_shocks(base_variables, &scenario.shocks);
    let result = run_scenarios(&variables, noise_spec, &config, false)?;

    let per_variable = percentile_map(&result.final_values);
    let per_variable_mean = result
        .final_values
        .iter()
        .map(|(name, values)| (name.clone(), values.iter().sum::<f64>() / values.len().max(1) as f64))
        .collect();

    Ok(StressTestResult {
        scenario_name: scenario.name.to_string(),
        per_variable,
        per_variable_mean,
    })
}

/// Immutable catalog of named stress scenarios (§5: "the stress-scenario
/// catalog [is an] immutable constant").
pub mod catalog {
    use super::{Shock, ShockKind, ShockTarget, StressScenario};

    pub fn scenarios() -> Vec<StressScenario> {
        vec![market_crash(), stagflation(), liquidity_crunch()]
    }

    pub fn market_crash() -> StressScenario {
        StressScenario {
            name: "market_crash",
            shocks: vec![Shock {
                variable: "price".to_string(),
                target: ShockTarget::InitialValue,
                kind: ShockKind::Multiplicative,
                amount: 0.7,
            }],
        }
    }

    pub fn stagflation() -> StressScenario {
        StressScenario {
            name: "stagflation",
            shocks: vec![Shock {
                variable: "price".to_string(),
                target: ShockTarget::Mu,
                kind: ShockKind::Additive,
                amount: -0.03,
            }],
        }
    }

    pub fn liquidity_crunch() -> StressScenario {
        StressScenario {
            name: "liquidity_crunch",
            shocks: vec![Shock {
                variable: "price".to_string(),
                target: ShockTarget::InitialValue,
                kind: ShockKind::Multiplicative,
                amount: 0.85,
            }],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mc::scenario::TimeStepUnit;
    use crate::models::{Discretization, Gbm, VariableModel};

    fn gbm_variable(name: &str, s0: f64) -> Variable {
        Variable {
            name: name.to_string(),
            model: VariableModel::Gbm(Gbm::new(s0, 0.05, 0.2).unwrap()),
            initial_value: s0,
        }
    }

    fn base_config() -> ScenarioConfig {
        ScenarioConfig {
            n_scenarios: 500,
            horizon_months: 12.0,
            dt_unit: TimeStepUnit::Monthly,
            discretization: Discretization::Euler,
            random_seed: Some(11),
            covenants: Vec::new(),
            cancellation: None,
        }
    }

    #[test]
    fn sensitivity_rejects_unknown_vary_variable() {
        let variables = vec![gbm_variable("price", 100.0)];
        let config = base_config();
        let result = run_sensitivity(
            &variables,
            || Ok(NoiseSpec::None),
            &config,
            "nonexistent",
            0.5,
            1.5,
            "price",
            5,
        );
        assert!(result.is_err());
    }

    #[test]
    fn sensitivity_output_mean_increases_with_initial_value_multiplier() {
        let variables = vec![gbm_variable("price", 100.0)];
        let config = base_config();
        let result = run_sensitivity(
            &variables,
            || Ok(NoiseSpec::None),
            &config,
            "price",
            0.5,
            1.5,
            "price",
            5,
        )
        .unwrap();
        assert!(result.points.first().unwrap().mean < result.points.last().unwrap().mean);
        assert!(result.tornado_impact > 0.0);
    }

    #[test]
    fn stress_rejects_unknown_shock_variable() {
        let variables = vec![gbm_variable("price", 100.0)];
        let config = base_config();
        let scenario = StressScenario {
            name: "bogus",
            shocks: vec![Shock {
                variable: "does_not_exist".to_string(),
                target: ShockTarget::InitialValue,
                kind: ShockKind::Multiplicative,
                amount: 0.5,
            }],
        };
        assert!(run_stress(&variables, NoiseSpec::None, &config, &scenario).is_err());
    }

    #[test]
    fn market_crash_lowers_expected_price() {
        let variables = vec![gbm_variable("price", 100.0)];
        let config = base_config();
        let baseline = run_stress(
            &variables,
            NoiseSpec::None,
            &config,
            &StressScenario {
                name: "none",
                shocks: vec![],
            },
        )
        .unwrap();
        let crashed = run_stress(&variables, NoiseSpec::None, &config, &catalog::market_crash()).unwrap();
        assert!(crashed.per_variable_mean["price"] < baseline.per_variable_mean["price"]);
    }
}
