// src/mc/scenario.rs
//! Scenario orchestrator (C5): drives `n_scenarios` independent paths of
//! `T` steps across `d` variables under correlated or copula-coupled
//! noise, in parallel over rayon with per-worker deterministic RNGs.
//!
//! Direct descendant of the teacher's `mc_engine.rs`: same
//! parallel-over-paths architecture and per-path independent seeding, with
//! the option-pricing `McConfig`/variance-reduction machinery replaced by
//! the general scenario/covenant bundle this crate needs.

use crate::copula::{self, CopulaFamily};
use crate::correlation;
use crate::error::{validation::*, SdeError, SdeResult};
use crate::math_utils::inverse_norm_cdf;
use crate::models::{Discretization, VariableModel, VariableState};
use crate::rng::{Mt19937, RngFactory};
use crate::distributions::standard_normal;
use super::covenant::{Covenant, CovenantAccumulator};
use nalgebra::{DMatrix, DVector};
use rand_core::RngCore;
use rayon::prelude::*;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeStepUnit {
    Daily,
    Weekly,
    Monthly,
    Quarterly,
    Yearly,
}

impl TimeStepUnit {
    pub fn dt_years(&self) -> f64 {
        match self {
            TimeStepUnit::Daily => 1.0 / 252.0,
            TimeStepUnit::Weekly => 1.0 / 52.0,
            TimeStepUnit::Monthly => 1.0 / 12.0,
            TimeStepUnit::Quarterly => 1.0 / 4.0,
            TimeStepUnit::Yearly => 1.0,
        }
    }

    pub fn dt_months(&self) -> f64 {
        self.dt_years() * 12.0
    }
}

/// Cooperative cancellation, checked at scenario boundaries (§5).
#[derive(Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        CancellationToken(Arc::new(AtomicBool::new(false)))
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

#[derive(Clone)]
pub struct Variable {
    pub name: String,
    pub model: VariableModel,
    pub initial_value: f64,
}

#[derive(Clone)]
pub enum NoiseSpec {
    /// `d = 1`: no correlation structure needed.
    None,
    /// `d > 1`: draw `Z ~ N(0, I_d)`, return `L*Z`.
    Correlation(DMatrix<f64>),
    /// Any `d`: draw from the copula, transform to normals via the inverse
    /// standard-normal CDF.
    Copula(CopulaFamily),
}

enum PreparedNoise {
    None,
    Correlation(DMatrix<f64>),
    Copula(CopulaFamily),
}

fn prepare_noise(spec: NoiseSpec, d: usize) -> SdeResult<PreparedNoise> {
    match spec {
        NoiseSpec::None => Ok(PreparedNoise::None),
        NoiseSpec::Correlation(m) => {
            let errors = correlation::validate(&m);
            let m = if errors.is_empty() {
                m
            } else {
                correlation::adjust_to_pd(&m)?
            };
            Ok(PreparedNoise::Correlation(m))
        }
        NoiseSpec::Copula(family) => {
            copula::validate_dimension(&family, d)?;
            Ok(PreparedNoise::Copula(family))
        }
    }
}

fn draw_noise(prepared: &PreparedNoise, d: usize, rng: &mut impl RngCore) -> SdeResult<Vec<f64>> {
    match prepared {
        PreparedNoise::None => Ok(vec![standard_normal(rng)]),
        PreparedNoise::Correlation(l) => {
            let z: Vec<f64> = (0..d).map(|_| standard_normal(rng)).collect();
            let zv = DVector::from_vec(z);
            Ok((l * zv).iter().copied().collect())
        }
        PreparedNoise::Copula(family) => {
            let u = copula::sample(family, rng)?;
            Ok(u.iter().map(|&x| inverse_norm_cdf(x)).collect())
        }
    }
}

#[derive(Clone)]
pub struct ScenarioConfig {
    pub n_scenarios: usize,
    pub horizon_months: f64,
    pub dt_unit: TimeStepUnit,
    pub discretization: Discretization,
    pub random_seed: Option<u64>,
    pub covenants: Vec<Covenant>,
    pub cancellation: Option<CancellationToken>,
}

impl ScenarioConfig {
    fn validate(&self) -> SdeResult<()> {
        validate_scenario_count(self.n_scenarios)?;
        validate_horizon(self.horizon_months)?;
        Ok(())
    }
}

struct ScenarioResult {
    index: usize,
    final_values: HashMap<String, f64>,
    full_trajectory: Option<HashMap<String, Vec<f64>>>,
    failed: bool,
}

pub struct ScenarioOutput {
    pub trajectories: Option<Vec<HashMap<String, Vec<f64>>>>,
    pub final_values: HashMap<String, Vec<f64>>,
    pub n_scenarios_run: usize,
    pub n_scenarios_dropped: usize,
    pub degraded: bool,
    pub degraded_reasons: Vec<String>,
    pub covenants: HashMap<String, CovenantAccumulator>,
}

/// Runs the scenario batch. `need_trajectories` requests the full
/// `n x d x (T+1)` tensor in the returned `ScenarioOutput` (needed by the
/// event evaluator, which must walk each scenario's path); callers that
/// only need final-step values (percentiles, VaR/CVaR) pass `false`, so
/// each worker computes and discards one scenario's path at a time
/// instead of retaining all of them, bounding memory to `O(d * (T+1))`
/// per worker rather than `O(n_scenarios * d * (T+1))` (§5). Covenant
/// accumulation always walks the per-scenario path as it's produced,
/// regardless of `need_trajectories`, since it folds online rather than
/// from a retained tensor.
pub fn run_scenarios(
    variables: &[Variable],
    noise_spec: NoiseSpec,
    config: &ScenarioConfig,
    need_trajectories: bool,
) -> SdeResult<ScenarioOutput> {
    config.validate()?;
    log::info!(
        "run_scenarios: {} scenarios, {} variables, horizon {} months",
        config.n_scenarios,
        variables.len(),
        config.horizon_months
    );
    let d = variables.len();
    let dt = config.dt_unit.dt_years();
    let dt_months = config.dt_unit.dt_months();
    let t_steps = (config.horizon_months / dt_months).ceil() as usize;
    let prepared_noise = prepare_noise(noise_spec, d)?;

    // Covenant folding needs each scenario's path even when the caller
    // itself doesn't want the tensor back.
    let track_path = need_trajectories || !config.covenants.is_empty();

    let seed = config.random_seed.unwrap_or_else(|| {
        use std::time::{SystemTime, UNIX_EPOCH};
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(0)
    });
    let n_workers = rayon::current_num_threads().max(1);
    let factory = RngFactory::new(seed);

    let chunk_size = (config.n_scenarios + n_workers - 1) / n_workers;
    let indices: Vec<usize> = (0..config.n_scenarios).collect();

    let cancellation = config.cancellation.clone();

    let chunks: Vec<Vec<ScenarioResult>> = indices
        .par_chunks(chunk_size.max(1))
        .enumerate()
        .map(|(worker_idx, chunk)| {
            let mut rng = factory.create_rng(worker_idx as u64);
            let mut out = Vec::with_capacity(chunk.len());
            for &scenario_idx in chunk {
                if let Some(token) = &cancellation {
                    if token.is_cancelled() {
                        break;
                    }
                }
                out.push(run_one_scenario(
                    scenario_idx,
                    variables,
                    &prepared_noise,
                    t_steps,
                    dt,
                    config.discretization,
                    track_path,
                    &mut rng,
                ));
            }
            out
        })
        .collect();

    if let Some(token) = &config.cancellation {
        if token.is_cancelled() {
            return Err(SdeError::Cancelled);
        }
    }

    let mut results: Vec<ScenarioResult> = chunks.into_iter().flatten().collect();
    results.sort_by_key(|r| r.index);

    let total = results.len();
    let failed_count = results.iter().filter(|r| r.failed).count();
    let kept: Vec<ScenarioResult> = results.into_iter().filter(|r| !r.failed).collect();

    let mut final_values: HashMap<String, Vec<f64>> = variables
        .iter()
        .map(|v| (v.name.clone(), Vec::with_capacity(kept.len())))
        .collect();
    let mut trajectories = Vec::with_capacity(kept.len());

    let mut covenant_accumulators: HashMap<String, CovenantAccumulator> = config
        .covenants
        .iter()
        .map(|c| (c.variable.clone(), CovenantAccumulator::new(c.clone(), t_steps + 1)))
        .collect();

    for r in &kept {
        for (name, value) in &r.final_values {
            if let Some(v) = final_values.get_mut(name) {
                v.push(*value);
            }
        }
        if let Some(full) = &r.full_trajectory {
            for (name, acc) in covenant_accumulators.iter_mut() {
                if let Some(series) = full.get(name) {
                    acc.observe(series);
                }
            }
        }
    }
    for r in kept.into_iter() {
        if let Some(full) = r.full_trajectory {
            trajectories.push(full);
        }
    }

    let degraded = total > 0 && (failed_count as f64 / total as f64) > 0.01;
    let degraded_reasons = if degraded {
        let reason = format!("{failed_count} of {total} scenarios dropped due to numerical instability");
        log::warn!("run_scenarios: {reason}");
        vec![reason]
    } else {
        Vec::new()
    };

    Ok(ScenarioOutput {
        trajectories: if need_trajectories { Some(trajectories) } else { None },
        final_values,
        n_scenarios_run: total - failed_count,
        n_scenarios_dropped: failed_count,
        degraded,
        degraded_reasons,
        covenants: covenant_accumulators,
    })
}

#[allow(clippy::too_many_arguments)]
fn run_one_scenario(
    index: usize,
    variables: &[Variable],
    prepared_noise: &PreparedNoise,
    t_steps: usize,
    dt: f64,
    discretization: Discretization,
    collect_trajectory: bool,
    rng: &mut Mt19937,
) -> ScenarioResult {
    let d = variables.len();
    let mut states: Vec<VariableState> = variables
        .iter()
        .map(|v| v.model.initial_state(v.initial_value))
        .collect();

    let mut series: HashMap<String, Vec<f64>> = if collect_trajectory {
        variables
            .iter()
            .zip(&states)
            .map(|(v, s)| (v.name.clone(), vec![s.value]))
            .collect()
    } else {
        HashMap::new()
    };

    let mut failed = false;
    for _ in 0..t_steps {
        let z = match draw_noise(prepared_noise, d, rng) {
            Ok(z) => z,
            Err(_) => {
                failed = true;
                break;
            }
        };
        for (i, variable) in variables.iter().enumerate() {
            if variable.model.step(&mut states[i], dt, z[i], discretization, rng).is_err() {
                failed = true;
            }
            if !states[i].value.is_finite() {
                failed = true;
            }
        }
        if failed {
            break;
        }
        if collect_trajectory {
            for (v, s) in variables.iter().zip(&states) {
                series.get_mut(&v.name).unwrap().push(s.value);
            }
        }
    }

    let final_values = variables
        .iter()
        .zip(&states)
        .map(|(v, s)| (v.name.clone(), s.value))
        .collect();

    ScenarioResult {
        index,
        final_values,
        full_trajectory: if collect_trajectory && !failed { Some(series) } else { None },
        failed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Gbm;

    fn gbm_variable(name: &str) -> Variable {
        Variable {
            name: name.to_string(),
            model: VariableModel::Gbm(Gbm::new(100.0, 0.05, 0.2).unwrap()),
            initial_value: 100.0,
        }
    }

    #[test]
    fn deterministic_given_same_seed() {
        let config = ScenarioConfig {
            n_scenarios: 200,
            horizon_months: 12.0,
            dt_unit: TimeStepUnit::Monthly,
            discretization: Discretization::Euler,
            random_seed: Some(42),
            covenants: Vec::new(),
            cancellation: None,
        };
        let vars = vec![gbm_variable("price")];
        let out1 = run_scenarios(&vars, NoiseSpec::None, &config, false).unwrap();
        let out2 = run_scenarios(&vars, NoiseSpec::None, &config, false).unwrap();
        let mut a = out1.final_values["price"].clone();
        let mut b = out2.final_values["price"].clone();
        a.sort_by(|x, y| x.partial_cmp(y).unwrap());
        b.sort_by(|x, y| x.partial_cmp(y).unwrap());
        assert_eq!(a, b);
    }

    #[test]
    fn rejects_non_positive_scenario_count() {
        let config = ScenarioConfig {
            n_scenarios: 0,
            horizon_months: 12.0,
            dt_unit: TimeStepUnit::Monthly,
            discretization: Discretization::Euler,
            random_seed: Some(1),
            covenants: Vec::new(),
            cancellation: None,
        };
        let vars = vec![gbm_variable("price")];
        assert!(run_scenarios(&vars, NoiseSpec::None, &config, false).is_err());
    }

    #[test]
    fn cancellation_aborts_without_partial_result() {
        let token = CancellationToken::new();
        token.cancel();
        let config = ScenarioConfig {
            n_scenarios: 1000,
            horizon_months: 12.0,
            dt_unit: TimeStepUnit::Monthly,
            discretization: Discretization::Euler,
            random_seed: Some(1),
            covenants: Vec::new(),
            cancellation: Some(token),
        };
        let vars = vec![gbm_variable("price")];
        assert!(matches!(
            run_scenarios(&vars, NoiseSpec::None, &config, false),
            Err(SdeError::Cancelled)
        ));
    }

    #[test]
    fn covenant_folds_without_retaining_trajectories() {
        use super::super::covenant::Covenant;
        use crate::events::ComparisonOp;

        let config = ScenarioConfig {
            n_scenarios: 300,
            horizon_months: 12.0,
            dt_unit: TimeStepUnit::Monthly,
            discretization: Discretization::Euler,
            random_seed: Some(7),
            covenants: vec![Covenant {
                variable: "price".to_string(),
                op: ComparisonOp::Lt,
                threshold: 50.0,
            }],
            cancellation: None,
        };
        let vars = vec![gbm_variable("price")];
        let out = run_scenarios(&vars, NoiseSpec::None, &config, false).unwrap();
        assert!(out.trajectories.is_none());
        let acc = out.covenants.get("price").unwrap();
        assert!(acc.breach_probability(0) >= 0.0);
    }
}
