// src/bayes.rs
//! Conjugate Bayesian updating: Beta-Bernoulli, Normal-Normal,
//! Normal-Inverse-Gamma, plus the A/B test and Thompson sampling built on
//! top of Beta posteriors.
//!
//! Grounded in the retrieval pack's process-triage prior config (a
//! serde-tagged prior record read back from configuration) for the
//! `Prior` enum's shape.

use crate::distributions::gamma as gamma_draw;
use crate::error::{SdeError, SdeResult};
use crate::math_utils::{incomplete_beta, inverse_norm_cdf};
use crate::rng::Mt19937;
use rand_core::SeedableRng;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Prior {
    Beta { alpha: f64, beta: f64 },
    Normal { mu: f64, sigma: f64 },
    NormalInverseGamma {
        mu: f64,
        lambda: f64,
        alpha: f64,
        beta: f64,
    },
}

#[derive(Debug, Clone, Copy)]
pub struct BetaPosterior {
    pub alpha: f64,
    pub beta: f64,
    pub mean: f64,
    pub mode: Option<f64>,
    pub variance: f64,
    pub ci_95: (f64, f64),
}

fn beta_quantile(p: f64, alpha: f64, beta: f64) -> f64 {
    if alpha + beta > 30.0 {
        let mean = alpha / (alpha + beta);
        let var = alpha * beta / ((alpha + beta).powi(2) * (alpha + beta + 1.0));
        return (mean + inverse_norm_cdf(p) * var.sqrt()).clamp(0.0, 1.0);
    }
    // Bisection on the regularized incomplete beta function.
    let mut lo = 0.0;
    let mut hi = 1.0;
    for _ in 0..100 {
        let mid = 0.5 * (lo + hi);
        if incomplete_beta(mid, alpha, beta) < p {
            lo = mid;
        } else {
            hi = mid;
        }
    }
    0.5 * (lo + hi)
}

fn summarize_beta(alpha: f64, beta: f64) -> BetaPosterior {
    let mean = alpha / (alpha + beta);
    let mode = if alpha > 1.0 && beta > 1.0 {
        Some((alpha - 1.0) / (alpha + beta - 2.0))
    } else {
        None
    };
    let variance = alpha * beta / ((alpha + beta).powi(2) * (alpha + beta + 1.0));
    let ci_95 = (beta_quantile(0.025, alpha, beta), beta_quantile(0.975, alpha, beta));
    BetaPosterior {
        alpha,
        beta,
        mean,
        mode,
        variance,
        ci_95,
    }
}

/// Beta-Bernoulli update: `k` successes out of `n` trials.
pub fn update_beta(prior: &Prior, k: u64, n_minus_k: u64) -> SdeResult<BetaPosterior> {
    let Prior::Beta { alpha, beta } = prior else {
        return Err(SdeError::InvalidParameter {
            parameter: "prior".to_string(),
            value: 0.0,
            constraint: "update_beta requires a Beta prior".to_string(),
        });
    };
    if alpha + beta <= 0.0 {
        return Err(SdeError::InsufficientData {
            operation: "update_beta".to_string(),
            have: 0,
            need: 1,
        });
    }
    Ok(summarize_beta(alpha + k as f64, beta + n_minus_k as f64))
}

#[derive(Debug, Clone, Copy)]
pub struct NormalPosterior {
    pub mean: f64,
    pub variance: f64,
}

/// Normal-Normal update with known observation variance `known_var`.
pub fn update_normal(prior: &Prior, observations: &[f64], known_var: f64) -> SdeResult<NormalPosterior> {
    let Prior::Normal { mu: mu0, sigma: sigma0 } = prior else {
        return Err(SdeError::InvalidParameter {
            parameter: "prior".to_string(),
            value: 0.0,
            constraint: "update_normal requires a Normal prior".to_string(),
        });
    };
    if observations.is_empty() {
        return Err(SdeError::InsufficientData {
            operation: "update_normal".to_string(),
            have: 0,
            need: 1,
        });
    }
    let n = observations.len() as f64;
    let x_bar = observations.iter().sum::<f64>() / n;
    let sigma0_sq = sigma0 * sigma0;

    let posterior_variance = (sigma0_sq * known_var) / (known_var + n * sigma0_sq);
    let posterior_mean = (known_var * mu0 + n * sigma0_sq * x_bar) / (known_var + n * sigma0_sq);

    Ok(NormalPosterior {
        mean: posterior_mean,
        variance: posterior_variance,
    })
}

#[derive(Debug, Clone, Copy)]
pub struct NigPosterior {
    pub mu: f64,
    pub lambda: f64,
    pub alpha: f64,
    pub beta: f64,
}

/// Normal-Inverse-Gamma update: unknown mean and variance.
pub fn update_nig(prior: &Prior, observations: &[f64]) -> SdeResult<NigPosterior> {
    let Prior::NormalInverseGamma {
        mu: mu0,
        lambda: lambda0,
        alpha: alpha0,
        beta: beta0,
    } = prior
    else {
        return Err(SdeError::InvalidParameter {
            parameter: "prior".to_string(),
            value: 0.0,
            constraint: "update_nig requires a NormalInverseGamma prior".to_string(),
        });
    };
    if observations.is_empty() {
        return Err(SdeError::InsufficientData {
            operation: "update_nig".to_string(),
            have: 0,
            need: 1,
        });
    }
    let n = observations.len() as f64;
    let x_bar = observations.iter().sum::<f64>() / n;

    let lambda_n = lambda0 + n;
    let mu_n = (lambda0 * mu0 + n * x_bar) / lambda_n;
    let alpha_n = alpha0 + n / 2.0;
    let sum_sq_dev: f64 = observations.iter().map(|x| (x - x_bar).powi(2)).sum();
    let beta_n = beta0 + 0.5 * sum_sq_dev + (lambda0 * n * (x_bar - mu0).powi(2)) / (2.0 * lambda_n);

    Ok(NigPosterior {
        mu: mu_n,
        lambda: lambda_n,
        alpha: alpha_n,
        beta: beta_n,
    })
}

#[derive(Debug, Clone, Copy)]
pub struct AbTestResult {
    pub p_treatment_better: f64,
    pub expected_relative_lift: f64,
    pub lift_ci_95: (f64, f64),
}

/// A/B test: updates control and treatment Betas, then Monte Carlo
/// estimates `P(treatment > control)` and the relative lift distribution.
pub fn ab_test(
    control_successes: u64,
    control_failures: u64,
    treatment_successes: u64,
    treatment_failures: u64,
    prior: &Prior,
    m: usize,
    seed: u64,
) -> SdeResult<AbTestResult> {
    let control = update_beta(prior, control_successes, control_failures)?;
    let treatment = update_beta(prior, treatment_successes, treatment_failures)?;

    let mut rng = Mt19937::seed_from_u64(seed);
    let mut better = 0usize;
    let mut lifts = Vec::with_capacity(m);
    for _ in 0..m {
        let c = sample_beta(&mut rng, control.alpha, control.beta)?;
        let t = sample_beta(&mut rng, treatment.alpha, treatment.beta)?;
        if t > c {
            better += 1;
        }
        if c > 0.0 {
            lifts.push((t - c) / c);
        }
    }
    lifts.sort_by(|a, b| a.partial_cmp(b).unwrap());
    let expected_relative_lift = if lifts.is_empty() {
        0.0
    } else {
        lifts.iter().sum::<f64>() / lifts.len() as f64
    };
    let lift_ci_95 = if lifts.is_empty() {
        (0.0, 0.0)
    } else {
        (
            crate::aggregate::percentile(&lifts, 2.5),
            crate::aggregate::percentile(&lifts, 97.5),
        )
    };

    Ok(AbTestResult {
        p_treatment_better: better as f64 / m as f64,
        expected_relative_lift,
        lift_ci_95,
    })
}

fn sample_beta(rng: &mut Mt19937, alpha: f64, beta: f64) -> SdeResult<f64> {
    let x = gamma_draw(rng, alpha, 1.0)?;
    let y = gamma_draw(rng, beta, 1.0)?;
    Ok(x / (x + y))
}

/// Thompson sampling: draws one Beta sample per arm, returns the winning
/// arm's index.
pub fn thompson(arms: &[BetaPosterior], seed: u64) -> SdeResult<usize> {
    if arms.is_empty() {
        return Err(SdeError::InsufficientData {
            operation: "thompson".to_string(),
            have: 0,
            need: 1,
        });
    }
    let mut rng = Mt19937::seed_from_u64(seed);
    let mut best_idx = 0;
    let mut best_val = f64::NEG_INFINITY;
    for (i, arm) in arms.iter().enumerate() {
        let draw = sample_beta(&mut rng, arm.alpha, arm.beta)?;
        if draw > best_val {
            best_val = draw;
            best_idx = i;
        }
    }
    Ok(best_idx)
}

/// Maps an expert's mode estimate and confidence to a Beta prior:
/// `n_eff = 2 + 98c`, `alpha = m(n_eff-2)+1`, `beta = (1-m)(n_eff-2)+1`.
pub fn elicit_beta_prior(mode: f64, confidence: f64) -> SdeResult<Prior> {
    if !(0.0..1.0).contains(&mode) {
        return Err(SdeError::InvalidParameter {
            parameter: "mode".to_string(),
            value: mode,
            constraint: "must be in (0, 1)".to_string(),
        });
    }
    if !(0.0..=1.0).contains(&confidence) {
        return Err(SdeError::InvalidParameter {
            parameter: "confidence".to_string(),
            value: confidence,
            constraint: "must be in [0, 1]".to_string(),
        });
    }
    let n_eff = 2.0 + 98.0 * confidence;
    let alpha = mode * (n_eff - 2.0) + 1.0;
    let beta = (1.0 - mode) * (n_eff - 2.0) + 1.0;
    Ok(Prior::Beta { alpha, beta })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_beta_shifts_toward_observed_rate() {
        let prior = Prior::Beta { alpha: 1.0, beta: 1.0 };
        let posterior = update_beta(&prior, 80, 20).unwrap();
        assert!((posterior.mean - 0.8).abs() < 0.02);
    }

    #[test]
    fn update_beta_rejects_wrong_prior_type() {
        let prior = Prior::Normal { mu: 0.0, sigma: 1.0 };
        assert!(update_beta(&prior, 1, 1).is_err());
    }

    #[test]
    fn update_normal_matches_analytic_posterior_mean() {
        let prior = Prior::Normal { mu: 0.0, sigma: 1.0 };
        let obs = vec![2.0, 2.0, 2.0, 2.0];
        let posterior = update_normal(&prior, &obs, 1.0).unwrap();
        assert!(posterior.mean > 0.0 && posterior.mean < 2.0);
    }

    #[test]
    fn elicit_beta_prior_round_trips_mode() {
        let prior = elicit_beta_prior(0.3, 0.8).unwrap();
        if let Prior::Beta { alpha, beta } = prior {
            let implied_mode = (alpha - 1.0) / (alpha + beta - 2.0);
            assert!((implied_mode - 0.3).abs() < 1e-9);
        } else {
            panic!("expected Beta prior");
        }
    }

    #[test]
    fn ab_test_favors_higher_observed_rate() {
        let prior = Prior::Beta { alpha: 1.0, beta: 1.0 };
        let result = ab_test(50, 50, 80, 20, &prior, 10_000, 7).unwrap();
        assert!(result.p_treatment_better > 0.9);
    }

    #[test]
    fn thompson_picks_the_strongest_arm_most_often() {
        let weak = summarize_beta(2.0, 20.0);
        let strong = summarize_beta(20.0, 2.0);
        let mut strong_wins = 0;
        for seed in 0..100 {
            if thompson(&[weak, strong], seed).unwrap() == 1 {
                strong_wins += 1;
            }
        }
        assert!(strong_wins > 80);
    }
}
