// src/distributions.rs
//! Scalar distribution samplers used outside the SDE step functions: jump
//! sizes, Bayesian priors, empirical bootstraps, and the PERT/triangular
//! shapes used for judgment-based inputs (§4.3).
//!
//! Every sampler takes `&mut impl RngCore` rather than owning a generator,
//! so callers can pass the same per-worker `Mt19937` used for the SDE paths
//! and keep a single deterministic stream per scenario.

use crate::error::{validation::*, SdeError, SdeResult};
use rand_core::RngCore;
use std::f64::consts::PI;

fn uniform01(rng: &mut impl RngCore) -> f64 {
    (rng.next_u32() as f64 + 0.5) * (1.0 / 4_294_967_296.0)
}

/// Standard normal draw via Box-Muller, rejecting `u1 == 0` to avoid `ln(0)`.
pub fn standard_normal(rng: &mut impl RngCore) -> f64 {
    let mut u1 = uniform01(rng);
    while u1 <= 0.0 {
        u1 = uniform01(rng);
    }
    let u2 = uniform01(rng);
    (-2.0 * u1.ln()).sqrt() * (2.0 * PI * u2).cos()
}

pub fn normal(rng: &mut impl RngCore, mean: f64, std_dev: f64) -> SdeResult<f64> {
    validate_non_negative("std_dev", std_dev)?;
    Ok(mean + std_dev * standard_normal(rng))
}

pub fn lognormal(rng: &mut impl RngCore, mu: f64, sigma: f64) -> SdeResult<f64> {
    validate_non_negative("sigma", sigma)?;
    Ok((mu + sigma * standard_normal(rng)).exp())
}

/// Marsaglia-Tsang gamma sampler, boosted for `shape < 1` via the
/// `U^(1/shape)` trick (Marsaglia & Tsang 2000, section on small shapes).
pub fn gamma(rng: &mut impl RngCore, shape: f64, scale: f64) -> SdeResult<f64> {
    validate_positive("shape", shape)?;
    validate_positive("scale", scale)?;

    if shape < 1.0 {
        let u = uniform01(rng);
        let boosted = gamma_ge_one(rng, shape + 1.0);
        return Ok(scale * boosted * u.powf(1.0 / shape));
    }
    Ok(scale * gamma_ge_one(rng, shape))
}

fn gamma_ge_one(rng: &mut impl RngCore, shape: f64) -> f64 {
    let d = shape - 1.0 / 3.0;
    let c = 1.0 / (9.0 * d).sqrt();
    loop {
        let mut x;
        let mut v;
        loop {
            x = standard_normal(rng);
            v = 1.0 + c * x;
            if v > 0.0 {
                break;
            }
        }
        v = v * v * v;
        let u = uniform01(rng);
        if u < 1.0 - 0.0331 * x * x * x * x {
            return d * v;
        }
        if u.ln() < 0.5 * x * x + d * (1.0 - v + v.ln()) {
            return d * v;
        }
    }
}

/// Chi-squared(dof): sum of `dof` squared standard normals for small
/// integer-ish dof, else a normal approximation (mean `dof`, variance
/// `2*dof`) — same small/large split as `poisson`.
pub fn chi_squared(rng: &mut impl RngCore, dof: f64) -> SdeResult<f64> {
    validate_positive("dof", dof)?;
    if dof < 30.0 {
        let whole = dof.floor() as u64;
        let mut sum: f64 = (0..whole).map(|_| standard_normal(rng).powi(2)).sum();
        let frac = dof - whole as f64;
        if frac > 0.0 {
            // Fractional remainder via a Gamma(frac/2, 2) draw, so non-integer
            // dof (e.g. Welch-Satterthwaite degrees of freedom) stays exact.
            sum += gamma(rng, frac / 2.0, 2.0)?;
        }
        Ok(sum)
    } else {
        let draw = dof + (2.0 * dof).sqrt() * standard_normal(rng);
        Ok(draw.max(0.0))
    }
}

/// Student-t via the normal/chi-squared ratio representation.
pub fn student_t(rng: &mut impl RngCore, dof: f64) -> SdeResult<f64> {
    validate_positive("dof", dof)?;
    let z = standard_normal(rng);
    let chi2 = chi_squared(rng, dof)?;
    Ok(z / (chi2 / dof).sqrt())
}

/// Poisson draw. Knuth's product method below 30 events in expectation,
/// a normal approximation above it where the product method's runtime
/// would otherwise scale with `lambda`.
pub fn poisson(rng: &mut impl RngCore, lambda: f64) -> SdeResult<u64> {
    validate_non_negative("lambda", lambda)?;
    if lambda == 0.0 {
        return Ok(0);
    }
    if lambda < 30.0 {
        let l = (-lambda).exp();
        let mut k = 0u64;
        let mut p = 1.0;
        loop {
            k += 1;
            p *= uniform01(rng);
            if p <= l {
                break;
            }
        }
        Ok(k - 1)
    } else {
        let draw = lambda + lambda.sqrt() * standard_normal(rng);
        Ok(draw.round().max(0.0) as u64)
    }
}

pub fn triangular(rng: &mut impl RngCore, min: f64, mode: f64, max: f64) -> SdeResult<f64> {
    if !(min <= mode && mode <= max) {
        return Err(SdeError::InvalidParameter {
            parameter: "mode".to_string(),
            value: mode,
            constraint: format!("must satisfy min ({min}) <= mode <= max ({max})"),
        });
    }
    if min == max {
        return Ok(min);
    }
    let u = uniform01(rng);
    let f = (mode - min) / (max - min);
    if u < f {
        Ok(min + (u * (max - min) * (mode - min)).sqrt())
    } else {
        Ok(max - ((1.0 - u) * (max - min) * (max - mode)).sqrt())
    }
}

/// PERT distribution: a reshaped Beta matching the three-point estimate's
/// mean `(min + lambda*mode + max) / (lambda + 2)`, default `lambda = 4`.
pub fn pert(rng: &mut impl RngCore, min: f64, mode: f64, max: f64, lambda: f64) -> SdeResult<f64> {
    if !(min <= mode && mode <= max) {
        return Err(SdeError::InvalidParameter {
            parameter: "mode".to_string(),
            value: mode,
            constraint: format!("must satisfy min ({min}) <= mode <= max ({max})"),
        });
    }
    validate_positive("lambda", lambda)?;
    if min == max {
        return Ok(min);
    }
    let range = max - min;
    let alpha = 1.0 + lambda * (mode - min) / range;
    let beta = 1.0 + lambda * (max - mode) / range;
    let x = gamma(rng, alpha, 1.0)?;
    let y = gamma(rng, beta, 1.0)?;
    Ok(min + range * x / (x + y))
}

/// Draws with replacement from a non-empty historical sample (bootstrap).
pub fn empirical(rng: &mut impl RngCore, observations: &[f64]) -> SdeResult<f64> {
    if observations.is_empty() {
        return Err(SdeError::InsufficientData {
            operation: "empirical sampling".to_string(),
            have: 0,
            need: 1,
        });
    }
    let idx = (uniform01(rng) * observations.len() as f64) as usize;
    Ok(observations[idx.min(observations.len() - 1)])
}
