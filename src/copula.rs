// src/copula.rs
//! Copula samplers: joint distributions on `[0,1]^d` with uniform marginals,
//! used to impose tail dependence beyond what a linear correlation matrix
//! can express.
//!
//! Grounded in the Gaussian-copula/Cholesky pattern from the retrieval
//! pack's synthetic-data copula reference: sample the latent normal, apply
//! `L*Z`, push each coordinate through its marginal CDF.

use crate::correlation::cholesky;
use crate::distributions::{chi_squared, standard_normal};
use crate::error::{validation::*, SdeError, SdeResult};
use crate::math_utils::norm_cdf;
use nalgebra::DMatrix;
use rand_core::RngCore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rotation {
    None,
    Deg90,
    Deg180,
    Deg270,
}

#[derive(Debug, Clone)]
pub enum CopulaFamily {
    Gaussian { correlation: DMatrix<f64> },
    StudentT { correlation: DMatrix<f64>, dof: f64 },
    Clayton { theta: f64, rotation: Rotation },
    Gumbel { theta: f64, rotation: Rotation },
    Frank { theta: f64, rotation: Rotation },
}

impl CopulaFamily {
    fn dimension(&self) -> usize {
        match self {
            CopulaFamily::Gaussian { correlation } | CopulaFamily::StudentT { correlation, .. } => {
                correlation.nrows()
            }
            CopulaFamily::Clayton { .. } | CopulaFamily::Gumbel { .. } | CopulaFamily::Frank { .. } => 2,
        }
    }

    fn name(&self) -> &'static str {
        match self {
            CopulaFamily::Gaussian { .. } => "gaussian",
            CopulaFamily::StudentT { .. } => "student_t",
            CopulaFamily::Clayton { .. } => "clayton",
            CopulaFamily::Gumbel { .. } => "gumbel",
            CopulaFamily::Frank { .. } => "frank",
        }
    }
}

/// Validates a copula spec against the dimension it will be used at.
/// Per §4.5, only Gaussian and Student-t are defined beyond `d=2`.
pub fn validate_dimension(family: &CopulaFamily, d: usize) -> SdeResult<()> {
    match family {
        CopulaFamily::Gaussian { .. } | CopulaFamily::StudentT { .. } => Ok(()),
        _ if d <= 2 => Ok(()),
        _ => Err(SdeError::CopulaDimensionUnsupported {
            family: family.name().to_string(),
            dimension: d,
        }),
    }
}

/// Draws one sample in `[0,1]^d` from the given copula family.
pub fn sample(family: &CopulaFamily, rng: &mut impl RngCore) -> SdeResult<Vec<f64>> {
    validate_dimension(family, family.dimension())?;
    match family {
        CopulaFamily::Gaussian { correlation } => sample_gaussian(correlation, rng),
        CopulaFamily::StudentT { correlation, dof } => sample_student_t(correlation, *dof, rng),
        CopulaFamily::Clayton { theta, rotation } => {
            validate_positive("theta", *theta)?;
            Ok(apply_rotation(sample_clayton(*theta, rng), *rotation))
        }
        CopulaFamily::Gumbel { theta, rotation } => {
            if *theta < 1.0 {
                return Err(SdeError::InvalidParameter {
                    parameter: "theta".to_string(),
                    value: *theta,
                    constraint: "must be >= 1".to_string(),
                });
            }
            Ok(apply_rotation(sample_gumbel(*theta, rng), *rotation))
        }
        CopulaFamily::Frank { theta, rotation } => {
            if *theta == 0.0 {
                return Err(SdeError::InvalidParameter {
                    parameter: "theta".to_string(),
                    value: *theta,
                    constraint: "must be nonzero".to_string(),
                });
            }
            Ok(apply_rotation(sample_frank(*theta, rng), *rotation))
        }
    }
}

fn sample_gaussian(correlation: &DMatrix<f64>, rng: &mut impl RngCore) -> SdeResult<Vec<f64>> {
    let l = cholesky(correlation)?;
    let d = correlation.nrows();
    let z: Vec<f64> = (0..d).map(|_| standard_normal(rng)).collect();
    let zv = nalgebra::DVector::from_vec(z);
    let lz = &l * zv;
    Ok(lz.iter().map(|&x| norm_cdf(x)).collect())
}

fn sample_student_t(correlation: &DMatrix<f64>, dof: f64, rng: &mut impl RngCore) -> SdeResult<Vec<f64>> {
    validate_positive("dof", dof)?;
    let l = cholesky(correlation)?;
    let d = correlation.nrows();
    let z: Vec<f64> = (0..d).map(|_| standard_normal(rng)).collect();
    let zv = nalgebra::DVector::from_vec(z);
    let lz = &l * zv;
    let v = chi_squared(rng, dof)?;
    let scale = (dof / v).sqrt();
    let t_dist = statrs::distribution::StudentsT::new(0.0, 1.0, dof)
        .map_err(|e| SdeError::NumericalInstability {
            method: "student_t copula".to_string(),
            reason: e.to_string(),
        })?;
    use statrs::distribution::ContinuousCDF;
    Ok(lz.iter().map(|&x| t_dist.cdf(x * scale)).collect())
}

/// Clayton bivariate via the conditional method (§4.3).
fn sample_clayton(theta: f64, rng: &mut impl RngCore) -> (f64, f64) {
    let u = uniform01(rng);
    let w = uniform01(rng);
    let v = (u.powf(-theta) * (w.powf(-theta / (1.0 + theta)) - 1.0) + 1.0).powf(-1.0 / theta);
    (u, v.clamp(0.0, 1.0))
}

/// Gumbel bivariate via Marshall-Olkin: a positive-stable mixing variable
/// with index `1/theta`, via Chambers-Mallows-Stuck.
fn sample_gumbel(theta: f64, rng: &mut impl RngCore) -> (f64, f64) {
    use std::f64::consts::PI;
    let alpha = 1.0 / theta;
    let u_s = uniform01(rng) * PI;
    let w = -uniform01(rng).ln();
    let s = (alpha * u_s).sin() / u_s.sin().powf(1.0 / alpha)
        * (((1.0 - alpha) * u_s).sin() / w).powf((1.0 - alpha) / alpha);
    let e1 = -uniform01(rng).ln();
    let e2 = -uniform01(rng).ln();
    let u = (-(e1 / s).powf(1.0 / theta)).exp();
    let v = (-(e2 / s).powf(1.0 / theta)).exp();
    (u.clamp(0.0, 1.0), v.clamp(0.0, 1.0))
}

/// Frank bivariate conditional method (§4.3).
fn sample_frank(theta: f64, rng: &mut impl RngCore) -> (f64, f64) {
    let u = uniform01(rng);
    let w = uniform01(rng);
    let a = 1.0 - (-theta).exp();
    let b = (-theta * u).exp();
    let v = -((1.0 - a / (w * (1.0 - b) / b + 1.0)).ln()) / theta;
    (u, v.clamp(0.0, 1.0))
}

fn apply_rotation((u, v): (f64, f64), rotation: Rotation) -> Vec<f64> {
    match rotation {
        Rotation::None => vec![u, v],
        Rotation::Deg90 => vec![1.0 - v, u],
        Rotation::Deg180 => vec![1.0 - u, 1.0 - v],
        Rotation::Deg270 => vec![v, 1.0 - u],
    }
}

fn uniform01(rng: &mut impl RngCore) -> f64 {
    (rng.next_u32() as f64 + 0.5) * (1.0 / 4_294_967_296.0)
}

/// Lower/upper tail dependence coefficients for the Archimedean families,
/// from their known closed forms (§4.3).
pub fn tail_dependence(family: &CopulaFamily) -> (f64, f64) {
    match family {
        CopulaFamily::Clayton { theta, .. } => (2f64.powf(-1.0 / theta), 0.0),
        CopulaFamily::Gumbel { theta, .. } => (0.0, 2.0 - 2f64.powf(1.0 / theta)),
        CopulaFamily::Frank { .. } => (0.0, 0.0),
        CopulaFamily::Gaussian { .. } => (0.0, 0.0),
        CopulaFamily::StudentT { .. } => (0.0, 0.0),
    }
}

/// Kendall's tau: the signed concordant-minus-discordant fraction over all
/// pairs of a paired sample.
pub fn kendalls_tau(xs: &[f64], ys: &[f64]) -> SdeResult<f64> {
    if xs.len() != ys.len() {
        return Err(SdeError::InvalidParameter {
            parameter: "ys".to_string(),
            value: ys.len() as f64,
            constraint: format!("must match xs length ({})", xs.len()),
        });
    }
    let n = xs.len();
    if n < 2 {
        return Err(SdeError::InsufficientData {
            operation: "kendalls_tau".to_string(),
            have: n,
            need: 2,
        });
    }
    let mut concordant = 0i64;
    let mut discordant = 0i64;
    for i in 0..n {
        for j in (i + 1)..n {
            let dx = xs[i] - xs[j];
            let dy = ys[i] - ys[j];
            let sign = dx * dy;
            if sign > 0.0 {
                concordant += 1;
            } else if sign < 0.0 {
                discordant += 1;
            }
        }
    }
    let total = (n * (n - 1) / 2) as f64;
    Ok((concordant - discordant) as f64 / total)
}

pub mod fit {
    use super::*;

    pub fn clayton_theta_from_tau(tau: f64) -> SdeResult<f64> {
        if !(-1.0..1.0).contains(&tau) || tau <= 0.0 {
            return Err(SdeError::InvalidParameter {
                parameter: "tau".to_string(),
                value: tau,
                constraint: "must be in (0, 1) for Clayton".to_string(),
            });
        }
        Ok(2.0 * tau / (1.0 - tau))
    }

    pub fn gumbel_theta_from_tau(tau: f64) -> SdeResult<f64> {
        if !(0.0..1.0).contains(&tau) {
            return Err(SdeError::InvalidParameter {
                parameter: "tau".to_string(),
                value: tau,
                constraint: "must be in [0, 1) for Gumbel".to_string(),
            });
        }
        Ok(1.0 / (1.0 - tau))
    }

    /// Frank has no closed form relating theta to tau; bisect on the
    /// (numerically integrated) Debye function relationship.
    pub fn frank_theta_from_tau(tau: f64) -> SdeResult<f64> {
        if tau.abs() >= 1.0 {
            return Err(SdeError::InvalidParameter {
                parameter: "tau".to_string(),
                value: tau,
                constraint: "must be in (-1, 1) for Frank".to_string(),
            });
        }
        if tau.abs() < 1e-12 {
            return Ok(0.0);
        }
        let target = tau;
        let f = |theta: f64| tau_from_frank_theta(theta) - target;
        let mut lo = if tau > 0.0 { 1e-6 } else { -50.0 };
        let mut hi = if tau > 0.0 { 50.0 } else { -1e-6 };
        let mut flo = f(lo);
        for _ in 0..200 {
            let mid = 0.5 * (lo + hi);
            let fmid = f(mid);
            if fmid.abs() < 1e-10 {
                return Ok(mid);
            }
            if fmid.signum() == flo.signum() {
                lo = mid;
                flo = fmid;
            } else {
                hi = mid;
            }
        }
        Ok(0.5 * (lo + hi))
    }

    fn debye1(theta: f64) -> f64 {
        // D1(theta) = (1/theta) * integral_0^theta t/(e^t - 1) dt, via
        // Simpson's rule; theta == 0 handled by the caller.
        let n = 400;
        let h = theta / n as f64;
        let integrand = |t: f64| if t.abs() < 1e-10 { 1.0 } else { t / (t.exp() - 1.0) };
        let mut sum = integrand(0.0) + integrand(theta);
        for i in 1..n {
            let t = i as f64 * h;
            sum += integrand(t) * if i % 2 == 0 { 2.0 } else { 4.0 };
        }
        (h / 3.0) * sum / theta
    }

    fn tau_from_frank_theta(theta: f64) -> f64 {
        1.0 - 4.0 / theta * (1.0 - debye1(theta))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rng::Mt19937;
    use rand_core::SeedableRng;

    #[test]
    fn gaussian_copula_marginals_are_uniform() {
        let corr = DMatrix::from_row_slice(2, 2, &[1.0, 0.5, 0.5, 1.0]);
        let family = CopulaFamily::Gaussian { correlation: corr };
        let mut rng = Mt19937::seed_from_u64(7);
        let samples: Vec<Vec<f64>> = (0..20_000).map(|_| sample(&family, &mut rng).unwrap()).collect();
        let mean_u = samples.iter().map(|s| s[0]).sum::<f64>() / samples.len() as f64;
        assert!((mean_u - 0.5).abs() < 0.02, "mean_u={mean_u}");
    }

    #[test]
    fn clayton_rejects_non_positive_theta() {
        let family = CopulaFamily::Clayton { theta: -1.0, rotation: Rotation::None };
        let mut rng = Mt19937::seed_from_u64(1);
        assert!(sample(&family, &mut rng).is_err());
    }

    #[test]
    fn non_gaussian_copula_rejected_above_dimension_two() {
        let family = CopulaFamily::Clayton { theta: 2.0, rotation: Rotation::None };
        assert!(validate_dimension(&family, 3).is_err());
        assert!(validate_dimension(&family, 2).is_ok());
    }

    #[test]
    fn clayton_tail_dependence_matches_closed_form() {
        let family = CopulaFamily::Clayton { theta: 2.0, rotation: Rotation::None };
        let (l, u) = tail_dependence(&family);
        assert!((l - 2f64.powf(-0.5)).abs() < 1e-12);
        assert_eq!(u, 0.0);
    }

    #[test]
    fn kendalls_tau_of_perfectly_concordant_data_is_one() {
        let xs = vec![1.0, 2.0, 3.0, 4.0];
        let ys = vec![1.0, 2.0, 3.0, 4.0];
        assert!((kendalls_tau(&xs, &ys).unwrap() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn frank_theta_from_tau_is_finite_and_correct_sign() {
        let theta = fit::frank_theta_from_tau(0.3).unwrap();
        assert!(theta.is_finite());
        assert!(theta > 0.0);
        let theta_neg = fit::frank_theta_from_tau(-0.3).unwrap();
        assert!(theta_neg < 0.0);
    }
}
