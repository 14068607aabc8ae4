// src/estimate.rs
//! Parameter estimation: fitting GBM/OU to observed series and recommending
//! a process family from the data's shape.

use crate::error::{SdeError, SdeResult};
use statrs::distribution::{ChiSquared, ContinuousCDF};

const GBM_MIN_OBS: usize = 4;
const OU_MIN_OBS: usize = 6;

#[derive(Debug, Clone, Copy)]
pub struct ConfidenceInterval {
    pub lower: f64,
    pub upper: f64,
}

fn ci_95(estimate: f64, se: f64) -> ConfidenceInterval {
    const Z_95: f64 = 1.959963984540054;
    ConfidenceInterval {
        lower: estimate - Z_95 * se,
        upper: estimate + Z_95 * se,
    }
}

#[derive(Debug, Clone, Copy)]
pub struct GbmEstimate {
    pub mu: f64,
    pub sigma: f64,
    pub mu_ci: ConfidenceInterval,
    pub sigma_ci: ConfidenceInterval,
    pub jarque_bera: f64,
    pub is_normal: bool,
}

/// MLE of GBM drift/volatility from a positive-valued price series sampled
/// at uniform step `dt` (years).
pub fn estimate_gbm(prices: &[f64], dt: f64) -> SdeResult<GbmEstimate> {
    if prices.len() < GBM_MIN_OBS {
        return Err(SdeError::InsufficientData {
            operation: "estimate_gbm".to_string(),
            have: prices.len(),
            need: GBM_MIN_OBS,
        });
    }
    for &p in prices {
        if p <= 0.0 {
            return Err(SdeError::InvalidParameter {
                parameter: "prices".to_string(),
                value: p,
                constraint: "must all be positive for a GBM series".to_string(),
            });
        }
    }

    let log_returns: Vec<f64> = prices.windows(2).map(|w| (w[1] / w[0]).ln()).collect();
    let n = log_returns.len() as f64;
    let mean_r = log_returns.iter().sum::<f64>() / n;
    let var_r = log_returns.iter().map(|r| (r - mean_r).powi(2)).sum::<f64>() / (n - 1.0);
    let stdev_r = var_r.sqrt();

    let sigma = stdev_r / dt.sqrt();
    let mu = mean_r / dt + 0.5 * sigma * sigma;

    let se_sigma = sigma / (2.0 * n).sqrt();
    let se_mu = sigma / (n * dt).sqrt();

    let skew = {
        let m3 = log_returns.iter().map(|r| (r - mean_r).powi(3)).sum::<f64>() / n;
        m3 / stdev_r.powi(3)
    };
    let kurt = {
        let m4 = log_returns.iter().map(|r| (r - mean_r).powi(4)).sum::<f64>() / n;
        m4 / var_r.powi(2) - 3.0
    };
    let jb = n * (skew * skew / 6.0 + kurt * kurt / 24.0);
    let chi2 = ChiSquared::new(2.0).map_err(|e| SdeError::NumericalInstability {
        method: "jarque_bera".to_string(),
        reason: e.to_string(),
    })?;
    let p_value = 1.0 - chi2.cdf(jb);

    Ok(GbmEstimate {
        mu,
        sigma,
        mu_ci: ci_95(mu, se_mu),
        sigma_ci: ci_95(sigma, se_sigma),
        jarque_bera: jb,
        is_normal: p_value >= 0.05,
    })
}

#[derive(Debug, Clone, Copy)]
pub struct OuEstimate {
    pub theta: f64,
    pub mu: f64,
    pub sigma: f64,
    pub half_life: f64,
    pub not_mean_reverting: bool,
}

/// AR(1) OLS on `(X_{t-1}, X_t)`, then recovers the OU parameters.
pub fn estimate_ou(values: &[f64], dt: f64) -> SdeResult<OuEstimate> {
    if values.len() < OU_MIN_OBS {
        return Err(SdeError::InsufficientData {
            operation: "estimate_ou".to_string(),
            have: values.len(),
            need: OU_MIN_OBS,
        });
    }
    let x: Vec<f64> = values[..values.len() - 1].to_vec();
    let y: Vec<f64> = values[1..].to_vec();
    let n = x.len() as f64;
    let mean_x = x.iter().sum::<f64>() / n;
    let mean_y = y.iter().sum::<f64>() / n;

    let cov_xy: f64 = x.iter().zip(&y).map(|(xi, yi)| (xi - mean_x) * (yi - mean_y)).sum();
    let var_x: f64 = x.iter().map(|xi| (xi - mean_x).powi(2)).sum();

    let beta = cov_xy / var_x;
    let alpha = mean_y - beta * mean_x;

    let residuals: Vec<f64> = x
        .iter()
        .zip(&y)
        .map(|(xi, yi)| yi - (alpha + beta * xi))
        .collect();
    let mean_resid = residuals.iter().sum::<f64>() / n;
    let resid_var = residuals.iter().map(|r| (r - mean_resid).powi(2)).sum::<f64>() / (n - 1.0);
    let resid_stdev = resid_var.sqrt();

    let mut not_mean_reverting = false;
    let theta = if beta >= 1.0 {
        not_mean_reverting = true;
        1e-3
    } else if beta <= 0.0 {
        10.0
    } else {
        -beta.ln() / dt
    };

    let mu = if (1.0 - beta).abs() > f64::EPSILON {
        alpha / (1.0 - beta)
    } else {
        mean_y
    };

    let sigma = if beta > 0.0 && beta < 1.0 {
        resid_stdev * (-2.0 * beta.ln() / (dt * (1.0 - beta * beta))).sqrt()
    } else {
        resid_stdev / dt.sqrt()
    };

    let half_life = (2f64.ln()) / theta;

    Ok(OuEstimate {
        theta,
        mu,
        sigma,
        half_life,
        not_mean_reverting,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecommendedProcess {
    Deterministic,
    Gbm,
    OrnsteinUhlenbeck,
}

/// Heuristic process recommendation: a near-constant coefficient of
/// variation suggests `deterministic`; name hints toward mean-reverting
/// ratios (margin/ratio/rate) or multiplicative growth (revenue/price);
/// otherwise falls back to the sign of the values.
pub fn recommend_process(values: &[f64], name: &str) -> RecommendedProcess {
    if values.is_empty() {
        return RecommendedProcess::Gbm;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    let cv = if mean.abs() > f64::EPSILON {
        variance.sqrt() / mean.abs()
    } else {
        f64::INFINITY
    };

    if cv < 0.03 {
        return RecommendedProcess::Deterministic;
    }

    let lowered = name.to_lowercase();
    if ["margin", "ratio", "rate"].iter().any(|kw| lowered.contains(kw)) {
        return RecommendedProcess::OrnsteinUhlenbeck;
    }
    if ["revenue", "price"].iter().any(|kw| lowered.contains(kw)) {
        return RecommendedProcess::Gbm;
    }

    if values.iter().all(|&v| v > 0.0) {
        RecommendedProcess::Gbm
    } else {
        RecommendedProcess::OrnsteinUhlenbeck
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn estimate_gbm_rejects_short_series() {
        assert!(estimate_gbm(&[100.0, 101.0], 1.0 / 252.0).is_err());
    }

    #[test]
    fn estimate_gbm_recovers_known_parameters() {
        // Deterministic log-growth at 10%/year, no noise: sigma ~ 0.
        let dt = 1.0 / 12.0;
        let mut prices = vec![100.0];
        for _ in 0..24 {
            let last = *prices.last().unwrap();
            prices.push(last * ((0.10 - 0.0) * dt).exp());
        }
        let est = estimate_gbm(&prices, dt).unwrap();
        assert!((est.mu - 0.10).abs() < 0.01, "mu={}", est.mu);
        assert!(est.sigma.abs() < 1e-6);
    }

    #[test]
    fn estimate_ou_rejects_short_series() {
        assert!(estimate_ou(&[1.0, 2.0, 3.0], 1.0).is_err());
    }

    #[test]
    fn estimate_ou_flags_non_mean_reverting_random_walk() {
        let values: Vec<f64> = (0..20).map(|i| i as f64).collect();
        let est = estimate_ou(&values, 1.0).unwrap();
        assert!(est.not_mean_reverting);
    }

    #[test]
    fn recommend_process_flags_low_variation_as_deterministic() {
        let values = vec![100.0; 20];
        assert_eq!(recommend_process(&values, "cash"), RecommendedProcess::Deterministic);
    }

    #[test]
    fn recommend_process_uses_name_heuristics() {
        let values: Vec<f64> = (0..20).map(|i| 0.3 + 0.01 * (i as f64 % 3.0)).collect();
        assert_eq!(
            recommend_process(&values, "gross_margin"),
            RecommendedProcess::OrnsteinUhlenbeck
        );
    }
}
