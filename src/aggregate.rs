// src/aggregate.rs
//! Scenario-outcome aggregation: percentiles, VaR/CVaR, higher moments,
//! and the Wilson score interval used for every reported probability.

use crate::error::{SdeError, SdeResult};
use crate::math_utils::inverse_norm_cdf;
use std::collections::HashMap;

/// Percentile via linear interpolation over a sorted copy:
/// `idx = p/100*(n-1)`, `x[floor(idx)]*(1-w) + x[ceil(idx)]*w`.
pub fn percentile(sorted: &[f64], p: f64) -> f64 {
    let n = sorted.len();
    if n == 0 {
        return f64::NAN;
    }
    if n == 1 {
        return sorted[0];
    }
    let idx = p / 100.0 * (n - 1) as f64;
    let lo = idx.floor() as usize;
    let hi = idx.ceil() as usize;
    let w = idx - lo as f64;
    sorted[lo] * (1.0 - w) + sorted[hi.min(n - 1)] * w
}

#[derive(Debug, Clone, Copy)]
pub struct PercentileSet {
    pub p5: f64,
    pub p25: f64,
    pub p50: f64,
    pub p75: f64,
    pub p95: f64,
}

pub fn percentile_set(values: &[f64]) -> PercentileSet {
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
    PercentileSet {
        p5: percentile(&sorted, 5.0),
        p25: percentile(&sorted, 25.0),
        p50: percentile(&sorted, 50.0),
        p75: percentile(&sorted, 75.0),
        p95: percentile(&sorted, 95.0),
    }
}

#[derive(Debug, Clone)]
pub struct Moments {
    pub mean: f64,
    pub median: f64,
    pub mode: f64,
    pub variance: f64,
    pub stdev: f64,
    pub iqr: f64,
    pub skewness: f64,
    pub excess_kurtosis: f64,
    pub min: f64,
    pub max: f64,
    pub p0_1: Option<f64>,
    pub p99_9: Option<f64>,
}

/// Default histogram bin count for the mode estimate.
const DEFAULT_BINS: usize = 50;

pub fn moments(values: &[f64]) -> SdeResult<Moments> {
    let n = values.len();
    if n == 0 {
        return Err(SdeError::InsufficientData {
            operation: "moments".to_string(),
            have: 0,
            need: 1,
        });
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
    let n_f = n as f64;

    let mean = values.iter().sum::<f64>() / n_f;
    let median = percentile(&sorted, 50.0);
    let min = sorted[0];
    let max = sorted[n - 1];

    let variance = if n > 1 {
        values.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (n_f - 1.0)
    } else {
        0.0
    };
    let stdev = variance.sqrt();

    let iqr = percentile(&sorted, 75.0) - percentile(&sorted, 25.0);

    let skewness = if stdev > 0.0 && n > 2 {
        let m3 = values.iter().map(|x| (x - mean).powi(3)).sum::<f64>() / n_f;
        let s3 = stdev.powi(3);
        // Fisher's (bias-adjusted) sample skewness.
        (n_f * n_f / ((n_f - 1.0) * (n_f - 2.0))) * (m3 / s3)
    } else {
        0.0
    };

    let excess_kurtosis = if stdev > 0.0 && n > 3 {
        let m4 = values.iter().map(|x| (x - mean).powi(4)).sum::<f64>() / n_f;
        let s4 = variance.powi(2);
        let g2 = m4 / s4 - 3.0;
        // Sample-corrected excess kurtosis.
        ((n_f - 1.0) / ((n_f - 2.0) * (n_f - 3.0))) * ((n_f + 1.0) * g2 + 6.0)
    } else {
        0.0
    };

    let mode = histogram_mode(&sorted, DEFAULT_BINS);

    let p0_1 = if n >= 1000 { Some(percentile(&sorted, 0.1)) } else { None };
    let p99_9 = if n >= 1000 { Some(percentile(&sorted, 99.9)) } else { None };

    Ok(Moments {
        mean,
        median,
        mode,
        variance,
        stdev,
        iqr,
        skewness,
        excess_kurtosis,
        min,
        max,
        p0_1,
        p99_9,
    })
}

fn histogram_mode(sorted: &[f64], bins: usize) -> f64 {
    let min = sorted[0];
    let max = sorted[sorted.len() - 1];
    if (max - min).abs() < f64::EPSILON {
        return min;
    }
    let width = (max - min) / bins as f64;
    let mut counts = vec![0usize; bins];
    for &v in sorted {
        let mut idx = ((v - min) / width) as usize;
        if idx >= bins {
            idx = bins - 1;
        }
        counts[idx] += 1;
    }
    let (best_bin, _) = counts
        .iter()
        .enumerate()
        .max_by_key(|(_, &c)| c)
        .unwrap();
    min + width * (best_bin as f64 + 0.5)
}

/// Risk measures at a given one-sided confidence level (e.g. `99` for
/// VaR_99). `VaR = P_{100-alpha}`, `CVaR = mean(values <= VaR)`.
pub fn var_cvar(sorted: &[f64], alpha: f64) -> (f64, f64) {
    let var = percentile(sorted, 100.0 - alpha);
    let tail: Vec<f64> = sorted.iter().copied().filter(|&x| x <= var).collect();
    let cvar = if tail.is_empty() {
        var
    } else {
        tail.iter().sum::<f64>() / tail.len() as f64
    };
    (var, cvar)
}

pub fn prob_below(values: &[f64], threshold: f64) -> f64 {
    let count = values.iter().filter(|&&x| x < threshold).count();
    count as f64 / values.len() as f64
}

#[derive(Debug, Clone, Copy)]
pub struct ProbabilityEstimate {
    pub mean: f64,
    pub ci_90: (f64, f64),
    pub ci_95: (f64, f64),
}

/// Wilson score interval for a proportion `k/n` at confidence `1 - alpha`.
pub fn wilson_interval(k: usize, n: usize, alpha: f64) -> (f64, f64) {
    if n == 0 {
        return (0.0, 1.0);
    }
    let n_f = n as f64;
    let p = k as f64 / n_f;
    let z = inverse_norm_cdf(1.0 - alpha / 2.0);
    let z2 = z * z;
    let center = (p + z2 / (2.0 * n_f)) / (1.0 + z2 / n_f);
    let half_width = z * ((p * (1.0 - p) + z2 / (4.0 * n_f)) / n_f).sqrt() / (1.0 + z2 / n_f);
    ((center - half_width).clamp(0.0, 1.0), (center + half_width).clamp(0.0, 1.0))
}

pub fn probability_estimate(k: usize, n: usize) -> ProbabilityEstimate {
    ProbabilityEstimate {
        mean: if n == 0 { 0.0 } else { k as f64 / n as f64 },
        ci_90: wilson_interval(k, n, 0.10),
        ci_95: wilson_interval(k, n, 0.05),
    }
}

/// Per-variable percentile map, as used in the result bundle.
pub fn percentile_map(per_variable: &HashMap<String, Vec<f64>>) -> HashMap<String, PercentileSet> {
    per_variable
        .iter()
        .map(|(name, values)| (name.clone(), percentile_set(values)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percentile_of_median_is_exact_on_odd_length() {
        let v = vec![1.0, 2.0, 3.0, 4.0, 5.0];
        assert!((percentile(&v, 50.0) - 3.0).abs() < 1e-12);
    }

    #[test]
    fn moments_rejects_empty_input() {
        assert!(moments(&[]).is_err());
    }

    #[test]
    fn wilson_interval_contains_point_estimate() {
        let (lo, hi) = wilson_interval(500, 1000, 0.05);
        assert!(lo < 0.5 && hi > 0.5);
    }

    #[test]
    fn wilson_interval_clamps_to_unit_range() {
        let (lo, hi) = wilson_interval(0, 10, 0.05);
        assert!(lo >= 0.0 && hi <= 1.0);
    }

    #[test]
    fn var_cvar_ordering() {
        let mut values: Vec<f64> = (1..=1000).map(|x| x as f64).collect();
        values.sort_by(|a, b| a.partial_cmp(b).unwrap());
        let (var, cvar) = var_cvar(&values, 99.0);
        assert!(cvar <= var);
    }
}
