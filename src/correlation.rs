// src/correlation.rs
//! Correlation-matrix validation, Cholesky factorization, and the
//! shrink-to-PD fallback used when a user-supplied matrix is close to but
//! not quite positive definite.

use crate::error::{SdeError, SdeResult};
use nalgebra::DMatrix;

const SYMMETRY_TOL: f64 = 1e-10;

/// Validates squareness, symmetry, unit diagonal, `|M_ij| <= 1`, and
/// positive-definiteness (attempted via Cholesky). Returns the list of
/// problems found; empty means valid.
pub fn validate(m: &DMatrix<f64>) -> Vec<String> {
    let mut errors = Vec::new();
    let d = m.nrows();
    if m.ncols() != d {
        errors.push(format!(
            "matrix is not square: {}x{}",
            m.nrows(),
            m.ncols()
        ));
        return errors;
    }
    for i in 0..d {
        for j in (i + 1)..d {
            if (m[(i, j)] - m[(j, i)]).abs() > SYMMETRY_TOL {
                errors.push(format!("not symmetric at ({i}, {j})"));
            }
        }
    }
    for i in 0..d {
        if (m[(i, i)] - 1.0).abs() > SYMMETRY_TOL {
            errors.push(format!("diagonal at ({i}, {i}) is not 1.0: {}", m[(i, i)]));
        }
    }
    for i in 0..d {
        for j in 0..d {
            if m[(i, j)].abs() > 1.0 + SYMMETRY_TOL {
                errors.push(format!("off-diagonal out of range at ({i}, {j}): {}", m[(i, j)]));
            }
        }
    }
    if errors.is_empty() && cholesky(m).is_err() {
        errors.push("matrix is not positive definite".to_string());
    }
    errors
}

/// Cholesky factorization `M = L * L^T`, hand-rolled so `adjust_to_pd` can
/// detect failure mid-computation rather than through a library panic.
pub fn cholesky(m: &DMatrix<f64>) -> SdeResult<DMatrix<f64>> {
    let d = m.nrows();
    let mut l = DMatrix::<f64>::zeros(d, d);
    for i in 0..d {
        for j in 0..=i {
            let mut sum = m[(i, j)];
            for k in 0..j {
                sum -= l[(i, k)] * l[(j, k)];
            }
            if i == j {
                if sum <= 0.0 {
                    return Err(SdeError::NumericalInstability {
                        method: "cholesky".to_string(),
                        reason: format!("non-positive pivot at row {i}: {sum}"),
                    });
                }
                l[(i, j)] = sum.sqrt();
            } else {
                l[(i, j)] = sum / l[(j, j)];
            }
        }
    }
    Ok(l)
}

/// Shrinks off-diagonals toward zero by a factor descending from 0.99 to
/// 0.5 until Cholesky succeeds; falls back to identity + 0.1 * original
/// off-diagonals if no shrink factor in that range works.
pub fn adjust_to_pd(m: &DMatrix<f64>) -> SdeResult<DMatrix<f64>> {
    let d = m.nrows();
    let mut factor = 0.99;
    while factor >= 0.5 {
        let shrunk = shrink(m, factor, d);
        if cholesky(&shrunk).is_ok() {
            log::debug!("adjust_to_pd: shrink factor {factor:.2} recovered a PD matrix");
            return Ok(shrunk);
        }
        factor -= 0.01;
    }
    let fallback = shrink(m, 0.1, d).map_indices(|i, j, v| if i == j { 1.0 } else { v });
    if cholesky(&fallback).is_ok() {
        log::warn!("adjust_to_pd: no shrink factor in [0.5, 0.99] worked, falling back to identity + 0.1x off-diagonals");
        return Ok(fallback);
    }
    Err(SdeError::CorrelationIllDefined {
        reason: "no shrink factor in [0.5, 0.99] nor the identity fallback yielded a PD matrix"
            .to_string(),
    })
}

fn shrink(m: &DMatrix<f64>, factor: f64, d: usize) -> DMatrix<f64> {
    DMatrix::from_fn(d, d, |i, j| if i == j { 1.0 } else { m[(i, j)] * factor })
}

trait MapIndices {
    fn map_indices(&self, f: impl Fn(usize, usize, f64) -> f64) -> Self;
}

impl MapIndices for DMatrix<f64> {
    fn map_indices(&self, f: impl Fn(usize, usize, f64) -> f64) -> Self {
        DMatrix::from_fn(self.nrows(), self.ncols(), |i, j| f(i, j, self[(i, j)]))
    }
}

/// Fixed 4x4 correlation templates for common industry groupings. Inputs,
/// not part of the core algorithm — callers pick one as a `CorrelationSpec`.
pub mod templates {
    use nalgebra::DMatrix;

    fn from_rows(rows: [[f64; 4]; 4]) -> DMatrix<f64> {
        DMatrix::from_row_slice(4, 4, &rows.concat())
    }

    pub fn manufacturing() -> DMatrix<f64> {
        from_rows([
            [1.00, 0.65, 0.40, 0.30],
            [0.65, 1.00, 0.35, 0.25],
            [0.40, 0.35, 1.00, 0.50],
            [0.30, 0.25, 0.50, 1.00],
        ])
    }

    pub fn retail() -> DMatrix<f64> {
        from_rows([
            [1.00, 0.55, 0.45, 0.20],
            [0.55, 1.00, 0.50, 0.15],
            [0.45, 0.50, 1.00, 0.30],
            [0.20, 0.15, 0.30, 1.00],
        ])
    }

    pub fn technology() -> DMatrix<f64> {
        from_rows([
            [1.00, 0.70, 0.25, 0.60],
            [0.70, 1.00, 0.20, 0.55],
            [0.25, 0.20, 1.00, 0.15],
            [0.60, 0.55, 0.15, 1.00],
        ])
    }

    pub fn real_estate() -> DMatrix<f64> {
        from_rows([
            [1.00, 0.45, 0.60, 0.50],
            [0.45, 1.00, 0.35, 0.40],
            [0.60, 0.35, 1.00, 0.45],
            [0.50, 0.40, 0.45, 1.00],
        ])
    }

    pub fn financial_services() -> DMatrix<f64> {
        from_rows([
            [1.00, 0.60, 0.55, 0.65],
            [0.60, 1.00, 0.40, 0.50],
            [0.55, 0.40, 1.00, 0.45],
            [0.65, 0.50, 0.45, 1.00],
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(d: usize) -> DMatrix<f64> {
        DMatrix::identity(d, d)
    }

    #[test]
    fn identity_validates_clean() {
        assert!(validate(&id(3)).is_empty());
    }

    #[test]
    fn cholesky_round_trip() {
        let m = DMatrix::from_row_slice(2, 2, &[1.0, 0.5, 0.5, 1.0]);
        let l = cholesky(&m).unwrap();
        let reconstructed = &l * l.transpose();
        for i in 0..2 {
            for j in 0..2 {
                assert!((reconstructed[(i, j)] - m[(i, j)]).abs() < 1e-10);
            }
        }
    }

    #[test]
    fn detects_asymmetry() {
        let m = DMatrix::from_row_slice(2, 2, &[1.0, 0.5, 0.6, 1.0]);
        assert!(!validate(&m).is_empty());
    }

    #[test]
    fn adjust_to_pd_recovers_near_singular_matrix() {
        let _ = env_logger::try_init();
        // off-diagonals all 0.999 on a 3x3 is not PD.
        let m = DMatrix::from_row_slice(
            3,
            3,
            &[1.0, 0.999, 0.999, 0.999, 1.0, 0.999, 0.999, 0.999, 1.0],
        );
        assert!(cholesky(&m).is_err());
        let adjusted = adjust_to_pd(&m).unwrap();
        assert!(cholesky(&adjusted).is_ok());
    }

    #[test]
    fn templates_are_valid_correlation_matrices() {
        for t in [
            templates::manufacturing(),
            templates::retail(),
            templates::technology(),
            templates::real_estate(),
            templates::financial_services(),
        ] {
            assert!(validate(&t).is_empty());
        }
    }
}
