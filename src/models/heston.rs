// src/models/heston.rs
//! Heston stochastic-volatility model.
//!
//! ```text
//! dS_t = mu S_t dt + sqrt(V_t) S_t dW_t^(1)
//! dV_t = kappa(theta - V_t) dt + xi sqrt(V_t) dW_t^(2)
//! ```
//!
//! `mu` is the variable's drift (not necessarily a risk-free rate — this
//! model is used for any mean-level-with-stochastic-volatility factor, not
//! just option underlyings). The Feller condition `2*kappa*theta > xi^2`
//! is exposed as a diagnostic and never rejected at construction time.

use super::model::SDEModel;
use crate::error::{validation::*, SdeError, SdeResult};
use crate::distributions::standard_normal;
use rand_core::RngCore;

#[derive(Clone, Copy, Debug)]
pub struct HestonParams {
    pub s0: f64,
    pub v0: f64,
    pub mu: f64,
    pub kappa: f64,
    pub theta: f64,
    pub xi: f64,
    pub rho: f64,
}

#[derive(Clone, Copy, Debug)]
pub struct Heston {
    pub params: HestonParams,
}

impl Heston {
    pub fn new(params: HestonParams) -> SdeResult<Self> {
        Self::validate_params(&params)?;
        Ok(Heston { params })
    }

    fn validate_params(params: &HestonParams) -> SdeResult<()> {
        validate_positive("s0", params.s0)?;
        validate_non_negative("v0", params.v0)?;
        validate_finite("mu", params.mu)?;
        validate_positive("kappa", params.kappa)?;
        validate_positive("theta", params.theta)?;
        validate_positive("xi", params.xi)?;
        validate_correlation("rho", params.rho)?;
        Ok(())
    }

    /// `true` when the Feller condition `2*kappa*theta > xi^2` holds, i.e.
    /// the continuous-time process would never reach zero variance.
    pub fn feller_satisfied(&self) -> bool {
        2.0 * self.params.kappa * self.params.theta > self.params.xi * self.params.xi
    }

    /// Full Truncation Euler step (§4.4). `z_s` is the orchestrator-supplied
    /// standard normal for this variable's own noise; the variance
    /// innovation's independent normal is drawn here from `rng`.
    ///
    /// `v` is stored signed (may go negative between steps per the exact
    /// FTE recursion); callers should export `v.max(0.0)` when reporting it.
    pub fn step(&self, s: &mut f64, v: &mut f64, dt: f64, z_s: f64, rng: &mut impl RngCore) -> SdeResult<()> {
        validate_positive("dt", dt)?;
        if !s.is_finite() || *s <= 0.0 {
            return Err(SdeError::NumericalInstability {
                method: "heston full truncation euler".to_string(),
                reason: format!("price became invalid before step: {s}"),
            });
        }

        let v_plus = v.max(0.0);
        let sigma_v = v_plus.sqrt();
        let z2 = standard_normal(rng);

        let sqrt_dt = dt.sqrt();
        let dw_s = sqrt_dt * z_s;
        let dw_v = self.params.rho * dw_s + (1.0 - self.params.rho * self.params.rho).sqrt() * z2 * sqrt_dt;

        *s *= ((self.params.mu - 0.5 * v_plus) * dt + sigma_v * dw_s).exp();
        *v += self.params.kappa * (self.params.theta - v_plus) * dt + self.params.xi * sigma_v * dw_v;

        if !s.is_finite() || *s <= 0.0 {
            return Err(SdeError::NumericalInstability {
                method: "heston full truncation euler".to_string(),
                reason: format!("price became invalid after step: {s}"),
            });
        }
        if !v.is_finite() {
            return Err(SdeError::NumericalInstability {
                method: "heston full truncation euler".to_string(),
                reason: format!("variance became non-finite after step: {v}"),
            });
        }
        Ok(())
    }
}

impl SDEModel for Heston {
    // The generic trait sees only the price leg, using v0 as a frozen
    // approximation — the real two-factor dynamics go through `step`.
    fn drift(&self, s: f64, _t: f64) -> f64 {
        self.params.mu * s
    }

    fn diffusion(&self, s: f64, _t: f64) -> f64 {
        self.params.v0.sqrt() * s
    }

    fn diffusion_derivative(&self, _s: f64, _t: f64) -> f64 {
        self.params.v0.sqrt()
    }

    fn step_with_dw(&self, s_current: &mut f64, t_current: f64, dt: f64, dw: f64) {
        *s_current +=
            self.drift(*s_current, t_current) * dt + self.diffusion(*s_current, t_current) * dw;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rng::Mt19937;
    use rand_core::SeedableRng;

    fn params() -> HestonParams {
        HestonParams {
            s0: 100.0,
            v0: 0.04,
            mu: 0.05,
            kappa: 2.0,
            theta: 0.04,
            xi: 0.3,
            rho: -0.5,
        }
    }

    #[test]
    fn price_stays_positive_over_many_steps() {
        let heston = Heston::new(params()).unwrap();
        let mut rng = Mt19937::seed_from_u64(42);
        let mut s = params().s0;
        let mut v = params().v0;
        for _ in 0..500 {
            let z = standard_normal(&mut rng);
            heston.step(&mut s, &mut v, 1.0 / 252.0, z, &mut rng).unwrap();
            assert!(s > 0.0);
        }
    }

    #[test]
    fn feller_condition_is_diagnostic_only() {
        let violating = HestonParams {
            kappa: 1.0,
            xi: 1.0,
            ..params()
        };
        let heston = Heston::new(violating).unwrap();
        assert!(!heston.feller_satisfied());
    }

    #[test]
    fn rejects_invalid_correlation() {
        let bad = HestonParams { rho: 1.5, ..params() };
        assert!(Heston::new(bad).is_err());
    }

    #[test]
    fn rejects_negative_vol_of_vol() {
        let bad = HestonParams { xi: -0.3, ..params() };
        assert!(Heston::new(bad).is_err());
    }
}
