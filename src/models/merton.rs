// src/models/merton.rs
use super::model::SDEModel;
use crate::distributions::{poisson, standard_normal};
use crate::error::{validation::*, SdeResult};
use rand_core::RngCore;

const FLOOR: f64 = 1e-10;

#[derive(Clone, Copy, Debug)]
pub struct MertonParams {
    pub s0: f64,
    pub mu: f64,
    pub sigma: f64,
    /// Jump intensity (jumps per unit time).
    pub lambda: f64,
    /// Mean of the log-jump size.
    pub mu_j: f64,
    /// Std dev of the log-jump size.
    pub sigma_j: f64,
}

#[derive(Clone, Copy, Debug)]
pub struct Merton {
    pub params: MertonParams,
}

impl Merton {
    pub fn new(params: MertonParams) -> SdeResult<Self> {
        validate_positive("s0", params.s0)?;
        validate_finite("mu", params.mu)?;
        validate_positive("sigma", params.sigma)?;
        validate_non_negative("lambda", params.lambda)?;
        validate_finite("mu_j", params.mu_j)?;
        validate_non_negative("sigma_j", params.sigma_j)?;
        Ok(Merton { params })
    }

    /// `z` is the orchestrator-supplied standard normal driving the
    /// continuous (GBM-log) leg; jump count and jump sizes are drawn
    /// independently from `rng`.
    pub fn step(&self, s: &mut f64, dt: f64, z: f64, rng: &mut impl RngCore) -> SdeResult<()> {
        let mut log_return = (self.params.mu - 0.5 * self.params.sigma * self.params.sigma) * dt
            + self.params.sigma * dt.sqrt() * z;

        let n_jumps = poisson(rng, self.params.lambda * dt)?;
        for _ in 0..n_jumps {
            log_return += self.params.mu_j + self.params.sigma_j * standard_normal(rng);
        }

        *s = (*s * log_return.exp()).max(FLOOR);
        Ok(())
    }
}

impl SDEModel for Merton {
    // Generic trait sees only the continuous leg; jumps are handled by `step`.
    fn drift(&self, s: f64, _t: f64) -> f64 {
        self.params.mu * s
    }

    fn diffusion(&self, s: f64, _t: f64) -> f64 {
        self.params.sigma * s
    }

    fn diffusion_derivative(&self, _s: f64, _t: f64) -> f64 {
        self.params.sigma
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

    fn params() -> MertonParams {
        MertonParams {
            s0: 100.0,
            mu: 0.05,
            sigma: 0.2,
            lambda: 1.0,
            mu_j: -0.1,
            sigma_j: 0.15,
        }
    }

    #[test]
    fn price_floored_at_tiny_value() {
        let merton = Merton::new(params()).unwrap();
        let mut rng = Mt19937::seed_from_u64(5);
        let mut s = 1e-12;
        merton.step(&mut s, 1.0, -10.0, &mut rng).unwrap();
        assert!(s >= 1e-10);
    }

    #[test]
    fn rejects_negative_sigma() {
        let bad = MertonParams { sigma: -0.1, ..params() };
        assert!(Merton::new(bad).is_err());
    }

    #[test]
    fn zero_intensity_never_jumps() {
        let no_jump_params = MertonParams { lambda: 0.0, ..params() };
        let merton = Merton::new(no_jump_params).unwrap();
        let mut rng = Mt19937::seed_from_u64(3);
        let mut s = 100.0;
        for _ in 0..200 {
            merton.step(&mut s, 1.0 / 252.0, standard_normal(&mut rng), &mut rng).unwrap();
        }
        assert!(s.is_finite() && s > 0.0);
    }
}
