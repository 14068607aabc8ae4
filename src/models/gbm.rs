// src/models/gbm.rs
use super::model::SDEModel;
use crate::error::{validation::*, SdeResult};

const FLOOR: f64 = 1e-10;

#[derive(Clone, Copy, Debug)]
pub struct Gbm {
    pub s0: f64,
    pub mu: f64,
    pub sigma: f64,
}

impl Gbm {
    pub fn new(s0: f64, mu: f64, sigma: f64) -> SdeResult<Self> {
        validate_positive("s0", s0)?;
        validate_finite("mu", mu)?;
        validate_positive("sigma", sigma)?;
        Ok(Gbm { s0, mu, sigma })
    }

    /// Euler-log step: `S <- S * exp((mu - sigma^2/2)dt + sigma*sqrt(dt)*Z)`.
    pub fn euler_log_step(&self, s_t: f64, dt: f64, z: f64) -> f64 {
        (s_t * ((self.mu - 0.5 * self.sigma * self.sigma) * dt + self.sigma * dt.sqrt() * z).exp())
            .max(FLOOR)
    }

    /// Milstein step with the Ito correction term.
    pub fn milstein_step(&self, s_t: f64, dt: f64, z: f64) -> f64 {
        let dw = dt.sqrt() * z;
        let next = s_t
            + self.mu * s_t * dt
            + self.sigma * s_t * dw
            + 0.5 * self.sigma * self.sigma * s_t * (dw * dw - dt);
        next.max(FLOOR)
    }

    /// Alias kept for callers that only know the closed-form lognormal
    /// update (identical to `euler_log_step`: GBM's Euler-log discretization
    /// is exact).
    pub fn exact_step(&self, s_t: f64, dt: f64, normal_draw: f64) -> f64 {
        self.euler_log_step(s_t, dt, normal_draw)
    }
}

impl SDEModel for Gbm {
    fn drift(&self, s: f64, _t: f64) -> f64 {
        self.mu * s
    }

    fn diffusion(&self, s: f64, _t: f64) -> f64 {
        self.sigma * s
    }

    fn diffusion_derivative(&self, _s: f64, _t: f64) -> f64 {
        self.sigma
    }

    fn step_with_dw(&self, s_current: &mut f64, t_current: f64, dt: f64, dw: f64) {
        *s_current +=
            self.drift(*s_current, t_current) * dt + self.diffusion(*s_current, t_current) * dw;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn euler_log_step_stays_positive() {
        let gbm = Gbm::new(100.0, 0.05, 0.2).unwrap();
        let next = gbm.euler_log_step(100.0, 1.0 / 252.0, -50.0);
        assert!(next >= 1e-10);
    }

    #[test]
    fn milstein_matches_euler_log_to_first_order() {
        let gbm = Gbm::new(100.0, 0.05, 0.2).unwrap();
        let dt = 1.0 / 252.0;
        let z = 0.3;
        let euler = gbm.euler_log_step(100.0, dt, z);
        let milstein = gbm.milstein_step(100.0, dt, z);
        assert!((euler - milstein).abs() / euler < 0.01);
    }

    #[test]
    fn rejects_non_positive_sigma() {
        assert!(Gbm::new(100.0, 0.05, 0.0).is_err());
    }
}
