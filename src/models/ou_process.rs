// src/models/ou_process.rs
use super::model::SDEModel;
use crate::error::{validation::*, SdeResult};

#[derive(Clone, Copy, Debug)]
pub struct OuProcess {
    pub theta: f64,
    pub mu: f64,
    pub sigma: f64,
}

impl OuProcess {
    pub fn new(theta: f64, mu: f64, sigma: f64) -> SdeResult<Self> {
        validate_positive("theta", theta)?;
        validate_finite("mu", mu)?;
        validate_positive("sigma", sigma)?;
        Ok(OuProcess { theta, mu, sigma })
    }

    /// Exact update: `X <- mu + (X-mu)*e^(-theta*dt) + sigma*sqrt((1-e^(-2*theta*dt))/(2*theta))*Z`.
    pub fn exact_step(&self, x_t: f64, dt: f64, z: f64) -> f64 {
        let decay = (-self.theta * dt).exp();
        let variance_factor = ((1.0 - (-2.0 * self.theta * dt).exp()) / (2.0 * self.theta)).sqrt();
        self.mu + (x_t - self.mu) * decay + self.sigma * variance_factor * z
    }
}

impl SDEModel for OuProcess {
    fn drift(&self, s: f64, _t: f64) -> f64 {
        self.theta * (self.mu - s)
    }

    fn diffusion(&self, _s: f64, _t: f64) -> f64 {
        self.sigma
    }

    fn diffusion_derivative(&self, _s: f64, _t: f64) -> f64 {
        0.0
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
    fn exact_step_converges_toward_mu_with_no_noise() {
        let ou = OuProcess::new(2.0, 0.03, 0.01).unwrap();
        let mut x = 0.10;
        for _ in 0..500 {
            x = ou.exact_step(x, 1.0 / 252.0, 0.0);
        }
        assert!((x - 0.03).abs() < 0.01);
    }

    #[test]
    fn rejects_non_positive_theta() {
        assert!(OuProcess::new(0.0, 0.03, 0.01).is_err());
    }
}
