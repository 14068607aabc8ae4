// src/models/deterministic.rs
//! A variable with no stochastic increment at all: it stays flat at its
//! `initial_value`. `spec.md` §3 lists `deterministic` as a valid
//! `sde_model` but gives it no integration rule — "deterministic" reads
//! most naturally as "the step is the identity".
use super::model::SDEModel;
use crate::error::{validation::*, SdeResult};

#[derive(Clone, Copy, Debug)]
pub struct Deterministic {
    pub initial_value: f64,
}

impl Deterministic {
    pub fn new(initial_value: f64) -> SdeResult<Self> {
        validate_finite("initial_value", initial_value)?;
        Ok(Deterministic { initial_value })
    }

    pub fn step(&self, x_t: f64, _dt: f64) -> f64 {
        x_t
    }
}

impl SDEModel for Deterministic {
    fn drift(&self, _s: f64, _t: f64) -> f64 {
        0.0
    }

    fn diffusion(&self, _s: f64, _t: f64) -> f64 {
        0.0
    }

    fn diffusion_derivative(&self, _s: f64, _t: f64) -> f64 {
        0.0
    }

    fn step_with_dw(&self, _s_current: &mut f64, _t_current: f64, _dt: f64, _dw: f64) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stays_flat() {
        let d = Deterministic::new(42.0).unwrap();
        assert_eq!(d.step(42.0, 1.0), 42.0);
    }
}
