// src/models/mod.rs
pub mod deterministic;
pub mod gbm;
pub mod heston;
pub mod model;
pub mod merton;
pub mod ou_process;

pub use deterministic::Deterministic;
pub use gbm::Gbm;
pub use heston::{Heston, HestonParams};
pub use merton::{Merton, MertonParams};
pub use model::SDEModel;
pub use ou_process::OuProcess;

use crate::error::SdeResult;
use rand_core::RngCore;

/// Which Euler scheme to use for models that support more than one
/// (currently only GBM; every other model has exactly one stepping rule
/// per §4.4 and ignores this setting).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Discretization {
    Euler,
    Milstein,
}

/// A single variable's state between steps. `aux` carries Heston's
/// variance; every other model leaves it `None`.
#[derive(Debug, Clone, Copy)]
pub struct VariableState {
    pub value: f64,
    pub aux: Option<f64>,
}

impl VariableState {
    pub fn scalar(value: f64) -> Self {
        VariableState { value, aux: None }
    }
}

/// Dispatches to the model-specific stepping rule named in §4.4.
#[derive(Clone, Copy)]
pub enum VariableModel {
    Gbm(Gbm),
    OrnsteinUhlenbeck(OuProcess),
    Heston(Heston),
    MertonJump(Merton),
    Deterministic(Deterministic),
}

impl VariableModel {
    /// Starting state. `initial_value` comes from the `Variable` record
    /// (§3), not the model's own parameter struct, since every `sde_model`
    /// variant shares that field independent of its dynamics; Heston's
    /// auxiliary variance still starts from its own `v0`.
    pub fn initial_state(&self, initial_value: f64) -> VariableState {
        match self {
            VariableModel::Heston(m) => VariableState {
                value: initial_value,
                aux: Some(m.params.v0),
            },
            _ => VariableState::scalar(initial_value),
        }
    }

    /// The model's drift/mean-reversion target, if it has one
    /// (`Deterministic` doesn't).
    pub fn mu(&self) -> Option<f64> {
        match self {
            VariableModel::Gbm(m) => Some(m.mu),
            VariableModel::OrnsteinUhlenbeck(m) => Some(m.mu),
            VariableModel::Heston(m) => Some(m.params.mu),
            VariableModel::MertonJump(m) => Some(m.params.mu),
            VariableModel::Deterministic(_) => None,
        }
    }

    /// Returns a copy of this model with `mu` (or OU's mean-reversion
    /// target) replaced, used by stress scenarios that shock `mu` (§4.10).
    pub fn with_mu(&self, new_mu: f64) -> VariableModel {
        match self {
            VariableModel::Gbm(m) => VariableModel::Gbm(Gbm { mu: new_mu, ..*m }),
            VariableModel::OrnsteinUhlenbeck(m) => {
                VariableModel::OrnsteinUhlenbeck(OuProcess { mu: new_mu, ..*m })
            }
            VariableModel::Heston(m) => VariableModel::Heston(Heston {
                params: HestonParams { mu: new_mu, ..m.params },
            }),
            VariableModel::MertonJump(m) => VariableModel::MertonJump(Merton {
                params: MertonParams { mu: new_mu, ..m.params },
            }),
            VariableModel::Deterministic(m) => VariableModel::Deterministic(*m),
        }
    }

    /// Advances `state` by one step of size `dt`, consuming the
    /// orchestrator-supplied correlated/copula normal `z` plus any
    /// model-internal independent draws it needs from `rng`.
    pub fn step(
        &self,
        state: &mut VariableState,
        dt: f64,
        z: f64,
        discretization: Discretization,
        rng: &mut impl RngCore,
    ) -> SdeResult<()> {
        match self {
            VariableModel::Gbm(m) => {
                state.value = match discretization {
                    Discretization::Euler => m.euler_log_step(state.value, dt, z),
                    Discretization::Milstein => m.milstein_step(state.value, dt, z),
                };
                Ok(())
            }
            VariableModel::OrnsteinUhlenbeck(m) => {
                state.value = m.exact_step(state.value, dt, z);
                Ok(())
            }
            VariableModel::Heston(m) => {
                let mut v = state.aux.unwrap_or(m.params.v0);
                m.step(&mut state.value, &mut v, dt, z, rng)?;
                state.aux = Some(v);
                Ok(())
            }
            VariableModel::MertonJump(m) => m.step(&mut state.value, dt, z, rng),
            VariableModel::Deterministic(m) => {
                state.value = m.step(state.value, dt);
                Ok(())
            }
        }
    }

    /// Reported value for a step: Heston's variance is exported as
    /// `max(0, v)` even though it's carried signed internally (§4.4).
    pub fn reported_aux(&self, state: &VariableState) -> Option<f64> {
        state.aux.map(|v| v.max(0.0))
    }
}
