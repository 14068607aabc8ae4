//! # scenario-engine: Monte Carlo scenario analytics for financial planning
//!
//! Simulates correlated or copula-coupled stochastic factors (GBM,
//! Ornstein-Uhlenbeck, Heston, Merton jump-diffusion, deterministic),
//! evaluates declarative probability-of-event trees against the resulting
//! trajectories, aggregates risk statistics, and updates Bayesian priors
//! from observed data.
//!
//! ## Key features
//!
//! - **Parallel Monte Carlo**: scenarios split over Rayon worker threads,
//!   each with its own deterministically-seeded MT19937, reduced in a
//!   stable worker-index order so results are invariant under thread count.
//! - **Correlation & copulas**: linear correlation via Cholesky, or
//!   Gaussian/Student-t/Clayton/Gumbel/Frank copulas for tail dependence a
//!   correlation matrix can't express.
//! - **Declarative events**: a serde-tagged recursive DSL
//!   (threshold/compound/conditional/sequence/at-least-k) evaluated against
//!   trajectories without a bespoke parser.
//! - **Risk aggregation**: percentiles, VaR/CVaR, higher moments, Wilson
//!   score confidence intervals.
//! - **Bayesian updating**: Beta-Bernoulli, Normal-Normal, and
//!   Normal-Inverse-Gamma conjugate posteriors, plus A/B testing and
//!   Thompson sampling built on top.
//!
//! ## Quick start
//!
//! ```rust
//! use scenario_engine::mc::scenario::{NoiseSpec, ScenarioConfig, TimeStepUnit, Variable};
//! use scenario_engine::models::{Discretization, Gbm, VariableModel};
//! use scenario_engine::result::run_simulation;
//!
//! let variables = vec![Variable {
//!     name: "revenue".to_string(),
//!     model: VariableModel::Gbm(Gbm::new(100.0, 0.05, 0.2).unwrap()),
//!     initial_value: 100.0,
//! }];
//! let config = ScenarioConfig {
//!     n_scenarios: 10_000,
//!     horizon_months: 12.0,
//!     dt_unit: TimeStepUnit::Monthly,
//!     discretization: Discretization::Euler,
//!     random_seed: Some(42),
//!     covenants: Vec::new(),
//!     cancellation: None,
//! };
//! let result = run_simulation(&variables, NoiseSpec::None, &config, Some("revenue")).unwrap();
//! println!("p50 revenue: {:.2}", result.percentiles["revenue"].p50);
//! ```

pub mod error;
pub mod rng;
pub mod math_utils;
pub mod distributions;
pub mod correlation;
pub mod copula;
pub mod models;
pub mod solvers;
pub mod mc;
pub mod events;
pub mod aggregate;
pub mod estimate;
pub mod bayes;
pub mod sensitivity;
pub mod result;

pub use error::{SdeError, SdeResult};
