// src/solvers/mod.rs
//! Generic `SDEModel`-trait-based steppers. These are a secondary,
//! diagnostic path: the primary orchestrator in `mc::scenario` calls each
//! model's own spec-exact step function (GBM's Euler-log/Milstein, OU's
//! exact update, Heston's Full Truncation Euler, Merton's jump step)
//! because those aren't all expressible as one generic `drift*dt +
//! diffusion*dW` update. These generic steppers stay useful for anyone
//! integrating a custom `SDEModel` outside the five built-in variable types.
pub mod euler_maruyama;
pub mod milstein;

pub use euler_maruyama::EulerMaruyama;
pub use milstein::Milstein;
