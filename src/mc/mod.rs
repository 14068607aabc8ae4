// src/mc/mod.rs
pub mod covenant;
pub mod scenario;

pub use covenant::{Covenant, CovenantAccumulator};
pub use scenario::{
    CancellationToken, NoiseSpec, ScenarioConfig, ScenarioOutput, TimeStepUnit, Variable,
    run_scenarios,
};
