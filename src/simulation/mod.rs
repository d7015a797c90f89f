mod generator;
mod measure;

pub use generator::{EnsembleGenerator, SimulationConfig, generate_ensembles, true_profile};
pub use measure::{ProfileError, profile_error};
