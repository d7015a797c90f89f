pub mod average;
pub mod config;
pub mod constants;
pub mod ensemble;
pub mod error;
pub mod output;
pub mod processing;

#[cfg(feature = "simulation")]
pub mod simulation;

pub use average::AverageManager;
pub use config::AverageConfig;
pub use ensemble::Ensemble;
pub use error::{AverageError, Result};
