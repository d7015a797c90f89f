use thiserror::Error;

use crate::ensemble::ChannelKind;

#[derive(Error, Debug)]
pub enum AverageError {
    #[error(
        "{channel} sample shape mismatch: expected {expected_bins}x{expected_beams}, got {found_bins}x{found_beams}"
    )]
    ShapeMismatch {
        channel: ChannelKind,
        expected_bins: usize,
        expected_beams: usize,
        found_bins: usize,
        found_beams: usize,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Ensemble parse error: {0}")]
    Parse(String),
}

pub type Result<T> = std::result::Result<T, AverageError>;
