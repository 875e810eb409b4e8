//! Error types for the gaze selection core
//!
//! Missing signals (no gaze, no candidates, no direction) are not errors;
//! they surface as `None` results. Only malformed input at the calibration
//! boundary and persistence failures end up here.

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum GazeError {
    #[error("calibration {field} out of range [0, 1]: {value}")]
    SampleOutOfRange { field: &'static str, value: f64 },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("model file {path}: {reason}")]
    ModelFormat { path: PathBuf, reason: String },

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("config parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

pub type Result<T> = std::result::Result<T, GazeError>;
