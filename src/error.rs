//! Error types for denoise-diffusion.

use std::path::PathBuf;

/// Result type alias using [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Candle tensor/model error (shape mismatches surface here unchanged).
    #[error("candle: {0}")]
    Candle(#[from] candle_core::Error),

    /// `uncond_prob` presence disagrees with the predictor's conditioning capability.
    #[error(
        "conditioning: uncond_prob = {uncond_prob:?} is inconsistent with use_cond = {use_cond}"
    )]
    ConditioningConfig {
        uncond_prob: Option<f64>,
        use_cond: bool,
    },

    /// Unknown beta schedule family.
    #[error("unsupported beta schedule: {0:?} (expected \"linear\" or \"cosine\")")]
    UnsupportedSchedule(String),

    /// Unknown loss kind.
    #[error("unsupported loss type: {0:?} (expected \"l1\" or \"l2\")")]
    UnsupportedLoss(String),

    /// Persisted parameters not found.
    #[error("no saved parameters at {}", .0.display())]
    NotFound(PathBuf),

    /// Preserved horizon outside `1..sequence_len`.
    #[error("preserved horizon {horizon} must satisfy 0 < horizon < {sequence_len}")]
    InvalidHorizon { horizon: usize, sequence_len: usize },

    /// A conditional predictor was called without a conditioning tensor.
    #[error("conditional predictor requires a conditioning tensor")]
    MissingCondition,

    /// Invalid configuration.
    #[error("config: {0}")]
    Config(String),

    /// I/O error.
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error.
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
}
