// ============================================================
// Layer 3 — Domain Errors
// ============================================================
// Every precondition, configuration and persistence failure the
// system can report. None of these are retried: the caller fixes
// the input or the run stops.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum VaeError {
    #[error("unknown network architecture '{0}'")]
    UnknownNetwork(String),

    #[error("an input shape is required when no trained run is loaded")]
    MissingInputShape,

    #[error("network '{network}' needs height and width divisible by {factor}, got {height}x{width}")]
    IncompatibleShape {
        network: String,
        height: usize,
        width: usize,
        factor: usize,
    },

    #[error("vae has latent space of {expected}, got {actual}")]
    LatentDimMismatch { expected: usize, actual: usize },

    #[error("batch shape mismatch: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    #[error("unsupported array rank {0}")]
    BadRank(usize),

    #[error("input must be normalised to [0, 1], found values in [{min}, {max}]")]
    NotNormalized { min: f32, max: f32 },

    #[error("dataset is empty")]
    EmptyDataset,

    #[error("invalid hyperparameters: {0}")]
    InvalidParams(String),

    #[error("loading {} failed: {reason}", path.display())]
    ParamsUnreadable { path: PathBuf, reason: String },

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type VaeResult<T> = Result<T, VaeError>;
