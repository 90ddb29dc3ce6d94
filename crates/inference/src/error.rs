use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum InferenceError {
    #[error("Failed to load model from {path}: {message}")]
    ModelLoad { path: PathBuf, message: String },

    #[error("Input shape mismatch: model expects {expected:?}, got {actual:?}")]
    ShapeMismatch {
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    #[error("Inference runtime error: {0}")]
    Runtime(String),

    #[error("Model produced unusable output: {0}")]
    InvalidOutput(String),

    #[error("Inference did not finish within {0:?}")]
    Timeout(Duration),

    #[error("Inference worker failed: {0}")]
    Worker(String),
}
