use crate::error::InferenceError;
use ndarray::{ArrayD, ArrayViewD};
use serde::Deserialize;
use std::path::Path;

#[cfg(feature = "ort-backend")]
pub mod ort;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionProvider {
    #[default]
    Cpu,
    Cuda,
}

/// A loaded classification model.
///
/// Implementations are not required to be reentrant: `infer` takes `&mut self`
/// and [`crate::Classifier`] guarantees calls never overlap.
pub trait InferenceBackend: Send + 'static {
    fn load_model(path: &Path, provider: ExecutionProvider) -> Result<Self, InferenceError>
    where
        Self: Sized;

    /// Run the model on one NHWC batch and return its raw output
    /// (typically `[1, num_classes]`).
    fn infer(&mut self, input: ArrayViewD<'_, f32>) -> Result<ArrayD<f32>, InferenceError>;
}
