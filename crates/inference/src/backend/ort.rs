use super::{ExecutionProvider, InferenceBackend};
use crate::error::InferenceError;
use ndarray::{ArrayD, ArrayViewD};
use ort::{
    session::{
        Session,
        builder::{GraphOptimizationLevel, SessionBuilder},
    },
    value::TensorRef,
};
use std::fmt::Display;
use std::path::Path;

fn runtime<E: Display>(e: E) -> InferenceError {
    InferenceError::Runtime(e.to_string())
}

pub struct OrtBackend {
    session: Session,
}

impl OrtBackend {
    /// Load model with specified execution provider
    pub fn load_model_with_provider(
        path: &Path,
        provider: ExecutionProvider,
    ) -> Result<Self, InferenceError> {
        // Initialize ORT environment (idempotent)
        let _ = ort::init().commit();

        let builder = Session::builder()
            .map_err(runtime)?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(runtime)?
            .with_intra_threads(4)
            .map_err(runtime)?;

        let builder = match provider {
            ExecutionProvider::Cuda => with_cuda(builder)?,
            ExecutionProvider::Cpu => {
                tracing::info!("Initializing ONNX Runtime with CPU execution provider");
                builder
            }
        };

        let session = builder
            .commit_from_file(path)
            .map_err(|e| InferenceError::ModelLoad {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;

        tracing::info!(path = %path.display(), "Model loaded");
        Ok(Self { session })
    }
}

#[cfg(feature = "cuda")]
fn with_cuda(builder: SessionBuilder) -> Result<SessionBuilder, InferenceError> {
    tracing::info!("Initializing ONNX Runtime with CUDA execution provider");
    builder
        .with_execution_providers([
            ort::execution_providers::CUDAExecutionProvider::default()
                .with_device_id(0)
                .build()
                .error_on_failure(),
        ])
        .map_err(runtime)
}

#[cfg(not(feature = "cuda"))]
fn with_cuda(builder: SessionBuilder) -> Result<SessionBuilder, InferenceError> {
    tracing::warn!("CUDA requested but built without the `cuda` feature, falling back to CPU");
    Ok(builder)
}

impl InferenceBackend for OrtBackend {
    fn load_model(path: &Path, provider: ExecutionProvider) -> Result<Self, InferenceError> {
        Self::load_model_with_provider(path, provider)
    }

    fn infer(&mut self, input: ArrayViewD<'_, f32>) -> Result<ArrayD<f32>, InferenceError> {
        let input = TensorRef::from_array_view(input).map_err(runtime)?;
        let outputs = self.session.run(ort::inputs![input]).map_err(runtime)?;

        let scores = outputs[0].try_extract_array::<f32>().map_err(runtime)?;

        Ok(scores.into_owned())
    }
}
