use crate::backend::InferenceBackend;
use crate::error::InferenceError;
use common::span;
use ndarray::ArrayD;
use preprocess::ImageTensor;
use serde::Deserialize;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;

pub const DEFAULT_INFERENCE_TIMEOUT: Duration = Duration::from_secs(10);

/// Scores further than this outside [0, 1] are not treated as probabilities.
const PROBABILITY_TOLERANCE: f32 = 1e-4;

/// What the model's output layer emits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputActivation {
    /// Softmax already applied inside the model (Keras `Dense(..., activation="softmax")`)
    #[default]
    Probabilities,
    /// Raw logits; softmax is applied here
    Logits,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PredictionResult {
    pub class_id: usize,
    pub confidence: f32,
}

/// Owns the loaded model and serializes every inference call.
///
/// The backend sits behind a single mutex, so no two calls ever run
/// concurrently. Async callers queue on a one-permit semaphore first, and a
/// caller that times out while queued leaves without touching the model.
pub struct Classifier<B: InferenceBackend> {
    backend: Arc<Mutex<B>>,
    turn: Arc<Semaphore>,
    input_size: (u32, u32),
    activation: OutputActivation,
    timeout: Duration,
}

impl<B: InferenceBackend> Clone for Classifier<B> {
    fn clone(&self) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
            turn: Arc::clone(&self.turn),
            input_size: self.input_size,
            activation: self.activation,
            timeout: self.timeout,
        }
    }
}

impl<B: InferenceBackend> Classifier<B> {
    pub fn new(backend: B, input_size: (u32, u32)) -> Self {
        Self {
            backend: Arc::new(Mutex::new(backend)),
            turn: Arc::new(Semaphore::new(1)),
            input_size,
            activation: OutputActivation::default(),
            timeout: DEFAULT_INFERENCE_TIMEOUT,
        }
    }

    pub fn with_activation(mut self, activation: OutputActivation) -> Self {
        self.activation = activation;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn input_size(&self) -> (u32, u32) {
        self.input_size
    }

    /// Classify one tensor on the current thread, waiting for the model lock.
    pub fn infer_blocking(&self, tensor: &ImageTensor) -> Result<PredictionResult, InferenceError> {
        let expected = ImageTensor::shape_for(self.input_size);
        if tensor.shape() != expected {
            return Err(InferenceError::ShapeMismatch {
                expected: expected.to_vec(),
                actual: tensor.shape().to_vec(),
            });
        }

        let output = self.run_backend(tensor)?;
        let scores = flatten_scores(&output)?;

        let scores = match self.activation {
            OutputActivation::Probabilities => scores,
            OutputActivation::Logits => softmax(&scores),
        };

        let prediction = arg_max(&scores)?;

        tracing::debug!(
            class_id = prediction.class_id,
            confidence = prediction.confidence,
            num_classes = scores.len(),
            "Classified image"
        );

        Ok(prediction)
    }

    /// Classify on the blocking pool, bounded by the configured timeout.
    ///
    /// The timeout covers queueing for the model as well as running it. Only
    /// a call already running when the deadline passes still finishes on the
    /// backend; queued calls are dropped with their permit request.
    pub async fn infer(&self, tensor: ImageTensor) -> Result<PredictionResult, InferenceError> {
        let timeout = self.timeout;
        let deadline = Instant::now() + timeout;
        let classifier = self.clone();

        let run = async move {
            let permit = Arc::clone(&classifier.turn)
                .acquire_owned()
                .await
                .map_err(|_| InferenceError::Worker("model queue closed".to_string()))?;

            tokio::task::spawn_blocking(move || {
                let _permit = permit;
                // The blocking pool may start us after the caller gave up.
                if Instant::now() >= deadline {
                    return Err(InferenceError::Timeout(timeout));
                }
                classifier.infer_blocking(&tensor)
            })
            .await
            .map_err(|e| InferenceError::Worker(e.to_string()))?
        };

        match tokio::time::timeout_at(deadline.into(), run).await {
            Ok(result) => result,
            Err(_) => Err(InferenceError::Timeout(timeout)),
        }
    }

    /// Run the model once on a black image and return its output width.
    ///
    /// Used at startup to fail fast on a broken model and to learn the number
    /// of classes the model can emit.
    pub fn warm_up(&self) -> Result<usize, InferenceError> {
        let output = self.run_backend(&ImageTensor::zeros(self.input_size))?;
        let scores = flatten_scores(&output)?;
        Ok(scores.len())
    }

    fn run_backend(&self, tensor: &ImageTensor) -> Result<ArrayD<f32>, InferenceError> {
        let mut backend = self
            .backend
            .lock()
            .map_err(|_| InferenceError::Worker("model lock poisoned".to_string()))?;

        let _s = span!("model_inference");
        backend.infer(tensor.view())
    }
}

/// Accepts `[num_classes]` or `[1, num_classes]` output.
fn flatten_scores(output: &ArrayD<f32>) -> Result<Vec<f32>, InferenceError> {
    if output.ndim() > 1 && output.shape()[0] != 1 {
        return Err(InferenceError::InvalidOutput(format!(
            "expected a single batch, got shape {:?}",
            output.shape()
        )));
    }
    if output.is_empty() {
        return Err(InferenceError::InvalidOutput("empty output".to_string()));
    }
    Ok(output.iter().copied().collect())
}

/// Index and value of the highest score; the first index wins ties.
pub fn arg_max(scores: &[f32]) -> Result<PredictionResult, InferenceError> {
    if let Some(bad) = scores.iter().find(|v| !v.is_finite()) {
        return Err(InferenceError::InvalidOutput(format!(
            "non-finite score {bad}"
        )));
    }

    let (class_id, &max) = scores
        .iter()
        .enumerate()
        .fold(None, |best: Option<(usize, &f32)>, (i, v)| match best {
            Some((_, b)) if b >= v => best,
            _ => Some((i, v)),
        })
        .ok_or_else(|| InferenceError::InvalidOutput("empty output".to_string()))?;

    if !(-PROBABILITY_TOLERANCE..=1.0 + PROBABILITY_TOLERANCE).contains(&max) {
        return Err(InferenceError::InvalidOutput(format!(
            "top score {max} is not a probability; configure the model output as logits"
        )));
    }

    Ok(PredictionResult {
        class_id,
        confidence: max.clamp(0.0, 1.0),
    })
}

fn softmax(logits: &[f32]) -> Vec<f32> {
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = logits.iter().map(|&l| (l - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    exps.into_iter().map(|e| e / sum).collect()
}
