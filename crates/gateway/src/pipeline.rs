use crate::response::ClassifyResponse;
use artifacts::ArtifactStore;
use feedback::{FeedbackError, FeedbackSynthesizer};
use inference::{
    Classifier, ConfidenceDecision, ConfidenceGate, InferenceBackend, InferenceError,
};
use opentelemetry::{
    KeyValue, global,
    metrics::{Counter, Histogram},
};
use preprocess::{CpuPreProcessor, ImageTensor, Preprocess, PreprocessError};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::Instrument;

/// One uploaded image as received from the client.
#[derive(Debug, Clone)]
pub struct RawImage {
    pub bytes: Vec<u8>,
    pub filename: Option<String>,
}

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("No image uploaded")]
    MissingInput,

    #[error("Invalid image file: {0}")]
    Decode(#[source] PreprocessError),

    #[error("Image preprocessing worker failed: {0}")]
    PreprocessWorker(String),

    #[error("Upload rejected: {0}")]
    UploadRejected(String),

    #[error("Classification failed: {0}")]
    Inference(#[from] InferenceError),

    #[error("Speech synthesis failed: {0}")]
    Synthesis(#[source] FeedbackError),

    #[error("Failed to store audio feedback: {0}")]
    Storage(#[source] FeedbackError),
}

impl From<FeedbackError> for PipelineError {
    fn from(e: FeedbackError) -> Self {
        match e {
            FeedbackError::Storage(_) => PipelineError::Storage(e),
            FeedbackError::Speech(_) | FeedbackError::Timeout(_) => PipelineError::Synthesis(e),
        }
    }
}

impl PipelineError {
    /// Message shown to the client.
    pub fn user_message(&self) -> &'static str {
        match self {
            PipelineError::MissingInput => "No image uploaded",
            PipelineError::Decode(_) | PipelineError::UploadRejected(_) => "Invalid image file",
            PipelineError::PreprocessWorker(_) => "Image processing failed",
            PipelineError::Inference(_) => "Classification failed",
            PipelineError::Synthesis(_) => "Speech synthesis failed",
            PipelineError::Storage(_) => "Failed to store audio feedback",
        }
    }

    /// Outcome label used in logs and metrics.
    pub fn outcome(&self) -> &'static str {
        match self {
            PipelineError::MissingInput => "missing_input",
            PipelineError::Decode(_) | PipelineError::UploadRejected(_) => "decode_error",
            PipelineError::PreprocessWorker(_) => "preprocess_error",
            PipelineError::Inference(_) => "inference_error",
            PipelineError::Synthesis(_) => "synthesis_error",
            PipelineError::Storage(_) => "storage_error",
        }
    }

    /// The request itself was unusable, as opposed to a failure on our side.
    pub fn is_client_error(&self) -> bool {
        match self {
            PipelineError::MissingInput | PipelineError::UploadRejected(_) => true,
            PipelineError::Decode(e) => e.is_invalid_input(),
            _ => false,
        }
    }
}

struct PipelineMetrics {
    requests: Counter<u64>,
    duration: Histogram<f64>,
    inference: Histogram<f64>,
}

fn init_metrics(meter_name: &'static str) -> PipelineMetrics {
    // Bucket boundaries come from the meter provider's latency view.
    let meter = global::meter(meter_name);
    let requests = meter
        .u64_counter("classify_requests_total")
        .with_description("Classification requests by outcome")
        .build();
    let duration = meter
        .f64_histogram("classify_duration_seconds")
        .with_description("End-to-end time to answer a classification request")
        .with_unit("s")
        .build();
    let inference = meter
        .f64_histogram("inference_duration_seconds")
        .with_description("Time spent waiting for and running the model")
        .with_unit("s")
        .build();

    PipelineMetrics {
        requests,
        duration,
        inference,
    }
}

/// Image in, spoken verdict out.
///
/// Every failure is folded into [`ClassifyResponse::Error`]; `classify` itself
/// never fails.
pub struct ClassificationPipeline<B: InferenceBackend> {
    preprocessor: Arc<CpuPreProcessor>,
    classifier: Classifier<B>,
    gate: ConfidenceGate,
    feedback: FeedbackSynthesizer,
    store: ArtifactStore,
    metrics: PipelineMetrics,
}

impl<B: InferenceBackend> ClassificationPipeline<B> {
    pub fn new(
        preprocessor: CpuPreProcessor,
        classifier: Classifier<B>,
        gate: ConfidenceGate,
        feedback: FeedbackSynthesizer,
        store: ArtifactStore,
    ) -> Self {
        Self {
            preprocessor: Arc::new(preprocessor),
            classifier,
            gate,
            feedback,
            store,
            metrics: init_metrics("gateway"),
        }
    }

    pub async fn classify(&self, image: Option<RawImage>) -> ClassifyResponse {
        let start = Instant::now();
        let span = tracing::info_span!("classify");

        let response = match self.run(image).instrument(span).await {
            Ok(response) => response,
            Err(e) => self.report(&e),
        };

        self.metrics.duration.record(start.elapsed().as_secs_f64(), &[]);
        self.metrics
            .requests
            .add(1, &[KeyValue::new("status", response.status())]);

        response
    }

    /// Answer for a request rejected before reaching the pipeline, e.g. a
    /// malformed multipart body.
    pub fn reject(&self, error: PipelineError) -> ClassifyResponse {
        let response = self.report(&error);
        self.metrics
            .requests
            .add(1, &[KeyValue::new("status", response.status())]);
        response
    }

    fn report(&self, error: &PipelineError) -> ClassifyResponse {
        if error.is_client_error() {
            tracing::warn!(outcome = error.outcome(), error = %error, "Rejected image");
        } else {
            tracing::error!(
                outcome = error.outcome(),
                error = %error,
                "Classification request failed"
            );
        }
        ClassifyResponse::error(error.user_message())
    }

    async fn run(&self, image: Option<RawImage>) -> Result<ClassifyResponse, PipelineError> {
        let image = match image {
            Some(image) if !image.bytes.is_empty() => image,
            _ => return Err(PipelineError::MissingInput),
        };

        // Best effort: a failed copy never blocks classification.
        match self
            .store
            .save_upload(&image.bytes, image.filename.as_deref())
            .await
        {
            Ok(stored) => tracing::debug!(path = %stored.fs_path.display(), "Upload stored"),
            Err(e) => tracing::warn!(error = %e, "Failed to store upload"),
        }

        let tensor = self.preprocess(image.bytes).await?;

        let inference_start = Instant::now();
        let prediction = self.classifier.infer(tensor).await?;
        self.metrics
            .inference
            .record(inference_start.elapsed().as_secs_f64(), &[]);

        let decision = self.gate.gate(&prediction);
        let artifact = self.feedback.synthesize(&decision).await?;

        let response = match decision {
            ConfidenceDecision::Valid {
                label,
                confidence_percent,
            } => {
                tracing::info!(
                    outcome = "success",
                    class_id = prediction.class_id,
                    label = %label,
                    confidence = confidence_percent,
                    "Banknote recognised"
                );
                ClassifyResponse::Success {
                    label,
                    confidence: confidence_percent,
                    audio: artifact.audio_path,
                }
            }
            ConfidenceDecision::Invalid { confidence_percent } => {
                tracing::info!(
                    outcome = "invalid",
                    class_id = prediction.class_id,
                    confidence = confidence_percent,
                    threshold = self.gate.threshold(),
                    "Prediction below confidence threshold"
                );
                ClassifyResponse::Invalid {
                    confidence: confidence_percent,
                    audio: artifact.audio_path,
                }
            }
        };

        Ok(response)
    }

    async fn preprocess(&self, bytes: Vec<u8>) -> Result<ImageTensor, PipelineError> {
        let preprocessor = Arc::clone(&self.preprocessor);
        preprocess_on_worker(move || preprocessor.preprocess(&bytes)).await
    }
}

/// A panicking decoder surfaces as `PreprocessWorker`, never as an inference failure.
async fn preprocess_on_worker<F>(work: F) -> Result<ImageTensor, PipelineError>
where
    F: FnOnce() -> Result<ImageTensor, PreprocessError> + Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| PipelineError::PreprocessWorker(e.to_string()))?
        .map_err(PipelineError::Decode)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use artifacts::ArtifactDirs;
    use async_trait::async_trait;
    use feedback::{SpeechError, SpeechSynthesizer};
    use inference::{ExecutionProvider, LabelCatalog, LabelResolver};
    use ndarray::{ArrayD, ArrayViewD, IxDyn};
    use std::io::Cursor;
    use std::path::Path;
    use tempfile::TempDir;

    pub(crate) struct FixedScores(pub Vec<f32>);

    impl InferenceBackend for FixedScores {
        fn load_model(_: &Path, _: ExecutionProvider) -> Result<Self, InferenceError> {
            Ok(Self(vec![1.0]))
        }

        fn infer(&mut self, _: ArrayViewD<'_, f32>) -> Result<ArrayD<f32>, InferenceError> {
            ArrayD::from_shape_vec(IxDyn(&[1, self.0.len()]), self.0.clone())
                .map_err(|e| InferenceError::InvalidOutput(e.to_string()))
        }
    }

    pub(crate) struct EchoSpeech {
        pub fail: bool,
    }

    #[async_trait]
    impl SpeechSynthesizer for EchoSpeech {
        async fn synthesize(&self, text: &str, _: &str) -> Result<Vec<u8>, SpeechError> {
            if self.fail {
                return Err(SpeechError::Unreachable("offline".to_string()));
            }
            Ok(text.as_bytes().to_vec())
        }

        fn name(&self) -> &'static str {
            "echo"
        }
    }

    pub(crate) async fn pipeline_in(
        root: &TempDir,
        scores: Vec<f32>,
        speech_fails: bool,
    ) -> ClassificationPipeline<FixedScores> {
        let store = ArtifactStore::new(ArtifactDirs {
            upload_dir: root.path().join("upload"),
            upload_url_prefix: "/static/upload".to_string(),
            audio_dir: root.path().join("audio"),
            audio_url_prefix: "/static/audio".to_string(),
        });
        store.ensure_dirs().await.unwrap();

        let catalog = LabelCatalog::from_class_indices([
            ("1000".to_string(), 0),
            ("2000".to_string(), 1),
            ("5000".to_string(), 2),
            ("50000".to_string(), 3),
        ])
        .unwrap();
        let gate = ConfidenceGate::new(0.60, LabelResolver::new(Arc::new(catalog))).unwrap();

        let feedback = FeedbackSynthesizer::new(
            Arc::new(EchoSpeech { fail: speech_fails }),
            "id",
            store.clone(),
        );

        ClassificationPipeline::new(
            CpuPreProcessor::new((160, 160)),
            Classifier::new(FixedScores(scores), (160, 160)),
            gate,
            feedback,
            store,
        )
    }

    pub(crate) fn png_bytes() -> Vec<u8> {
        let img = image::RgbImage::from_pixel(32, 24, image::Rgb([200, 120, 40]));
        let mut bytes = Vec::new();
        img.write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
            .unwrap();
        bytes
    }

    fn upload(bytes: Vec<u8>) -> Option<RawImage> {
        Some(RawImage {
            bytes,
            filename: Some("uang.png".to_string()),
        })
    }

    #[tokio::test]
    async fn test_confident_prediction_is_success() {
        let root = TempDir::new().unwrap();
        let pipeline = pipeline_in(&root, vec![0.02, 0.03, 0.03, 0.92], false).await;

        let response = pipeline.classify(upload(png_bytes())).await;

        let ClassifyResponse::Success {
            label,
            confidence,
            audio,
        } = response
        else {
            panic!("expected success, got {response:?}");
        };
        assert_eq!(label, "50000");
        assert_eq!(confidence, 92.0);
        assert!(audio.starts_with("/static/audio/audio_"));

        let name = audio.rsplit('/').next().unwrap();
        let spoken = std::fs::read(root.path().join("audio").join(name)).unwrap();
        assert_eq!(spoken, b"50000 rupiah");
    }

    #[tokio::test]
    async fn test_low_confidence_is_invalid() {
        let root = TempDir::new().unwrap();
        let pipeline = pipeline_in(&root, vec![0.59, 0.21, 0.10, 0.10], false).await;

        let response = pipeline.classify(upload(png_bytes())).await;

        let ClassifyResponse::Invalid { confidence, audio } = response else {
            panic!("expected invalid, got {response:?}");
        };
        assert_eq!(confidence, 59.0);
        assert!(audio.starts_with("/static/audio/audio_invalid_"));
    }

    #[tokio::test]
    async fn test_missing_image() {
        let root = TempDir::new().unwrap();
        let pipeline = pipeline_in(&root, vec![1.0], false).await;

        assert_eq!(
            pipeline.classify(None).await,
            ClassifyResponse::error("No image uploaded")
        );
        assert_eq!(
            pipeline.classify(upload(Vec::new())).await,
            ClassifyResponse::error("No image uploaded")
        );
    }

    #[tokio::test]
    async fn test_malformed_bytes_are_an_error_but_still_stored() {
        let root = TempDir::new().unwrap();
        let pipeline = pipeline_in(&root, vec![1.0], false).await;

        let response = pipeline
            .classify(upload(b"definitely not an image".to_vec()))
            .await;

        assert_eq!(response, ClassifyResponse::error("Invalid image file"));
        assert_eq!(
            std::fs::read_dir(root.path().join("upload")).unwrap().count(),
            1
        );
        assert_eq!(
            std::fs::read_dir(root.path().join("audio")).unwrap().count(),
            0
        );
    }

    #[tokio::test]
    async fn test_upload_copy_failure_does_not_block_classification() {
        let root = TempDir::new().unwrap();
        let pipeline = pipeline_in(&root, vec![0.1, 0.9], false).await;
        std::fs::remove_dir(root.path().join("upload")).unwrap();

        let response = pipeline.classify(upload(png_bytes())).await;
        assert_eq!(response.status(), "success");
    }

    #[tokio::test]
    async fn test_speech_failure_is_reported() {
        let root = TempDir::new().unwrap();
        let pipeline = pipeline_in(&root, vec![0.1, 0.9], true).await;

        let response = pipeline.classify(upload(png_bytes())).await;
        assert_eq!(response, ClassifyResponse::error("Speech synthesis failed"));
    }

    #[tokio::test]
    async fn test_invalid_model_output_is_classification_failure() {
        let root = TempDir::new().unwrap();
        let pipeline = pipeline_in(&root, vec![f32::NAN, 0.5], false).await;

        let response = pipeline.classify(upload(png_bytes())).await;
        assert_eq!(response, ClassifyResponse::error("Classification failed"));
    }

    #[tokio::test]
    async fn test_missing_audio_dir_is_storage_failure() {
        let root = TempDir::new().unwrap();
        let pipeline = pipeline_in(&root, vec![0.1, 0.9], false).await;
        std::fs::remove_dir(root.path().join("audio")).unwrap();

        let response = pipeline.classify(upload(png_bytes())).await;
        assert_eq!(
            response,
            ClassifyResponse::error("Failed to store audio feedback")
        );
    }

    #[test]
    fn test_feedback_errors_map_to_pipeline_errors() {
        let err: PipelineError = FeedbackError::Timeout(std::time::Duration::from_secs(1)).into();
        assert_eq!(err.user_message(), "Speech synthesis failed");
        assert_eq!(err.outcome(), "synthesis_error");

        let err = PipelineError::Decode(PreprocessError::Empty);
        assert_eq!(err.user_message(), "Invalid image file");
        assert_eq!(err.outcome(), "decode_error");
        assert!(err.is_client_error());

        assert!(!PipelineError::Decode(PreprocessError::OutOfRange(2.0)).is_client_error());
    }

    #[tokio::test]
    async fn test_preprocessing_panic_is_not_an_inference_failure() {
        let err = preprocess_on_worker(|| -> Result<ImageTensor, PreprocessError> {
            panic!("decoder crashed")
        })
        .await
        .unwrap_err();

        assert!(matches!(err, PipelineError::PreprocessWorker(_)));
        assert_eq!(err.outcome(), "preprocess_error");
        assert_eq!(err.user_message(), "Image processing failed");
        assert!(!err.is_client_error());
    }
}
