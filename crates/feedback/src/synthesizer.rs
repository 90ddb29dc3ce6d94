use crate::speech::{SpeechError, SpeechSynthesizer};
use artifacts::{ArtifactStore, AudioKind, StorageError};
use inference::ConfidenceDecision;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_SYNTHESIS_TIMEOUT: Duration = Duration::from_millis(15_000);
pub const INVALID_TEXT: &str = "Uang tidak terdeteksi";

#[derive(Error, Debug)]
pub enum FeedbackError {
    #[error(transparent)]
    Speech(#[from] SpeechError),

    #[error("Speech synthesis timed out after {0:?}")]
    Timeout(Duration),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedbackArtifact {
    pub spoken_text: String,
    /// Public URL path of the stored clip.
    pub audio_path: String,
}

pub fn spoken_text(decision: &ConfidenceDecision) -> String {
    match decision {
        ConfidenceDecision::Valid { label, .. } => format!("{label} rupiah"),
        ConfidenceDecision::Invalid { .. } => INVALID_TEXT.to_string(),
    }
}

/// Turns a decision into a stored audio clip.
#[derive(Clone)]
pub struct FeedbackSynthesizer {
    speech: Arc<dyn SpeechSynthesizer>,
    language: String,
    timeout: Duration,
    store: ArtifactStore,
}

impl FeedbackSynthesizer {
    pub fn new(
        speech: Arc<dyn SpeechSynthesizer>,
        language: impl Into<String>,
        store: ArtifactStore,
    ) -> Self {
        Self {
            speech,
            language: language.into(),
            timeout: DEFAULT_SYNTHESIS_TIMEOUT,
            store,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub async fn synthesize(
        &self,
        decision: &ConfidenceDecision,
    ) -> Result<FeedbackArtifact, FeedbackError> {
        let text = spoken_text(decision);
        let kind = if decision.is_valid() {
            AudioKind::Valid
        } else {
            AudioKind::Invalid
        };

        let audio = tokio::time::timeout(
            self.timeout,
            self.speech.synthesize(&text, &self.language),
        )
        .await
        .map_err(|_| FeedbackError::Timeout(self.timeout))??;

        let stored = self.store.save_audio(&audio, kind).await?;

        tracing::debug!(
            engine = self.speech.name(),
            text = %text,
            audio = %stored.url_path,
            "Feedback audio ready"
        );

        Ok(FeedbackArtifact {
            spoken_text: text,
            audio_path: stored.url_path,
        })
    }
}
