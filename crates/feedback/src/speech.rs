use async_trait::async_trait;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SpeechError {
    #[error("Speech service unreachable: {0}")]
    Unreachable(String),

    #[error("Speech service rejected the request with status {status}")]
    Rejected { status: u16 },

    #[error("Nothing to synthesize")]
    EmptyText,

    #[error("Speech service returned no audio")]
    EmptyAudio,
}

/// Text-to-speech collaborator producing MP3 bytes.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    async fn synthesize(&self, text: &str, language: &str) -> Result<Vec<u8>, SpeechError>;

    /// Name used in logs.
    fn name(&self) -> &'static str;
}
