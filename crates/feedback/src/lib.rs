pub mod gtts;
pub mod speech;
pub mod synthesizer;

pub use gtts::GoogleTranslateTts;
pub use speech::{SpeechError, SpeechSynthesizer};
pub use synthesizer::{
    DEFAULT_SYNTHESIS_TIMEOUT, FeedbackArtifact, FeedbackError, FeedbackSynthesizer,
    INVALID_TEXT, spoken_text,
};
