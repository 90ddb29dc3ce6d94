use uuid::Uuid;

const MAX_HINT_CHARS: usize = 100;
const DEFAULT_HINT: &str = "upload";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioKind {
    /// Spoken denomination.
    Valid,
    /// "Not detected" message.
    Invalid,
}

impl AudioKind {
    fn prefix(&self) -> &'static str {
        match self {
            AudioKind::Valid => "audio",
            AudioKind::Invalid => "audio_invalid",
        }
    }
}

fn token() -> String {
    Uuid::new_v4().simple().to_string()
}

pub(crate) fn upload_name(unix_seconds: i64, hint: Option<&str>) -> String {
    let hint = hint.map(sanitize_filename);
    let hint = hint.as_deref().unwrap_or(DEFAULT_HINT);
    format!("{unix_seconds}_{}_{hint}", token())
}

pub(crate) fn audio_name(unix_seconds: i64, kind: AudioKind) -> String {
    format!("{}_{unix_seconds}_{}.mp3", kind.prefix(), token())
}

/// Reduce a client supplied filename to something safe to join onto a
/// directory: final path component only, `[A-Za-z0-9._-]` kept, everything
/// else replaced by `_`, no leading dots.
pub fn sanitize_filename(hint: &str) -> String {
    let last = hint.rsplit(['/', '\\']).next().unwrap_or_default();

    let cleaned: String = last
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .take(MAX_HINT_CHARS)
        .collect();

    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.is_empty() {
        DEFAULT_HINT.to_string()
    } else {
        cleaned.to_string()
    }
}
