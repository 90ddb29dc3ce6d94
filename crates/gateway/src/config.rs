use common::{Environment, LogLevel};
use feedback::gtts::DEFAULT_TTS_BASE_URL;
use inference::{ExecutionProvider, OutputActivation};
use preprocess::DEFAULT_INPUT_SIZE;
use serde::Deserialize;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SettingsError {
    #[error(transparent)]
    Load(#[from] config::ConfigError),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub log_level: LogLevel,
    pub environment: Environment,
    pub application: ApplicationSettings,
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub telemetry: TelemetrySettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApplicationSettings {
    pub host: String,
    pub port: u16,
    pub static_dir: PathBuf,
    pub max_upload_bytes: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    pub model_path: PathBuf,
    pub class_index_path: PathBuf,
    pub upload_dir: PathBuf,
    pub audio_dir: PathBuf,
    pub image_width: u32,
    pub image_height: u32,
    pub confidence_threshold: f32,
    pub speech_language: String,
    pub execution_provider: ExecutionProvider,
    pub model_output: OutputActivation,
    pub inference_timeout_ms: u64,
    pub synthesis_timeout_ms: u64,
    pub tts_base_url: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TelemetrySettings {
    pub otel_endpoint: Option<String>,
}

impl ApplicationSettings {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl PipelineConfig {
    pub fn input_size(&self) -> (u32, u32) {
        (self.image_width, self.image_height)
    }

    pub fn inference_timeout(&self) -> Duration {
        Duration::from_millis(self.inference_timeout_ms)
    }

    pub fn synthesis_timeout(&self) -> Duration {
        Duration::from_millis(self.synthesis_timeout_ms)
    }
}

impl Settings {
    pub fn validate(&self) -> Result<(), SettingsError> {
        let p = &self.pipeline;

        if !(0.0..=1.0).contains(&p.confidence_threshold) {
            return Err(SettingsError::Invalid(format!(
                "pipeline.confidence_threshold must be within [0, 1], got {}",
                p.confidence_threshold
            )));
        }
        if p.image_width == 0 || p.image_height == 0 {
            return Err(SettingsError::Invalid(format!(
                "pipeline image size must be non-zero, got {}x{}",
                p.image_width, p.image_height
            )));
        }
        if p.speech_language.trim().is_empty() {
            return Err(SettingsError::Invalid(
                "pipeline.speech_language must not be empty".to_string(),
            ));
        }
        if p.inference_timeout_ms == 0 || p.synthesis_timeout_ms == 0 {
            return Err(SettingsError::Invalid(
                "pipeline timeouts must be non-zero".to_string(),
            ));
        }
        if self.application.max_upload_bytes == 0 {
            return Err(SettingsError::Invalid(
                "application.max_upload_bytes must be non-zero".to_string(),
            ));
        }

        self.upload_url_prefix()?;
        self.audio_url_prefix()?;
        Ok(())
    }

    /// Public URL prefix for stored uploads, e.g. `/static/upload`.
    pub fn upload_url_prefix(&self) -> Result<String, SettingsError> {
        served_prefix(&self.application.static_dir, &self.pipeline.upload_dir)
    }

    /// Public URL prefix for stored audio, e.g. `/static/audio`.
    pub fn audio_url_prefix(&self) -> Result<String, SettingsError> {
        served_prefix(&self.application.static_dir, &self.pipeline.audio_dir)
    }
}

/// `dir` must live under `static_dir`, which is mounted at `/static`.
fn served_prefix(static_dir: &Path, dir: &Path) -> Result<String, SettingsError> {
    let relative = dir.strip_prefix(static_dir).map_err(|_| {
        SettingsError::Invalid(format!(
            "{} is not inside the static directory {}",
            dir.display(),
            static_dir.display()
        ))
    })?;

    let mut prefix = String::from("/static");
    for component in relative.components() {
        match component {
            Component::Normal(part) => {
                prefix.push('/');
                prefix.push_str(&part.to_string_lossy());
            }
            Component::CurDir => {}
            _ => {
                return Err(SettingsError::Invalid(format!(
                    "{} escapes the static directory",
                    dir.display()
                )));
            }
        }
    }
    Ok(prefix)
}

fn builder_with_defaults(
    source: config::Environment,
) -> Result<config::ConfigBuilder<config::builder::DefaultState>, config::ConfigError> {
    config::Config::builder()
        .set_default("log_level", "info")?
        .set_default("environment", "development")?
        .set_default("application.host", "0.0.0.0")?
        .set_default("application.port", 5000)?
        .set_default("application.static_dir", "static")?
        .set_default(
            "application.max_upload_bytes",
            preprocess::DEFAULT_MAX_INPUT_BYTES as u64,
        )?
        .set_default("pipeline.model_path", "model/uang_mobilenet_lite.onnx")?
        .set_default("pipeline.class_index_path", "model/class_indices.json")?
        .set_default("pipeline.upload_dir", "static/upload")?
        .set_default("pipeline.audio_dir", "static/audio")?
        .set_default("pipeline.image_width", DEFAULT_INPUT_SIZE.0)?
        .set_default("pipeline.image_height", DEFAULT_INPUT_SIZE.1)?
        .set_default("pipeline.confidence_threshold", 0.60)?
        .set_default("pipeline.speech_language", "id")?
        .set_default("pipeline.execution_provider", "cpu")?
        .set_default("pipeline.model_output", "probabilities")?
        .set_default("pipeline.inference_timeout_ms", 10_000)?
        .set_default("pipeline.synthesis_timeout_ms", 15_000)?
        .set_default("pipeline.tts_base_url", DEFAULT_TTS_BASE_URL)
        .map(|builder| builder.add_source(source))
}

fn environment_source() -> config::Environment {
    config::Environment::with_prefix("GATEWAY")
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true)
}

fn load(source: config::Environment) -> Result<Settings, SettingsError> {
    let settings: Settings = builder_with_defaults(source)?
        .build()?
        .try_deserialize()?;
    settings.validate()?;
    Ok(settings)
}

/// Defaults overridden by `GATEWAY_*` variables, e.g.
/// `GATEWAY_PIPELINE__CONFIDENCE_THRESHOLD=0.7`.
pub fn get_configuration() -> Result<Settings, SettingsError> {
    load(environment_source())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load_with(vars: &[(&str, &str)]) -> Result<Settings, SettingsError> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        load(environment_source().source(Some(map)))
    }

    #[test]
    fn test_defaults() {
        let settings = load_with(&[]).unwrap();

        assert_eq!(settings.log_level, LogLevel::Info);
        assert_eq!(settings.environment, Environment::Development);
        assert_eq!(settings.application.address(), "0.0.0.0:5000");
        assert_eq!(settings.application.max_upload_bytes, 10 * 1024 * 1024);
        assert_eq!(settings.pipeline.input_size(), (160, 160));
        assert!((settings.pipeline.confidence_threshold - 0.60).abs() < 1e-6);
        assert_eq!(settings.pipeline.speech_language, "id");
        assert_eq!(settings.pipeline.execution_provider, ExecutionProvider::Cpu);
        assert_eq!(settings.pipeline.model_output, OutputActivation::Probabilities);
        assert_eq!(settings.pipeline.inference_timeout(), Duration::from_secs(10));
        assert_eq!(settings.pipeline.synthesis_timeout(), Duration::from_secs(15));
        assert!(settings.telemetry.otel_endpoint.is_none());
        assert_eq!(settings.upload_url_prefix().unwrap(), "/static/upload");
        assert_eq!(settings.audio_url_prefix().unwrap(), "/static/audio");
    }

    #[test]
    fn test_environment_overrides() {
        let settings = load_with(&[
            ("GATEWAY_LOG_LEVEL", "debug"),
            ("GATEWAY_ENVIRONMENT", "production"),
            ("GATEWAY_APPLICATION__PORT", "8080"),
            ("GATEWAY_PIPELINE__CONFIDENCE_THRESHOLD", "0.75"),
            ("GATEWAY_PIPELINE__EXECUTION_PROVIDER", "cuda"),
            ("GATEWAY_PIPELINE__MODEL_OUTPUT", "logits"),
            ("GATEWAY_TELEMETRY__OTEL_ENDPOINT", "http://collector:4317"),
        ])
        .unwrap();

        assert_eq!(settings.log_level, LogLevel::Debug);
        assert_eq!(settings.environment, Environment::Production);
        assert_eq!(settings.application.port, 8080);
        assert!((settings.pipeline.confidence_threshold - 0.75).abs() < 1e-6);
        assert_eq!(settings.pipeline.execution_provider, ExecutionProvider::Cuda);
        assert_eq!(settings.pipeline.model_output, OutputActivation::Logits);
        assert_eq!(
            settings.telemetry.otel_endpoint.as_deref(),
            Some("http://collector:4317")
        );
    }

    #[test]
    fn test_threshold_out_of_range_is_rejected() {
        let err = load_with(&[("GATEWAY_PIPELINE__CONFIDENCE_THRESHOLD", "1.5")]).unwrap_err();
        assert!(matches!(err, SettingsError::Invalid(_)));
    }

    #[test]
    fn test_zero_image_size_is_rejected() {
        let err = load_with(&[("GATEWAY_PIPELINE__IMAGE_WIDTH", "0")]).unwrap_err();
        assert!(matches!(err, SettingsError::Invalid(_)));
    }

    #[test]
    fn test_zero_timeout_is_rejected() {
        let err = load_with(&[("GATEWAY_PIPELINE__SYNTHESIS_TIMEOUT_MS", "0")]).unwrap_err();
        assert!(matches!(err, SettingsError::Invalid(_)));
    }

    #[test]
    fn test_audio_dir_outside_static_is_rejected() {
        let err = load_with(&[("GATEWAY_PIPELINE__AUDIO_DIR", "/tmp/audio")]).unwrap_err();
        assert!(matches!(err, SettingsError::Invalid(_)));

        let err = load_with(&[("GATEWAY_PIPELINE__AUDIO_DIR", "static/../audio")]).unwrap_err();
        assert!(matches!(err, SettingsError::Invalid(_)));
    }

    #[test]
    fn test_unknown_provider_fails_to_load() {
        let err = load_with(&[("GATEWAY_PIPELINE__EXECUTION_PROVIDER", "tpu")]).unwrap_err();
        assert!(matches!(err, SettingsError::Load(_)));
    }

    #[test]
    #[serial_test::serial]
    fn test_get_configuration_reads_process_environment() {
        unsafe { std::env::set_var("GATEWAY_PIPELINE__SPEECH_LANGUAGE", "en") };
        let settings = get_configuration();
        unsafe { std::env::remove_var("GATEWAY_PIPELINE__SPEECH_LANGUAGE") };

        assert_eq!(settings.unwrap().pipeline.speech_language, "en");
    }

    #[test]
    fn test_nested_static_dirs_map_to_urls() {
        assert_eq!(
            served_prefix(Path::new("static"), Path::new("static/media/audio")).unwrap(),
            "/static/media/audio"
        );
        assert_eq!(
            served_prefix(Path::new("static"), Path::new("static/./audio")).unwrap(),
            "/static/audio"
        );
    }
}
