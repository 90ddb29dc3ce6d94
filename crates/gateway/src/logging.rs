use crate::config::Settings;
use common::TelemetryGuard;

/// Export to the OTLP collector when one is configured, otherwise log locally.
///
/// The returned guard must be held for the lifetime of the process.
pub fn setup_logging(settings: &Settings) -> anyhow::Result<Option<TelemetryGuard>> {
    match settings.telemetry.otel_endpoint.as_deref() {
        Some(endpoint) => {
            let guard = TelemetryGuard::init(
                "gateway",
                endpoint,
                settings.log_level,
                settings.environment,
            )?;
            tracing::info!(endpoint, "OpenTelemetry export enabled");
            Ok(Some(guard))
        }
        None => {
            common::setup_logging(settings.log_level, settings.environment);
            Ok(None)
        }
    }
}
