use crate::config::{Environment, LogLevel};
use opentelemetry::global::BoxedTracer;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Install a local-only subscriber: pretty output in development, JSON in
/// production.
///
/// `RUST_LOG` takes precedence over `log_level` when it is set.
pub fn setup_logging(log_level: LogLevel, environment: Environment) {
    init_subscriber(log_level, environment, None);
}

/// Shared by [`setup_logging`] and `TelemetryGuard::init`; spans are also
/// exported through `tracer` when one is given.
pub(crate) fn init_subscriber(
    log_level: LogLevel,
    environment: Environment,
    tracer: Option<BoxedTracer>,
) {
    let otel_layer = tracer.map(|tracer| tracing_opentelemetry::layer().with_tracer(tracer));

    let registry = tracing_subscriber::registry()
        .with(env_filter(log_level))
        .with(otel_layer);

    match environment {
        Environment::Production => {
            registry
                .with(tracing_subscriber::fmt::layer().json().with_level(true))
                .init();
        }
        Environment::Development => {
            registry
                .with(tracing_subscriber::fmt::layer().pretty().with_ansi(true))
                .init();
        }
    }
}

fn env_filter(log_level: LogLevel) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level.as_str()))
}
