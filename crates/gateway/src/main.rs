use anyhow::Context;
use gateway::{config::get_configuration, logging::setup_logging, startup};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = get_configuration().context("failed to load configuration")?;
    let _telemetry = setup_logging(&settings)?;

    tracing::info!(
        environment = settings.environment.as_str(),
        model = %settings.pipeline.model_path.display(),
        threshold = settings.pipeline.confidence_threshold,
        "Gateway starting"
    );

    startup::run(settings).await
}
