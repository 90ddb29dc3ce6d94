use crate::config::Settings;
use crate::pipeline::ClassificationPipeline;
use crate::routes::router;
use crate::state::AppState;
use anyhow::Context;
use artifacts::{ArtifactDirs, ArtifactStore};
use feedback::{FeedbackSynthesizer, GoogleTranslateTts};
use inference::{
    Classifier, ConfidenceGate, InferenceBackend, LabelCatalog, LabelResolver, OrtBackend,
};
use preprocess::CpuPreProcessor;
use std::sync::Arc;

pub async fn build_pipeline(
    settings: &Settings,
) -> anyhow::Result<ClassificationPipeline<OrtBackend>> {
    let pipeline = &settings.pipeline;

    let store = ArtifactStore::new(ArtifactDirs {
        upload_dir: pipeline.upload_dir.clone(),
        upload_url_prefix: settings.upload_url_prefix()?,
        audio_dir: pipeline.audio_dir.clone(),
        audio_url_prefix: settings.audio_url_prefix()?,
    });
    store
        .ensure_dirs()
        .await
        .context("failed to create artifact directories")?;

    let catalog = LabelCatalog::load(&pipeline.class_index_path)
        .context("failed to load class index table")?;
    let resolver = LabelResolver::new(Arc::new(catalog));

    let model_path = pipeline.model_path.clone();
    let provider = pipeline.execution_provider;
    let backend = tokio::task::spawn_blocking(move || OrtBackend::load_model(&model_path, provider))
        .await
        .context("model loading task failed")?
        .context("failed to load model")?;

    let classifier = Classifier::new(backend, pipeline.input_size())
        .with_activation(pipeline.model_output)
        .with_timeout(pipeline.inference_timeout());

    let warm = classifier.clone();
    let num_classes = tokio::task::spawn_blocking(move || warm.warm_up())
        .await
        .context("warm-up task failed")?
        .context("model warm-up failed")?;

    let missing = resolver.missing_ids(num_classes);
    if missing.is_empty() {
        tracing::info!(num_classes, "Model warmed up");
    } else {
        tracing::warn!(
            num_classes,
            ?missing,
            "Class index table does not cover every model output"
        );
    }

    let gate = ConfidenceGate::new(pipeline.confidence_threshold, resolver)?;

    let speech = GoogleTranslateTts::new(pipeline.tts_base_url.as_str())?;
    let feedback = FeedbackSynthesizer::new(
        Arc::new(speech),
        pipeline.speech_language.as_str(),
        store.clone(),
    )
    .with_timeout(pipeline.synthesis_timeout());

    let preprocessor = CpuPreProcessor::new(pipeline.input_size())
        .with_max_input_bytes(settings.application.max_upload_bytes);

    Ok(ClassificationPipeline::new(
        preprocessor,
        classifier,
        gate,
        feedback,
        store,
    ))
}

pub async fn run(settings: Settings) -> anyhow::Result<()> {
    let pipeline = build_pipeline(&settings).await?;

    let app = router(
        AppState::new(pipeline),
        &settings.application.static_dir,
        settings.application.max_upload_bytes,
    );

    let address = settings.application.address();
    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .with_context(|| format!("failed to bind {address}"))?;
    tracing::info!(%address, "Gateway listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Gateway stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
