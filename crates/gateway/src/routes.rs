use crate::pipeline::{PipelineError, RawImage};
use crate::response::ClassifyResponse;
use crate::state::AppState;
use axum::{
    Json, Router,
    extract::{
        DefaultBodyLimit, Multipart, State,
        multipart::{MultipartError, MultipartRejection},
    },
    routing::{get, post},
};
use inference::InferenceBackend;
use serde_json::{Value, json};
use std::path::Path;
use tower_http::{cors::CorsLayer, services::ServeDir};

/// Multipart form field carrying the image.
pub const IMAGE_FIELD: &str = "image";

/// Room for multipart boundaries and part headers on top of the image itself.
const MULTIPART_OVERHEAD_BYTES: usize = 64 * 1024;

pub fn router<B: InferenceBackend>(
    state: AppState<B>,
    static_dir: &Path,
    max_upload_bytes: usize,
) -> Router {
    Router::new()
        .route("/predict", post(predict::<B>))
        .route("/health", get(health))
        .nest_service("/static", ServeDir::new(static_dir))
        .layer(DefaultBodyLimit::max(
            max_upload_bytes + MULTIPART_OVERHEAD_BYTES,
        ))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// Always answers 200; the outcome is carried in the body's `status`.
async fn predict<B: InferenceBackend>(
    State(state): State<AppState<B>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Json<ClassifyResponse> {
    let multipart = match multipart {
        Ok(multipart) => multipart,
        Err(rejection) => {
            tracing::debug!(error = %rejection, "Request is not a multipart upload");
            return Json(state.pipeline.reject(PipelineError::MissingInput));
        }
    };

    match read_image(multipart).await {
        Ok(image) => Json(state.pipeline.classify(image).await),
        Err(e) => Json(
            state
                .pipeline
                .reject(PipelineError::UploadRejected(e.body_text())),
        ),
    }
}

async fn read_image(mut multipart: Multipart) -> Result<Option<RawImage>, MultipartError> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some(IMAGE_FIELD) {
            continue;
        }
        let filename = field.file_name().map(str::to_string);
        let bytes = field.bytes().await?;
        return Ok(Some(RawImage {
            bytes: bytes.to_vec(),
            filename,
        }));
    }
    Ok(None)
}
