use crate::pipeline::ClassificationPipeline;
use inference::InferenceBackend;
use std::sync::Arc;

pub struct AppState<B: InferenceBackend> {
    pub pipeline: Arc<ClassificationPipeline<B>>,
}

impl<B: InferenceBackend> AppState<B> {
    pub fn new(pipeline: ClassificationPipeline<B>) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
        }
    }
}

impl<B: InferenceBackend> Clone for AppState<B> {
    fn clone(&self) -> Self {
        Self {
            pipeline: Arc::clone(&self.pipeline),
        }
    }
}
