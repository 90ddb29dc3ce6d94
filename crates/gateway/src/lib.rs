pub mod config;
pub mod logging;
pub mod pipeline;
pub mod response;
pub mod routes;
pub mod startup;
pub mod state;

pub use pipeline::{ClassificationPipeline, PipelineError, RawImage};
pub use response::ClassifyResponse;
