pub mod backend;
pub mod catalog;
pub mod classifier;
pub mod error;
pub mod gate;
pub mod resolver;

// Re-export commonly used types for convenience
pub use backend::{ExecutionProvider, InferenceBackend};
#[cfg(feature = "ort-backend")]
pub use backend::ort::OrtBackend;
pub use catalog::{CatalogError, LabelCatalog};
pub use classifier::{Classifier, OutputActivation, PredictionResult};
pub use error::InferenceError;
pub use gate::{ConfidenceDecision, ConfidenceGate, DEFAULT_CONFIDENCE_THRESHOLD, GateError};
pub use resolver::{LabelResolver, UNKNOWN_LABEL};
