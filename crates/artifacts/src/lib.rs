pub mod error;
pub mod naming;
pub mod store;

pub use error::StorageError;
pub use naming::{AudioKind, sanitize_filename};
pub use store::{ArtifactDirs, ArtifactStore, StoredArtifact};
