use std::collections::{BTreeMap, HashMap};
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("Failed to read class index table {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Invalid class index table {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Class id {id} is assigned to both {first:?} and {second:?}")]
    DuplicateId {
        id: usize,
        first: String,
        second: String,
    },

    #[error("Class index table is empty")]
    Empty,
}

/// Mapping from model output index to denomination label.
///
/// Built once from a `{"<label>": <class id>}` table (the Keras
/// `class_indices` export) and inverted for lookups by class id.
#[derive(Debug, Clone)]
pub struct LabelCatalog {
    labels: HashMap<usize, String>,
}

impl LabelCatalog {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, CatalogError> {
        let path = path.as_ref();

        let raw = std::fs::read_to_string(path).map_err(|source| CatalogError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let class_indices: BTreeMap<String, usize> =
            serde_json::from_str(&raw).map_err(|source| CatalogError::Parse {
                path: path.to_path_buf(),
                source,
            })?;

        let catalog = Self::from_class_indices(class_indices)?;
        tracing::info!(
            path = %path.display(),
            classes = catalog.len(),
            "Loaded label catalog"
        );
        Ok(catalog)
    }

    pub fn from_class_indices(
        class_indices: impl IntoIterator<Item = (String, usize)>,
    ) -> Result<Self, CatalogError> {
        let mut labels = HashMap::new();

        for (label, id) in class_indices {
            if let Some(first) = labels.get(&id) {
                return Err(CatalogError::DuplicateId {
                    id,
                    first: String::clone(first),
                    second: label,
                });
            }
            labels.insert(id, label);
        }

        if labels.is_empty() {
            return Err(CatalogError::Empty);
        }

        Ok(Self { labels })
    }

    pub fn get(&self, class_id: usize) -> Option<&str> {
        self.labels.get(&class_id).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Class ids in `0..num_classes` that have no label.
    pub fn missing_ids(&self, num_classes: usize) -> Vec<usize> {
        (0..num_classes)
            .filter(|id| !self.labels.contains_key(id))
            .collect()
    }
}
