use crate::catalog::LabelCatalog;
use std::sync::Arc;

/// Label returned for class ids the catalog does not know.
pub const UNKNOWN_LABEL: &str = "Tidak diketahui";

/// Turns model class ids into display labels.
#[derive(Debug, Clone)]
pub struct LabelResolver {
    catalog: Arc<LabelCatalog>,
}

impl LabelResolver {
    pub fn new(catalog: Arc<LabelCatalog>) -> Self {
        Self { catalog }
    }

    /// Look up `class_id`, falling back to [`UNKNOWN_LABEL`] when the model
    /// and the class index table disagree. Never fails.
    pub fn resolve(&self, class_id: usize) -> &str {
        match self.catalog.get(class_id) {
            Some(label) => label,
            None => Self::unknown(class_id),
        }
    }

    fn unknown(class_id: usize) -> &'static str {
        tracing::warn!(
            class_id,
            "Class id missing from label catalog, using fallback label"
        );
        UNKNOWN_LABEL
    }

    /// Class ids the model can emit that would resolve to the fallback.
    pub fn missing_ids(&self, num_classes: usize) -> Vec<usize> {
        self.catalog.missing_ids(num_classes)
    }

    pub fn catalog(&self) -> &LabelCatalog {
        &self.catalog
    }
}
