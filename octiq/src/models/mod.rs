mod catalog;
mod loader;
mod pipeline;
mod session;
mod status;

pub use catalog::{model_catalog, ModelCatalogEntry, ModelRegistry, DEFAULT_BASE_URL};
pub use loader::ModelLoader;
pub use pipeline::{PipelineError, PipelineKind, Prediction, QualityPipeline, INPUT_SIZE};
pub use session::{QualitySession, RunOutput, SessionError};
pub use status::ModelStatus;

use serde::{Deserialize, Serialize};

/// Combined view of one catalog entry and its runtime status.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelInfo {
    // From catalog
    pub name: String,
    pub display_name: String,
    pub description: String,
    pub artifact: String,
    pub pipeline: PipelineKind,

    // From status
    pub is_cached: bool,
    pub cached_bytes: u64,
    pub is_loaded: bool,
}

impl ModelInfo {
    pub fn from_catalog_and_status(catalog: &ModelCatalogEntry, status: &ModelStatus) -> Self {
        Self {
            name: catalog.name.clone(),
            display_name: catalog.display_name.clone(),
            description: catalog.description.clone(),
            artifact: catalog.artifact.clone(),
            pipeline: catalog.pipeline,
            is_cached: status.is_cached,
            cached_bytes: status.cached_bytes,
            is_loaded: status.is_loaded,
        }
    }
}
