use serde::{Deserialize, Serialize};

use super::pipeline::PipelineKind;

/// Bucket the published model artifacts are served from.
pub const DEFAULT_BASE_URL: &str =
    "https://pub-9133bb6240c146bda04d936a663ab7bc.r2.dev/image_quality";

/// Static information about a quality classifier available for download.
/// This is hardcoded and never changes at runtime.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelCatalogEntry {
    /// Unique identifier, no spaces (e.g., "GCIPL")
    pub name: String,
    /// Human-readable name (e.g., "GCIPL Thickness Map")
    pub display_name: String,
    /// Description of the scan type the model grades
    pub description: String,
    /// Artifact file name under the registry's base URL (e.g., "GCIPL.onnx")
    pub artifact: String,
    /// Preprocessing and label recipe for this model
    pub pipeline: PipelineKind,
}

/// The model catalog bound to the base URL its artifacts live under.
#[derive(Debug, Clone)]
pub struct ModelRegistry {
    base_url: String,
    entries: Vec<ModelCatalogEntry>,
}

impl ModelRegistry {
    /// Registry over the published artifact bucket.
    pub fn new() -> Self {
        Self::with_base_url(DEFAULT_BASE_URL)
    }

    /// Registry over a mirror. A trailing slash on the base URL is tolerated.
    pub fn with_base_url(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            entries: model_catalog(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn entries(&self) -> &[ModelCatalogEntry] {
        &self.entries
    }

    /// Look up a catalog entry by its unique name.
    pub fn find(&self, name: &str) -> Option<&ModelCatalogEntry> {
        self.entries.iter().find(|e| e.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.find(name).is_some()
    }

    /// Full download URL for an entry's artifact.
    pub fn url_for(&self, entry: &ModelCatalogEntry) -> String {
        format!("{}/{}", self.base_url, entry.artifact)
    }
}

impl Default for ModelRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Hardcoded catalog of the published OCT quality classifiers.
/// Means/stds and label order differ per model; see the pipeline variants.
pub fn model_catalog() -> Vec<ModelCatalogEntry> {
    vec![
        ModelCatalogEntry {
            name: "GCIPL".into(),
            display_name: "GCIPL Thickness Map".into(),
            description: "Ganglion cell-inner plexiform layer thickness map quality".into(),
            artifact: "GCIPL.onnx".into(),
            pipeline: PipelineKind::Gcipl,
        },
        ModelCatalogEntry {
            name: "Ang3x3".into(),
            display_name: "Angiography 3x3".into(),
            description: "3x3 mm OCT angiography en-face scan quality".into(),
            artifact: "Ang3x3.onnx".into(),
            pipeline: PipelineKind::Ang3x3,
        },
        ModelCatalogEntry {
            name: "HD21".into(),
            display_name: "HD 21 Line".into(),
            description: "HD 21-line raster B-scan quality".into(),
            artifact: "HD21.onnx".into(),
            pipeline: PipelineKind::Hd21,
        },
        ModelCatalogEntry {
            name: "ONH4.5".into(),
            display_name: "ONH 4.5".into(),
            description: "4.5 mm optic nerve head cube scan quality".into(),
            artifact: "ONH4.5.onnx".into(),
            pipeline: PipelineKind::Onh45,
        },
    ]
}
