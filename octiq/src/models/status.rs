use serde::{Deserialize, Serialize};

/// Runtime status of a model - computed, not stored.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelStatus {
    /// Do the model bytes exist in the asset store?
    pub is_cached: bool,
    /// Size of the cached artifact in bytes (0 when absent)
    pub cached_bytes: u64,
    /// Is the model currently loaded in memory?
    pub is_loaded: bool,
}
