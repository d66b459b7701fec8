use std::sync::{Arc, Mutex};

use log::{debug, error, info};

use super::pipeline::PipelineKind;
use super::session::{QualitySession, SessionError};

struct LoadedSession {
    name: String,
    session: Arc<QualitySession>,
}

/// Manages the currently loaded classifier in memory.
///
/// Only one model can be loaded at a time. Loading a new model
/// automatically unloads the previous one.
pub struct ModelLoader {
    current: Mutex<Option<LoadedSession>>,
    loading: Mutex<Option<String>>,
}

impl ModelLoader {
    pub fn new() -> Self {
        Self {
            current: Mutex::new(None),
            loading: Mutex::new(None),
        }
    }

    /// Build a session for `name` from model bytes and make it current.
    ///
    /// Returns the existing session if `name` is already loaded. Session
    /// construction is CPU-intensive and runs on a blocking task.
    pub async fn load(
        &self,
        name: &str,
        bytes: Vec<u8>,
        kind: PipelineKind,
    ) -> Result<Arc<QualitySession>, SessionError> {
        if let Some(session) = self.session_for(name) {
            info!("model '{}' is already loaded", name);
            return Ok(session);
        }

        {
            let loading = self.loading.lock().unwrap();
            if let Some(in_progress) = loading.as_ref() {
                return Err(SessionError::Busy {
                    loading: in_progress.clone(),
                });
            }
        }

        {
            let mut loading = self.loading.lock().unwrap();
            *loading = Some(name.to_string());
        }

        info!("loading model '{}' ({} bytes)", name, bytes.len());

        // Unload current model first
        self.unload();

        let result =
            tokio::task::spawn_blocking(move || QualitySession::from_bytes(&bytes, kind.build()))
                .await;

        {
            let mut loading = self.loading.lock().unwrap();
            *loading = None;
        }

        match result {
            Ok(Ok(session)) => {
                let session = Arc::new(session);
                let mut current = self.current.lock().unwrap();
                *current = Some(LoadedSession {
                    name: name.to_string(),
                    session: Arc::clone(&session),
                });
                info!("model '{}' loaded successfully", name);
                Ok(session)
            }
            Ok(Err(e)) => {
                error!("failed to load model '{}': {}", name, e);
                Err(e)
            }
            Err(e) => {
                error!("task panicked while loading model '{}': {}", name, e);
                Err(SessionError::Init(format!(
                    "task panicked while loading model: {}",
                    e
                )))
            }
        }
    }

    /// Unload the currently loaded model (frees memory).
    pub fn unload(&self) {
        let mut current = self.current.lock().unwrap();
        if let Some(loaded) = current.take() {
            info!("unloading model '{}'", loaded.name);
        } else {
            debug!("no model loaded to unload");
        }
    }

    /// Check if a specific model is currently loaded.
    pub fn is_model_loaded(&self, name: &str) -> bool {
        self.current
            .lock()
            .unwrap()
            .as_ref()
            .map(|m| m.name == name)
            .unwrap_or(false)
    }

    /// Name of the currently loaded model.
    pub fn loaded_model_name(&self) -> Option<String> {
        self.current
            .lock()
            .unwrap()
            .as_ref()
            .map(|m| m.name.clone())
    }

    fn session_for(&self, name: &str) -> Option<Arc<QualitySession>> {
        self.current
            .lock()
            .unwrap()
            .as_ref()
            .filter(|m| m.name == name)
            .map(|m| Arc::clone(&m.session))
    }
}

impl Default for ModelLoader {
    fn default() -> Self {
        Self::new()
    }
}
