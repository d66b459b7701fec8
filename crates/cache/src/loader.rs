use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use log::{debug, info, warn};

use crate::download::{ChunkedDownloader, DownloadError};
use crate::progress::ProgressObserver;
use crate::store::AssetStore;

/// Cache-aside model loading: consult the store, download on miss, persist
/// the result for next time.
pub struct CachingLoader<S> {
    store: S,
    downloader: ChunkedDownloader,
    in_flight: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl<S: AssetStore> CachingLoader<S> {
    pub fn new(store: S, downloader: ChunkedDownloader) -> Self {
        Self {
            store,
            downloader,
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Load the bytes for `url`, downloading them if the store has no copy.
    ///
    /// A store hit returns immediately and never invokes `observer`.
    /// Concurrent loads of one URL share a single download: the first caller
    /// streams it and reports progress, the rest wait and read the stored
    /// copy. A persistence failure after download is logged; the bytes are
    /// still returned and usable for the current session.
    pub async fn load(
        &self,
        url: &str,
        observer: &dyn ProgressObserver,
    ) -> Result<Vec<u8>, DownloadError> {
        if let Some(bytes) = self.lookup(url).await {
            debug!("store hit for {}", url);
            return Ok(bytes);
        }

        let gate = self.gate(url);
        let _guard = gate.lock().await;

        // Whoever held the gate before us may have stored the bytes already.
        if let Some(bytes) = self.lookup(url).await {
            debug!("store hit for {} after waiting on in-flight download", url);
            return Ok(bytes);
        }

        info!("downloading {}", url);
        let bytes = self.downloader.download(url, observer).await?;

        if let Err(e) = self.store.put(url, &bytes).await {
            warn!("failed to persist {} ({} bytes): {}", url, bytes.len(), e);
        }

        self.in_flight.lock().unwrap().remove(url);
        Ok(bytes)
    }

    async fn lookup(&self, url: &str) -> Option<Vec<u8>> {
        match self.store.get(url).await {
            Ok(found) => found,
            Err(e) => {
                warn!("store lookup for {} failed, treating as miss: {}", url, e);
                None
            }
        }
    }

    fn gate(&self, url: &str) -> Arc<tokio::sync::Mutex<()>> {
        self.in_flight
            .lock()
            .unwrap()
            .entry(url.to_string())
            .or_default()
            .clone()
    }
}
