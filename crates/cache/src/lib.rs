//! Durable caching for large model assets.
//!
//! This crate keeps ONNX models (and the static assets around them) usable
//! offline: a chunked downloader with per-chunk progress, a durable
//! URL-keyed asset store, a cache-aside loader combining the two, and a
//! generational proxy cache for everything else the application shell
//! fetches.
//!
//! # Example
//!
//! ```no_run
//! use octiq_cache::{CachingLoader, ChunkedDownloader, FsAssetStore};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = FsAssetStore::new("/tmp/octiq/models")?;
//!     let loader = CachingLoader::new(store, ChunkedDownloader::new());
//!
//!     let bytes = loader
//!         .load("https://models.example/image_quality/GCIPL.onnx", &|fraction: f64| {
//!             println!("{:>3.0}%", fraction * 100.0);
//!         })
//!         .await?;
//!     println!("loaded {} bytes", bytes.len());
//!     Ok(())
//! }
//! ```

mod buffer;
mod download;
mod loader;
mod progress;
mod proxy;
mod store;

pub use buffer::ChunkBuffer;
pub use download::{ChunkedDownloader, DownloadError};
pub use loader::CachingLoader;
pub use progress::{NoProgress, ProgressObserver};
pub use proxy::{AssetProxyCache, ProxyError, ProxyFetch, ProxyResponse, ResponseSource};
pub use store::{AssetStore, FsAssetStore, StorageError};
