use std::io;
use std::path::PathBuf;

use async_trait::async_trait;
use log::debug;
use sha2::{Digest, Sha256};
use thiserror::Error;

/// The persistent store is unavailable or rejected a write.
///
/// Loads degrade to session-only use of freshly downloaded bytes when this
/// occurs; it is never surfaced as a user-facing failure.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("storage io error: {0}")]
    Io(#[from] io::Error),
}

/// Durable key-value store for downloaded model bytes, keyed by source URL.
///
/// `get` on a key never written returns `None` rather than an error. `put`
/// replaces any prior value for the key. `clear` destroys every key at once;
/// there is no single-entry removal.
#[async_trait]
pub trait AssetStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError>;
    async fn put(&self, key: &str, bytes: &[u8]) -> Result<(), StorageError>;
    async fn clear(&self) -> Result<(), StorageError>;
}

/// [`AssetStore`] backed by a directory of blob files.
///
/// Each key is stored under the hex SHA-256 of the key string, so arbitrary
/// URLs map to safe file names. Writes go to a `.partial` sibling first and
/// are renamed into place, so a crash mid-write never leaves a truncated
/// blob under the final name.
pub struct FsAssetStore {
    root: PathBuf,
}

impl FsAssetStore {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    fn blob_path(&self, key: &str) -> PathBuf {
        self.root
            .join(format!("{:x}", Sha256::digest(key.as_bytes())))
    }

    pub fn contains(&self, key: &str) -> bool {
        self.blob_path(key).is_file()
    }

    /// Size in bytes of the stored blob for `key`, if present.
    pub fn len(&self, key: &str) -> Option<u64> {
        std::fs::metadata(self.blob_path(key)).ok().map(|m| m.len())
    }
}

#[async_trait]
impl AssetStore for FsAssetStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        match tokio::fs::read(self.blob_path(key)).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn put(&self, key: &str, bytes: &[u8]) -> Result<(), StorageError> {
        tokio::fs::create_dir_all(&self.root).await?;
        let path = self.blob_path(key);
        let partial = path.with_extension("partial");
        tokio::fs::write(&partial, bytes).await?;
        tokio::fs::rename(&partial, &path).await?;
        debug!("stored {} bytes for {}", bytes.len(), key);
        Ok(())
    }

    async fn clear(&self) -> Result<(), StorageError> {
        match tokio::fs::remove_dir_all(&self.root).await {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        tokio::fs::create_dir_all(&self.root).await?;
        debug!("asset store cleared");
        Ok(())
    }
}
