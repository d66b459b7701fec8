use derive_more::From;

use crate::config::ConfigError;
use crate::models::SessionError;

/// Application-level error: every leaf error fans in here at the CLI
/// boundary.
#[derive(Debug, From)]
pub enum Error {
    #[from]
    Download(octiq_cache::DownloadError),

    #[from]
    Storage(octiq_cache::StorageError),

    #[from]
    Proxy(octiq_cache::ProxyError),

    #[from]
    Session(SessionError),

    #[from]
    Config(ConfigError),

    #[from]
    Image(image::ImageError),

    #[from]
    Io(std::io::Error),

    #[from]
    Json(serde_json::Error),

    UnknownModel(String),

    NoModelSelected,
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Download(e) => write!(f, "Download failed: {}", e),
            Error::Storage(e) => write!(f, "Storage error: {}", e),
            Error::Proxy(e) => write!(f, "Proxy cache error: {}", e),
            Error::Session(e) => write!(f, "Inference error: {}", e),
            Error::Config(e) => write!(f, "Config error: {}", e),
            Error::Image(e) => write!(f, "Image error: {}", e),
            Error::Io(e) => write!(f, "IO error: {}", e),
            Error::Json(e) => write!(f, "JSON error: {}", e),
            Error::UnknownModel(name) => {
                write!(f, "Unknown model '{}' (see `octiq models` for the list)", name)
            }
            Error::NoModelSelected => {
                write!(f, "No model specified; pass --model once to select one")
            }
        }
    }
}

impl std::error::Error for Error {}

pub type Result<T> = std::result::Result<T, Error>;
