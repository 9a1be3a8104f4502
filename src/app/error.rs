use thiserror::Error;

use crate::config::ConfigError;
use crate::store::StorageError;

#[derive(Error, Debug)]
pub enum NotifierError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Feed index error: {0}")]
    FeedIndex(String),

    #[error("Marker not found in document: {0}")]
    MarkerNotFound(String),

    #[error("Fetch of {url} timed out after {secs}s")]
    Timeout { url: String, secs: u64 },

    #[error("Push configuration error: {0}")]
    Push(String),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, NotifierError>;
