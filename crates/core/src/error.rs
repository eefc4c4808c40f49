use std::io;
use std::path::PathBuf;

/// Errors that can occur during fredbuild operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IO error: {0}")]
    IoError(#[from] io::Error),

    #[error("Projects root not found: {}", .0.display())]
    ProjectsRootMissing(PathBuf),

    #[error("Download error: {0}")]
    DownloadError(String),

    #[error("Archive error: {0}")]
    ArchiveError(String),

    #[error("Patch error: {0}")]
    PatchError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

/// Result type alias for fredbuild operations
pub type Result<T> = std::result::Result<T, Error>;
