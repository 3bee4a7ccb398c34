//! Persistent storage
//!
//! This module handles model files on disk and the persisted translator configuration.

pub mod file_store;
pub mod huggingface;
pub mod settings;

#[cfg(test)]
pub(crate) mod test_server;

use std::path::PathBuf;

use directories::ProjectDirs;

/// Errors from storage operations
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Could not determine the data directory")]
    NoDataDir,
    #[error("Invalid model URL: {0}")]
    InvalidUrl(String),
    #[error("Invalid model filename: {0:?}")]
    InvalidFilename(String),
    #[error("Network error: {0}")]
    Network(String),
    #[error("Download failed with status: {0}")]
    HttpStatus(u16),
    #[error("Download incomplete: got {got} bytes, expected {expected}")]
    Incomplete { got: u64, expected: u64 },
    #[error("Checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },
}

/// Application data directory (settings and models live under it)
pub fn get_data_dir() -> Result<PathBuf, StorageError> {
    ProjectDirs::from("com", "uniterra", "uniterra")
        .map(|dirs| dirs.data_dir().to_path_buf())
        .ok_or(StorageError::NoDataDir)
}

/// Directory where downloaded models are kept
pub fn models_dir() -> Result<PathBuf, StorageError> {
    Ok(get_data_dir()?.join("models"))
}
