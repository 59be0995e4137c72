//! I/O error types.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for I/O operations.
pub type Result<T> = std::result::Result<T, Error>;

/// I/O error types.
#[derive(Error, Debug)]
pub enum Error {
    /// File I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// An image stack could not be loaded.
    #[error("failed to load image stack {path}: {reason}")]
    ImageLoad { path: PathBuf, reason: String },

    /// Invalid file format.
    #[error("invalid file format: {0}")]
    InvalidFormat(String),

    /// A cache archive exists but could not be parsed.
    #[error("corrupt cache archive {path}: {reason}")]
    CacheCorrupt { path: PathBuf, reason: String },

    /// Core library error.
    #[error("core error: {0}")]
    Core(#[from] fluorsep_core::Error),
}
