//! Pipeline error types.

use thiserror::Error;

/// Result type for pipeline operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Pipeline error types.
#[derive(Error, Debug)]
pub enum Error {
    /// Core library error.
    #[error("core error: {0}")]
    Core(#[from] fluorsep_core::Error),

    /// I/O layer error.
    #[error("I/O error: {0}")]
    Io(#[from] fluorsep_io::Error),

    /// Worker pool construction failure.
    #[error("worker pool error: {0}")]
    Pool(String),
}

impl Error {
    pub(crate) fn config(message: impl Into<String>) -> Self {
        Self::Core(fluorsep_core::Error::Config(message.into()))
    }
}
