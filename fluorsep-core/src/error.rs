//! Error types for fluorsep-core.

use thiserror::Error;

/// Result type alias for fluorsep operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for fluorsep operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid or contradictory configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// Malformed ROI geometry or mismatched array shape.
    #[error("shape error: {0}")]
    Shape(String),
}
