//! Error types for YASS

use thiserror::Error;

/// Result type alias for YASS operations
pub type Result<T> = std::result::Result<T, YassError>;

/// Main error type shared by the YASS crates
#[derive(Error, Debug)]
pub enum YassError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid job state: {0}")]
    InvalidState(String),

    #[error("Invalid job kind: {0}")]
    InvalidKind(String),

    #[error("Configuration error: {0}")]
    Config(String),
}
