//! Error types shared across the NEMWEB crates

use thiserror::Error;

/// Result type alias for shared NEMWEB operations
pub type Result<T> = std::result::Result<T, NemwebError>;

/// Main error type for NEMWEB
#[derive(Error, Debug)]
pub enum NemwebError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Unknown network: {0}")]
    UnknownNetwork(String),

    #[error("Unknown bucket size: {0}")]
    UnknownBucketSize(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Parse error: {0}")]
    Parse(String),
}
