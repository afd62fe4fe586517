//! Error types for the core library.

use thiserror::Error;

use crate::transport::TransportError;

/// Errors that can occur in core operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Rule configuration is invalid.
    #[error("Configuration error: {0}")]
    Config(String),

    /// TOML configuration could not be parsed.
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A glob pattern could not be compiled.
    #[error("Invalid pattern '{pattern}': {source}")]
    Pattern {
        /// The offending glob.
        pattern: String,
        /// Underlying regex error.
        source: regex::Error,
    },

    /// A TTL duration string is not understood.
    #[error("Invalid duration '{0}': expected '<n>d', '<n>h' or '<n>w'")]
    InvalidDuration(String),

    /// The transport failed in a way that ends the run.
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;
