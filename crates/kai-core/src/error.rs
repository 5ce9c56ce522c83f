use thiserror::Error;

/// Top-level error type for the Kai system.
///
/// Each variant corresponds to a subsystem. Subsystem crates define their
/// own error types and convert into or out of `KaiError` so that the `?`
/// operator works across crate boundaries.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum KaiError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Gateway error: {0}")]
    Gateway(String),

    #[error("API error: {0}")]
    Api(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<toml::de::Error> for KaiError {
    fn from(err: toml::de::Error) -> Self {
        KaiError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for KaiError {
    fn from(err: toml::ser::Error) -> Self {
        KaiError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for KaiError {
    fn from(err: serde_json::Error) -> Self {
        KaiError::Serialization(err.to_string())
    }
}

/// A specialized `Result` type for Kai operations.
pub type Result<T> = std::result::Result<T, KaiError>;
