use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unsupported: {0}")]
    Unsupported(String),
}

/// Errors raised by the content engine.
///
/// Absence on reads is not an error: lookups return `Ok(None)`.
#[derive(Error, Debug)]
pub enum ContentError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Not supported: {0}")]
    NotSupported(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    #[error(transparent)]
    Storage(#[from] StorageError),
}
