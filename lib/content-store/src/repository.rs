//! Backend connection traits.
//!
//! - `ConnectionConfig`: how to reach a backend
//! - `RepositoryConnection`: connect and initialize (run migrations)

use async_trait::async_trait;

use crate::StorageError;

/// Connection configuration for database backends.
#[derive(Debug, Clone)]
pub enum ConnectionConfig {
    /// Connect using a database URL string.
    Url(String),
}

impl From<&str> for ConnectionConfig {
    fn from(url: &str) -> Self {
        ConnectionConfig::Url(url.to_string())
    }
}

impl From<String> for ConnectionConfig {
    fn from(url: String) -> Self {
        ConnectionConfig::Url(url)
    }
}

impl From<&String> for ConnectionConfig {
    fn from(url: &String) -> Self {
        ConnectionConfig::Url(url.clone())
    }
}

/// Trait for database connection and initialization.
///
/// This trait abstracts the database connection lifecycle, allowing
/// different backends (PostgreSQL, in-process memory) to implement
/// their own connection and schema logic.
#[async_trait]
pub trait RepositoryConnection: Sized + Send + Sync {
    /// Connect to the database using the provided configuration.
    async fn connect(config: impl Into<ConnectionConfig> + Send) -> Result<Self, StorageError>;

    /// Initialize the database schema (run migrations).
    async fn initialize(&self) -> Result<(), StorageError>;
}
