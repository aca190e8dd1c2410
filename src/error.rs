//! Error types for relmap.

use thiserror::Error;

/// The main error type for relmap operations.
#[derive(Debug, Error)]
pub enum RelmapError {
    /// An entity declaration is invalid. Raised while building a handler.
    #[error("Metadata error in '{entity}': {message}")]
    Metadata { entity: String, message: String },

    /// A statement could not be rendered.
    #[error("Build error: {0}")]
    Build(String),

    /// Driver, network or constraint failure.
    #[error("Execution error: {0}")]
    Execution(String),

    /// A row could not be turned into an entity.
    #[error("Hydration error: {0}")]
    Hydration(String),

    /// Connection error.
    #[error("Connection error: {0}")]
    Connection(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// JSON encoding or decoding failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl RelmapError {
    /// Create a metadata error for the given entity table.
    pub fn metadata(entity: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Metadata {
            entity: entity.into(),
            message: message.into(),
        }
    }

    pub fn build(message: impl Into<String>) -> Self {
        Self::Build(message.into())
    }

    pub fn execution(message: impl Into<String>) -> Self {
        Self::Execution(message.into())
    }

    pub fn hydration(message: impl Into<String>) -> Self {
        Self::Hydration(message.into())
    }
}

impl From<sqlx::Error> for RelmapError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Configuration(e) => Self::Config(e.to_string()),
            sqlx::Error::Io(e) => Self::Connection(e.to_string()),
            sqlx::Error::Tls(e) => Self::Connection(e.to_string()),
            other @ (sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed) => {
                Self::Connection(other.to_string())
            }
            other => Self::Execution(other.to_string()),
        }
    }
}

/// Result type alias for relmap operations.
pub type RelmapResult<T> = Result<T, RelmapError>;
