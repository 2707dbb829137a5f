//! Error types for ChurnWatch

use thiserror::Error;

use crate::scoring::ScoringError;

/// Result type alias using ChurnWatch's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for ChurnWatch operations
#[derive(Error, Debug)]
pub enum Error {
    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Migration error
    #[error("Migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// Redis error
    #[error("Redis error: {0}")]
    Redis(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// Not found error
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// Conflicting write (duplicate key)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Authentication error
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// No churn model is loaded
    #[error("Model unavailable: {0}")]
    ModelUnavailable(String),

    /// Scoring a single customer failed
    #[error("Scoring error: {0}")]
    Scoring(#[from] ScoringError),

    /// Another monitoring run holds the run lock
    #[error("A monitoring run is already in progress")]
    RunInProgress,

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Create a not found error
    pub fn not_found(entity: impl Into<String>, id: impl ToString) -> Self {
        Self::NotFound {
            entity: entity.into(),
            id: id.to_string(),
        }
    }

    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a config error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Create a model-unavailable error
    pub fn model_unavailable(msg: impl Into<String>) -> Self {
        Self::ModelUnavailable(msg.into())
    }
}

impl From<config::ConfigError> for Error {
    fn from(err: config::ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}
