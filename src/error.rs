use thiserror::Error;

/// Main error type for opsgraph
#[derive(Error, Debug)]
pub enum OpsgraphError {
    /// Database-related errors
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// File system I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration errors, including rejected traversal options
    #[error("Configuration error: {0}")]
    Config(String),

    /// Entity, graph node or record not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Malformed or undecodable deep link
    #[error("Invalid deep link: {0}")]
    InvalidDeepLink(String),

    /// Remote action call returned a non-success status
    #[error("Action execution failed with status {status}: {message}")]
    ActionExecution {
        status: u16,
        message: String,
    },

    /// Transport-level HTTP errors
    #[error("HTTP error: {0}")]
    Http(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Convenient Result type using OpsgraphError
pub type Result<T> = std::result::Result<T, OpsgraphError>;
