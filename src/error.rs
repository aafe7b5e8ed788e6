use thiserror::Error;

/// Main error type for relquery
#[derive(Error, Debug)]
pub enum RelqueryError {
    /// Transport-level HTTP errors (connect, timeout, body decode)
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-success response from the catalog API
    #[error("API error {status}: {message}")]
    Api {
        status: u16,
        message: String,
        /// External ids the catalog reported as unknown, if any
        missing: Vec<String>,
    },

    /// JSON (de)serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl RelqueryError {
    /// Build an API error without a missing-id list.
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        RelqueryError::Api {
            status,
            message: message.into(),
            missing: Vec::new(),
        }
    }
}

/// Convenient Result type using RelqueryError
pub type Result<T> = std::result::Result<T, RelqueryError>;
