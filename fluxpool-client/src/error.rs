//! Client error type.

use thiserror::Error;

/// Error type used by InfluxDB clients.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ClientError {
    /// Server address could not be parsed.
    #[error("Invalid server address: {0}")]
    InvalidAddress(String),
    /// Server URL uses a scheme other than `http` or `https`.
    #[error("Unsupported protocol scheme: {0}, your address must start with http:// or https://")]
    UnsupportedScheme(String),
    /// Point failed validation.
    #[error("Invalid point: {0}")]
    InvalidPoint(&'static str),
    /// HTTP client error.
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),
    /// JSON encoding or decoding error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    /// Socket I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// Server responded with an error.
    #[error("Server error ({status}): {message}")]
    Server {
        /// HTTP status code.
        status: u16,
        /// Error message reported by the server.
        message: String,
    },
    /// Queries can't be sent over datagram transport.
    #[error("Querying via UDP is not supported")]
    QueryUnsupported,
}

impl ClientError {
    /// Generate new [`ClientError::Server`] error.
    pub fn server(status: u16, message: impl Into<String>) -> Self {
        Self::Server {
            status,
            message: message.into(),
        }
    }
}
