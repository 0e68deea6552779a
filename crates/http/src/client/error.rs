//! Client error types

use thiserror::Error;

/// Errors returned by the HTTP clients
#[derive(Debug, Error)]
pub enum ClientError {
    /// Network or request error
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// Authentication failed (401), including a 401 on an already-replayed
    /// request — those propagate without a second refresh
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Bad request (400)
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Forbidden (403)
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Any other non-success status
    #[error("server error {status}: {message}")]
    ServerError { status: u16, message: String },

    /// Invalid client configuration
    #[error("invalid configuration: {0}")]
    Configuration(String),
}

impl ClientError {
    /// Map an HTTP status code to an error
    pub fn from_status(status: reqwest::StatusCode, message: String) -> Self {
        match status.as_u16() {
            400 => Self::BadRequest(message),
            401 => Self::AuthenticationFailed(message),
            403 => Self::Forbidden(message),
            _ => Self::ServerError {
                status: status.as_u16(),
                message,
            },
        }
    }
}
