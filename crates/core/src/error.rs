//! Error types shared across the warden crates

/// Standard result type for session operations
pub type SessionResult<T> = std::result::Result<T, SessionError>;

/// Errors produced by the session lifecycle
#[derive(Debug, Clone, thiserror::Error)]
pub enum SessionError {
    #[error("invalid expiresIn value: {value}")]
    InvalidExpiry { value: String },

    #[error("login rejected: {message}")]
    LoginFailed { message: String },

    #[error("session expired: {message}")]
    SessionExpired { message: String },

    #[error("auth backend error: {message}")]
    Backend { message: String },

    #[error("invalid configuration: {message}")]
    Config { message: String },
}

impl SessionError {
    /// Create an invalid-expiry error from the offending value
    pub fn invalid_expiry(value: impl Into<String>) -> Self {
        Self::InvalidExpiry {
            value: value.into(),
        }
    }

    /// Create a login-rejected error
    pub fn login_failed(message: impl Into<String>) -> Self {
        Self::LoginFailed {
            message: message.into(),
        }
    }

    /// Create a session-expired error
    pub fn session_expired(message: impl Into<String>) -> Self {
        Self::SessionExpired {
            message: message.into(),
        }
    }

    /// Create a backend transport error
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend {
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }
}
