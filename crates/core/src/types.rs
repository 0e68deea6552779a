use crate::error::{SessionError, SessionResult};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Token grant returned by the Auth API's login and refresh endpoints
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenGrant {
    /// Opaque bearer credential for API calls
    pub access_token: String,
    /// Relative lifetime: bare digits or a `s` suffix are seconds, `m` minutes
    pub expires_in: String,
}

impl TokenGrant {
    /// Parsed lifetime of the granted token
    pub fn lifetime(&self) -> SessionResult<Duration> {
        parse_expires_in(&self.expires_in)
    }
}

/// Parse a server-supplied relative lifetime (`"300"`, `"30s"`, `"5m"`)
pub fn parse_expires_in(value: &str) -> SessionResult<Duration> {
    let (digits, unit_seconds) = match value.as_bytes().last() {
        Some(b'm') => (&value[..value.len() - 1], 60),
        Some(b's') => (&value[..value.len() - 1], 1),
        _ => (value, 1),
    };

    let count: u32 = digits
        .parse()
        .map_err(|_| SessionError::invalid_expiry(value))?;

    Ok(Duration::seconds(i64::from(count) * unit_seconds))
}

/// Credentials held for the current session
///
/// The expiry is derived once when the grant is installed and never
/// recomputed. A token adopted from another tab may arrive without one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub access_token: String,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Authentication state published by the session facade
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Silent resume in progress; protected views must render nothing
    Initializing,
    /// Resume settled; `authenticated` reflects credential presence
    Ready { authenticated: bool },
}

impl SessionState {
    /// Whether the initial resume attempt has settled
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready { .. })
    }

    /// Whether the session is ready and holds credentials
    pub fn is_authenticated(&self) -> bool {
        matches!(
            self,
            Self::Ready {
                authenticated: true
            }
        )
    }
}
