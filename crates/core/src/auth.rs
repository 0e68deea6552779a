//! Seams between the session manager, the Auth API, and the HTTP layer

use crate::error::SessionResult;
use crate::types::TokenGrant;
use async_trait::async_trait;

/// Remote Auth API surface
///
/// `refresh` carries no request body; the long-lived refresh credential
/// rides in an httponly cookie the transport sends automatically.
#[async_trait]
pub trait AuthBackend: Send + Sync {
    async fn login(&self, email: &str, password: &str) -> SessionResult<TokenGrant>;
    async fn refresh(&self) -> SessionResult<TokenGrant>;
    async fn logout(&self) -> SessionResult<()>;
}

/// What the HTTP interceptor needs from the session layer
#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// Current access token, if any. Absence is not an error; the request
    /// proceeds unauthenticated.
    fn access_token(&self) -> Option<String>;

    /// Called after a 401. Performs the single-flight refresh, or joins one
    /// already in flight, and returns the fresh token. Failure is
    /// session-terminating for the caller.
    async fn refresh_after_unauthorized(&self) -> SessionResult<String>;
}

// Mock implementations for testing
#[cfg(feature = "tests")]
pub mod mock {
    use super::*;
    use mockall::mock;

    mock! {
        pub AuthBackend {}

        #[async_trait]
        impl AuthBackend for AuthBackend {
            async fn login(&self, email: &str, password: &str) -> SessionResult<TokenGrant>;
            async fn refresh(&self) -> SessionResult<TokenGrant>;
            async fn logout(&self) -> SessionResult<()>;
        }
    }

    mock! {
        pub TokenProvider {}

        #[async_trait]
        impl TokenProvider for TokenProvider {
            fn access_token(&self) -> Option<String>;
            async fn refresh_after_unauthorized(&self) -> SessionResult<String>;
        }
    }
}
