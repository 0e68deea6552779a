//! Auth API client
//!
//! Implements [`AuthBackend`] over HTTP. The refresh credential is an
//! httponly cookie: `login` responses set it, and the client's cookie jar
//! sends it back on `refresh` and `logout` the way a browser would. These
//! calls go out without a bearer header and never enter the 401-replay
//! pipeline.

use super::error::ClientError;
use crate::types::LoginRequest;
use async_trait::async_trait;
use reqwest::{Client, ClientBuilder};
use tracing::debug;
use warden_core::{AuthBackend, SessionError, SessionResult, TokenGrant};

/// Client for the Auth API endpoints
#[derive(Clone)]
pub struct AuthClient {
    client: Client,
    base_url: String,
}

impl AuthClient {
    /// Create a client for the Auth API at `base_url`
    pub fn new(base_url: impl Into<String>) -> Result<Self, ClientError> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        let client = ClientBuilder::new()
            .user_agent(super::DEFAULT_USER_AGENT)
            .cookie_store(true)
            .build()?;
        Ok(Self { client, base_url })
    }

    /// Get the base URL
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn post_grant(
        &self,
        path: &str,
        body: Option<&LoginRequest>,
    ) -> Result<TokenGrant, ClientError> {
        let url = format!("{}{}", self.base_url, path);
        let mut request = self.client.post(url);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            Ok(response.json().await?)
        } else {
            let message = response.text().await.unwrap_or_else(|_| status.to_string());
            Err(ClientError::from_status(status, message))
        }
    }
}

#[async_trait]
impl AuthBackend for AuthClient {
    async fn login(&self, email: &str, password: &str) -> SessionResult<TokenGrant> {
        let body = LoginRequest {
            email: email.to_string(),
            password: password.to_string(),
        };
        self.post_grant("/auth/login", Some(&body))
            .await
            .map_err(|err| match err {
                // Rejected credentials surface to the caller for display
                ClientError::AuthenticationFailed(m) | ClientError::BadRequest(m) => {
                    SessionError::login_failed(m)
                }
                other => SessionError::backend(other.to_string()),
            })
    }

    async fn refresh(&self) -> SessionResult<TokenGrant> {
        debug!("calling /auth/refresh");
        self.post_grant("/auth/refresh", None)
            .await
            .map_err(|err| match err {
                // The refresh credential is no longer accepted
                ClientError::AuthenticationFailed(m) | ClientError::Forbidden(m) => {
                    SessionError::session_expired(m)
                }
                other => SessionError::backend(other.to_string()),
            })
    }

    async fn logout(&self) -> SessionResult<()> {
        let url = format!("{}/auth/logout", self.base_url);
        let response = self
            .client
            .post(url)
            .send()
            .await
            .map_err(|err| SessionError::backend(err.to_string()))?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(SessionError::backend(format!(
                "logout returned {status}"
            )))
        }
    }
}
