//! API client with bearer attachment and single-flight 401 replay

pub mod auth;
pub mod error;

pub use auth::AuthClient;

use error::ClientError;
use reqwest::{Client, ClientBuilder, Method, RequestBuilder, StatusCode};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use warden_core::TokenProvider;

use crate::types::UserProfile;

pub(crate) const DEFAULT_USER_AGENT: &str = concat!("warden/", env!("CARGO_PKG_VERSION"));

/// Application API client
///
/// Every request goes through the interceptor pipeline: the current access
/// token (if any) is attached as `Authorization: Bearer`; a 401 response
/// triggers the session's single-flight refresh and the request is replayed
/// once with the fresh token. A second 401, or any non-401 failure,
/// propagates to the caller unchanged.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    session: Option<Arc<dyn TokenProvider>>,
}

impl ApiClient {
    /// Create a client with default configuration and no session attached
    pub fn new(base_url: impl Into<String>) -> Result<Self, ClientError> {
        Self::builder().base_url(base_url).build()
    }

    /// Create a new client builder
    pub fn builder() -> ApiClientBuilder {
        ApiClientBuilder::default()
    }

    /// Get the base URL
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Create a request builder for the given method and path
    ///
    /// The bearer credential is attached by [`execute`](Self::execute), not
    /// here, so a replay can carry a different token.
    pub fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        self.client.request(method, url)
    }

    /// Execute a request through the interceptor pipeline
    pub async fn execute<T: serde::de::DeserializeOwned>(
        &self,
        request: RequestBuilder,
    ) -> Result<T, ClientError> {
        // Kept aside for the single allowed replay; requests with stream
        // bodies cannot be cloned and are simply never replayed.
        let replay = request.try_clone();

        let request = match self.session.as_ref().and_then(|s| s.access_token()) {
            Some(token) => request.bearer_auth(token),
            // No token is not an error; the request goes out unauthenticated
            None => request,
        };

        let response = request.send().await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return Self::decode(response).await;
        }

        let (Some(session), Some(replay)) = (self.session.as_ref(), replay) else {
            return Self::decode(response).await;
        };

        debug!("request returned 401, refreshing and replaying once");
        let fresh = session
            .refresh_after_unauthorized()
            .await
            .map_err(|err| ClientError::AuthenticationFailed(err.to_string()))?;

        // A 401 here maps to AuthenticationFailed in decode; never a second
        // refresh for the same request.
        let response = replay.bearer_auth(fresh).send().await?;
        Self::decode(response).await
    }

    /// Fetch the authenticated user's profile
    pub async fn me(&self) -> Result<UserProfile, ClientError> {
        let request = self.request(Method::GET, "/user/me");
        self.execute(request).await
    }

    async fn decode<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, ClientError> {
        let status = response.status();
        if status.is_success() {
            Ok(response.json().await?)
        } else {
            let message = response.text().await.unwrap_or_else(|_| status.to_string());
            Err(ClientError::from_status(status, message))
        }
    }
}

/// Builder for [`ApiClient`]
#[derive(Default)]
pub struct ApiClientBuilder {
    base_url: Option<String>,
    session: Option<Arc<dyn TokenProvider>>,
    timeout: Option<Duration>,
    user_agent: Option<String>,
}

impl ApiClientBuilder {
    /// Set the base URL (required)
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Attach the session that supplies tokens and handles 401 refreshes
    pub fn session(mut self, session: Arc<dyn TokenProvider>) -> Self {
        self.session = Some(session);
        self
    }

    /// Set the request timeout
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set the user agent
    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.user_agent = Some(agent.into());
        self
    }

    /// Build the client
    pub fn build(self) -> Result<ApiClient, ClientError> {
        let base_url = self
            .base_url
            .ok_or_else(|| ClientError::Configuration("base_url is required".into()))?;
        let base_url = base_url.trim_end_matches('/').to_string();

        let mut builder = ClientBuilder::new()
            .user_agent(self.user_agent.unwrap_or_else(|| DEFAULT_USER_AGENT.into()))
            .cookie_store(true);

        if let Some(timeout) = self.timeout {
            builder = builder.timeout(timeout);
        }

        Ok(ApiClient {
            client: builder.build()?,
            base_url,
            session: self.session,
        })
    }
}
