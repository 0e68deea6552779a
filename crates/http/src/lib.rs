//! HTTP layer for the warden session library
//!
//! Two clients with deliberately different behavior:
//!
//! - [`client::AuthClient`] talks to the Auth API (`/auth/login`,
//!   `/auth/refresh`, `/auth/logout`). Its calls never recurse into the
//!   401-refresh path; a 401 from the Auth API is an answer, not a trigger.
//! - [`client::ApiClient`] carries application traffic. It attaches the
//!   current access token as a bearer credential and, on a 401, runs the
//!   session's single-flight refresh and replays the request exactly once.

pub mod client;
pub mod types;

pub use client::{ApiClient, ApiClientBuilder, AuthClient, error::ClientError};
pub use types::{LoginRequest, UserProfile};
