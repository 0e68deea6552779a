//! Session manager configuration

use chrono::Duration;
use std::fmt;
use std::sync::Arc;
use warden_core::StoreKeys;

/// How `initialize` decides whether to attempt a silent resume
#[derive(Clone)]
pub enum ResumePolicy {
    /// Attempt one refresh call unconditionally; failure means "no
    /// session". This is the default: the refresh cookie is httponly in
    /// typical deployments, so its presence cannot be observed from here.
    Always,
    /// Skip the resume call; only persisted credentials count
    Never,
    /// Attempt the resume only when the probe reports a refresh cookie.
    /// A UX optimization, not a security boundary: the probe can only see
    /// non-httponly cookies.
    Probe(Arc<dyn Fn() -> bool + Send + Sync>),
}

impl fmt::Debug for ResumePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Always => write!(f, "Always"),
            Self::Never => write!(f, "Never"),
            Self::Probe(_) => write!(f, "Probe(..)"),
        }
    }
}

/// Configuration for [`SessionManager`](crate::SessionManager)
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// How long before expiry the silent refresh fires. Grants shorter
    /// than this refresh immediately.
    pub refresh_skew: Duration,
    /// Store keys shared with other tabs
    pub keys: StoreKeys,
    /// Silent resume behavior on `initialize`
    pub resume: ResumePolicy,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            refresh_skew: Duration::seconds(10),
            keys: StoreKeys::default(),
            resume: ResumePolicy::Always,
        }
    }
}
