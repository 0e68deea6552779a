//! Route gating decisions

use warden_core::SessionState;

/// What a protected view should do for the current session state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    /// Resume attempt still settling: render nothing, never redirect
    Pending,
    /// Authenticated: render the protected content
    Allow,
    /// Settled and unauthenticated: send the user to the login surface
    RedirectToLogin,
}

impl From<SessionState> for GateDecision {
    fn from(state: SessionState) -> Self {
        match state {
            SessionState::Initializing => Self::Pending,
            SessionState::Ready {
                authenticated: true,
            } => Self::Allow,
            SessionState::Ready {
                authenticated: false,
            } => Self::RedirectToLogin,
        }
    }
}
