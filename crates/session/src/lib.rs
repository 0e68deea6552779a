//! Session lifecycle management
//!
//! [`SessionManager`] is the single authority the rest of an application
//! asks about authentication: it resumes a session silently on startup,
//! renews the access credential shortly before expiry, collapses
//! concurrent 401-triggered refreshes into one Auth API call, and mirrors
//! login/logout performed in other same-origin tabs. Dependencies (store,
//! Auth API backend, clock) are injected through the builder, so the whole
//! lifecycle runs deterministically under test with in-memory fakes.

pub mod config;
pub mod gate;
pub mod manager;

mod scheduler;
mod sync;

pub use config::{ResumePolicy, SessionConfig};
pub use gate::GateDecision;
pub use manager::{SessionManager, SessionManagerBuilder};
