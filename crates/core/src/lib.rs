//! Core types and trait seams for the warden session library
//!
//! This crate defines the data model (token grants, credentials, session
//! state) and the injected dependencies the session manager is built from:
//! a key-value store with cross-tab change notifications, a clock, and the
//! Auth API backend. Concrete HTTP implementations live in `warden-http`;
//! the lifecycle logic lives in `warden-session`.

pub mod auth;
pub mod clock;
pub mod error;
pub mod memory;
pub mod store;
pub mod types;

pub use auth::{AuthBackend, TokenProvider};
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{SessionError, SessionResult};
pub use memory::{MemoryHub, MemoryStore};
pub use store::{ChangeListener, CredentialStore, KeyValueStore, StoreEvent, StoreKeys};
pub use types::{Credentials, SessionState, TokenGrant, parse_expires_in};
