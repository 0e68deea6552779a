//! Key-value store seam and typed credential access
//!
//! The store models origin-scoped browser storage: synchronous reads and
//! writes shared by every tab of one origin, where a write made in one tab
//! raises a change notification in every *other* tab but never in the
//! writing tab itself. `CredentialStore` layers the credential pairing
//! rules on top; it is the single source of truth for session state.

use crate::clock::Clock;
use crate::types::Credentials;
use async_trait::async_trait;
use chrono::DateTime;
use std::sync::Arc;

/// A write observed from another same-origin tab
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreEvent {
    pub key: String,
    /// New value, or `None` when the key was removed
    pub value: Option<String>,
}

/// Stream of writes made by other tabs
#[async_trait]
pub trait ChangeListener: Send {
    /// Next remote write; `None` once the store is gone
    async fn next_change(&mut self) -> Option<StoreEvent>;
}

/// Origin-scoped persistent key-value store
///
/// Reads of absent keys return `None`; they are not failures. Writes are
/// durable across page reloads within the origin.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str);
    fn remove(&self, key: &str);

    /// Subscribe to writes made by other tabs of the same origin. The
    /// subscribing tab never observes its own writes.
    fn watch_remote(&self) -> Box<dyn ChangeListener>;
}

/// Store keys shared across tabs
///
/// The notification keys carry no payload; only their change matters.
/// Defaults match the web client so mixed deployments interoperate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreKeys {
    pub access_token: String,
    pub expires_at: String,
    /// Signals "session changed, other tabs re-check"
    pub auth_event: String,
    /// Signals "logout, other tabs must log out"
    pub logout: String,
}

impl Default for StoreKeys {
    fn default() -> Self {
        Self {
            access_token: "accessToken".to_string(),
            expires_at: "expiresAt".to_string(),
            auth_event: "auth_event".to_string(),
            logout: "logout".to_string(),
        }
    }
}

/// Typed access to the credential fields of the store
///
/// Token and expiry are always written together and removed together; no
/// state exists with one present and the other absent after a `set` or
/// `clear`.
#[derive(Clone)]
pub struct CredentialStore {
    store: Arc<dyn KeyValueStore>,
    keys: StoreKeys,
}

impl CredentialStore {
    pub fn new(store: Arc<dyn KeyValueStore>, keys: StoreKeys) -> Self {
        Self { store, keys }
    }

    /// Keys this store reads and writes
    pub fn keys(&self) -> &StoreKeys {
        &self.keys
    }

    /// Current access token, if any
    pub fn access_token(&self) -> Option<String> {
        self.store.get(&self.keys.access_token)
    }

    /// Current expiry instant, if present and well-formed
    pub fn expires_at(&self) -> Option<chrono::DateTime<chrono::Utc>> {
        let raw = self.store.get(&self.keys.expires_at)?;
        let millis = raw.parse::<i64>().ok()?;
        DateTime::from_timestamp_millis(millis)
    }

    /// Current credentials, if a token is present
    pub fn credentials(&self) -> Option<Credentials> {
        let access_token = self.access_token()?;
        Some(Credentials {
            access_token,
            expires_at: self.expires_at(),
        })
    }

    /// Write token and expiry together
    pub fn set(&self, token: &str, expires_at: chrono::DateTime<chrono::Utc>) {
        self.store.set(&self.keys.access_token, token);
        self.store
            .set(&self.keys.expires_at, &expires_at.timestamp_millis().to_string());
    }

    /// Remove token and expiry together
    pub fn clear(&self) {
        self.store.remove(&self.keys.access_token);
        self.store.remove(&self.keys.expires_at);
    }

    /// Bump a notification key so other tabs see a change
    pub fn touch(&self, key: &str, clock: &dyn Clock) {
        self.store
            .set(key, &clock.now().timestamp_millis().to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{Clock, SystemClock};
    use crate::memory::MemoryHub;
    use chrono::Utc;

    fn store() -> CredentialStore {
        let hub = MemoryHub::new();
        CredentialStore::new(Arc::new(hub.tab()), StoreKeys::default())
    }

    #[test]
    fn absent_reads_are_none() {
        let creds = store();
        assert_eq!(creds.access_token(), None);
        assert_eq!(creds.expires_at(), None);
        assert_eq!(creds.credentials(), None);
    }

    #[test]
    fn set_writes_both_fields() {
        let creds = store();
        let expiry = Utc::now() + chrono::Duration::seconds(60);
        creds.set("tok-1", expiry);

        let stored = creds.credentials().unwrap();
        assert_eq!(stored.access_token, "tok-1");
        // Stored as epoch millis, so sub-millisecond precision is dropped
        assert_eq!(
            stored.expires_at.unwrap().timestamp_millis(),
            expiry.timestamp_millis()
        );
    }

    #[test]
    fn clear_removes_both_fields() {
        let creds = store();
        creds.set("tok-1", Utc::now());
        creds.clear();
        assert_eq!(creds.access_token(), None);
        assert_eq!(creds.expires_at(), None);
    }

    #[test]
    fn malformed_expiry_reads_as_absent() {
        let hub = MemoryHub::new();
        let tab = Arc::new(hub.tab());
        let creds = CredentialStore::new(tab.clone(), StoreKeys::default());
        tab.set("accessToken", "tok-1");
        tab.set("expiresAt", "not-a-timestamp");
        assert_eq!(creds.expires_at(), None);
        assert!(creds.credentials().unwrap().expires_at.is_none());
    }

    #[test]
    fn touch_writes_a_timestamp() {
        let hub = MemoryHub::new();
        let tab = Arc::new(hub.tab());
        let creds = CredentialStore::new(tab.clone(), StoreKeys::default());
        creds.touch("auth_event", &SystemClock);

        let raw = tab.get("auth_event").unwrap();
        let millis: i64 = raw.parse().unwrap();
        assert!((SystemClock.now().timestamp_millis() - millis).abs() < 5_000);
    }
}
