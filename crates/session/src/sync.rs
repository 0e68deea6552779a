//! Cross-tab synchronization
//!
//! Drains the store's remote-change listener and applies each event to
//! local in-memory state. The store is authoritative: every notification
//! is reapplied idempotently. Application never writes the store's
//! notification keys back, so tabs cannot ping-pong events.

use crate::manager::Inner;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info};
use warden_core::StoreEvent;

pub(crate) fn spawn(inner: &Arc<Inner>) -> JoinHandle<()> {
    let mut listener = inner.store.watch_remote();
    let weak = Arc::downgrade(inner);
    tokio::spawn(async move {
        while let Some(event) = listener.next_change().await {
            let Some(inner) = weak.upgrade() else { break };
            apply(&inner, event);
        }
    })
}

fn apply(inner: &Arc<Inner>, event: StoreEvent) {
    let keys = &inner.config.keys;

    if event.key == keys.logout {
        // The originating tab already called the Auth API; clear local
        // state only and do not re-broadcast
        info!("logout observed from another tab");
        inner.clear_session(false);
    } else if event.key == keys.access_token || event.key == keys.expires_at {
        // Adopt the other tab's credentials without writing the store
        debug!(key = %event.key, "adopting credential change from another tab");
        inner.adopt_remote_credentials(inner.credentials.credentials());
    } else if event.key == keys.auth_event {
        // Pure trigger: some tab logged in or refreshed; re-check the store
        debug!("session change signalled by another tab");
        inner.adopt_remote_credentials(inner.credentials.credentials());
    }
}
