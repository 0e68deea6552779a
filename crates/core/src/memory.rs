//! In-memory store with cross-tab change notifications
//!
//! `MemoryHub` models one browser origin: every tab it hands out shares one
//! map, and a write in one tab is observed by the listeners of every other
//! tab but never by the writer. Used as the test double for browser
//! storage and as a real store for non-browser hosts.

use crate::store::{ChangeListener, KeyValueStore, StoreEvent};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;

#[derive(Debug, Clone)]
struct TaggedEvent {
    writer: u64,
    event: StoreEvent,
}

struct OriginShared {
    map: Mutex<HashMap<String, String>>,
    changes: broadcast::Sender<TaggedEvent>,
    next_tab: AtomicU64,
}

/// One logical browser origin handing out per-tab stores
#[derive(Clone)]
pub struct MemoryHub {
    shared: Arc<OriginShared>,
}

impl MemoryHub {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(64);
        Self {
            shared: Arc::new(OriginShared {
                map: Mutex::new(HashMap::new()),
                changes,
                next_tab: AtomicU64::new(0),
            }),
        }
    }

    /// Open a new tab on this origin
    pub fn tab(&self) -> MemoryStore {
        MemoryStore {
            shared: self.shared.clone(),
            tab: self.shared.next_tab.fetch_add(1, Ordering::Relaxed),
        }
    }
}

impl Default for MemoryHub {
    fn default() -> Self {
        Self::new()
    }
}

/// A single tab's view of a [`MemoryHub`] origin
pub struct MemoryStore {
    shared: Arc<OriginShared>,
    tab: u64,
}

impl MemoryStore {
    fn publish(&self, key: &str, value: Option<String>) {
        // No receivers is fine; nothing is listening yet
        let _ = self.shared.changes.send(TaggedEvent {
            writer: self.tab,
            event: StoreEvent {
                key: key.to_string(),
                value,
            },
        });
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.shared.map.lock().unwrap().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) {
        let previous = self
            .shared
            .map
            .lock()
            .unwrap()
            .insert(key.to_string(), value.to_string());
        // Browser storage events fire only when the value actually changes
        if previous.as_deref() != Some(value) {
            self.publish(key, Some(value.to_string()));
        }
    }

    fn remove(&self, key: &str) {
        let previous = self.shared.map.lock().unwrap().remove(key);
        if previous.is_some() {
            self.publish(key, None);
        }
    }

    fn watch_remote(&self) -> Box<dyn ChangeListener> {
        Box::new(MemoryListener {
            rx: self.shared.changes.subscribe(),
            tab: self.tab,
        })
    }
}

struct MemoryListener {
    rx: broadcast::Receiver<TaggedEvent>,
    tab: u64,
}

#[async_trait]
impl ChangeListener for MemoryListener {
    async fn next_change(&mut self) -> Option<StoreEvent> {
        loop {
            match self.rx.recv().await {
                Ok(tagged) if tagged.writer != self.tab => return Some(tagged.event),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}
