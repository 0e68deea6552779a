//! Proactive silent-refresh timer
//!
//! One pending one-shot timer at a time, keyed to the session generation
//! at arm time: any credential change replaces the timer, and a timer that
//! fires after being superseded does nothing.

use crate::manager::Inner;
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;
use tracing::debug;

pub(crate) struct RefreshScheduler {
    timer: Mutex<Option<JoinHandle<()>>>,
}

impl RefreshScheduler {
    pub(crate) fn new() -> Self {
        Self {
            timer: Mutex::new(None),
        }
    }

    pub(crate) fn cancel(&self) {
        if let Some(task) = self.timer.lock().unwrap().take() {
            task.abort();
        }
    }

    fn replace(&self, task: JoinHandle<()>) {
        if let Some(previous) = self.timer.lock().unwrap().replace(task) {
            previous.abort();
        }
    }
}

impl Drop for RefreshScheduler {
    fn drop(&mut self) {
        if let Some(task) = self.timer.lock().unwrap().take() {
            task.abort();
        }
    }
}

/// Re-arm the refresh timer for the current credentials
pub(crate) fn arm(inner: &Arc<Inner>) {
    let Some(expires_at) = inner.cached_expires_at() else {
        inner.scheduler.cancel();
        return;
    };

    let time_left = expires_at - inner.clock.now();
    if time_left <= chrono::Duration::zero() {
        // Stale credential; a fresh one is expected shortly from a
        // concurrent flow, so stay quiescent instead of firing
        debug!("credential already expired, scheduler quiescent");
        inner.scheduler.cancel();
        return;
    }

    let skew = inner.config.refresh_skew;
    let delay = if time_left <= skew {
        std::time::Duration::ZERO
    } else {
        (time_left - skew).to_std().unwrap_or(std::time::Duration::ZERO)
    };

    let generation = inner.generation();
    let weak = Arc::downgrade(inner);
    debug!(delay_ms = delay.as_millis() as u64, "arming silent refresh timer");

    // Anchor the deadline now, not at the task's first poll, so the timer
    // measures from credential-change time
    let deadline = tokio::time::Instant::now() + delay;
    let task = tokio::spawn(async move {
        if !delay.is_zero() {
            tokio::time::sleep_until(deadline).await;
        }
        let Some(inner) = weak.upgrade() else { return };
        if inner.generation() != generation {
            // Superseded by a credential change while sleeping
            return;
        }
        let _ = inner.refresh_once().await;
    });

    inner.scheduler.replace(task);
}
