//! Sync status projection and its subscriber registry.
//!
//! The broadcaster is an explicit service object constructed once per
//! process and passed by reference to its consumers; it owns the current
//! status and the subscriber set. The status itself is purely
//! derivative: queue size plus transient runtime flags, recomputed after
//! every enqueue, every drain pass and every connectivity transition.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Weak};

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Snapshot of the sync subsystem the UI renders as a badge.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SyncStatus {
    pub is_online: bool,
    pub is_syncing: bool,
    pub pending_count: usize,
    pub last_sync_time: Option<DateTime<Utc>>,
    /// The only channel through which sync failures become user-visible.
    pub last_sync_error: Option<String>,
}

impl SyncStatus {
    fn new(is_online: bool) -> Self {
        Self {
            is_online,
            is_syncing: false,
            pending_count: 0,
            last_sync_time: None,
            last_sync_error: None,
        }
    }
}

pub type StatusListener = Arc<dyn Fn(&SyncStatus) + Send + Sync>;

struct Registry {
    status: SyncStatus,
    listeners: Vec<(usize, StatusListener)>,
}

/// Publishes [`SyncStatus`] to any number of subscribers.
pub struct StatusBroadcaster {
    registry: Arc<Mutex<Registry>>,
    next_id: AtomicUsize,
}

impl StatusBroadcaster {
    pub fn new(initially_online: bool) -> Self {
        Self {
            registry: Arc::new(Mutex::new(Registry {
                status: SyncStatus::new(initially_online),
                listeners: Vec::new(),
            })),
            next_id: AtomicUsize::new(1),
        }
    }

    pub fn current(&self) -> SyncStatus {
        self.registry.lock().unwrap().status.clone()
    }

    /// Registers a listener, delivering the current status immediately.
    /// Dropping the returned subscription unsubscribes.
    pub fn subscribe(&self, listener: StatusListener) -> StatusSubscription {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let status = {
            let mut guard = self.registry.lock().unwrap();
            guard.listeners.push((id, listener.clone()));
            guard.status.clone()
        };

        deliver(&listener, &status);

        StatusSubscription {
            id,
            registry: Arc::downgrade(&self.registry),
        }
    }

    pub fn set_online(&self, is_online: bool) {
        self.update(|status| status.is_online = is_online);
    }

    pub fn set_syncing(&self, is_syncing: bool) {
        self.update(|status| status.is_syncing = is_syncing);
    }

    pub fn set_pending_count(&self, pending_count: usize) {
        self.update(|status| status.pending_count = pending_count);
    }

    pub fn record_sync_success(&self, completed_at: DateTime<Utc>) {
        self.update(|status| {
            status.last_sync_time = Some(completed_at);
            status.last_sync_error = None;
        });
    }

    pub fn record_sync_error(&self, message: impl Into<String>) {
        let message = message.into();
        self.update(|status| status.last_sync_error = Some(message));
    }

    fn update(&self, mutate: impl FnOnce(&mut SyncStatus)) {
        let (status, listeners) = {
            let mut guard = self.registry.lock().unwrap();
            mutate(&mut guard.status);
            (
                guard.status.clone(),
                guard
                    .listeners
                    .iter()
                    .map(|(_, listener)| listener.clone())
                    .collect::<Vec<_>>(),
            )
        };

        for listener in listeners {
            deliver(&listener, &status);
        }
    }
}

impl Default for StatusBroadcaster {
    fn default() -> Self {
        Self::new(true)
    }
}

/// A panicking listener must not break delivery to the others.
fn deliver(listener: &StatusListener, status: &SyncStatus) {
    if catch_unwind(AssertUnwindSafe(|| listener(status))).is_err() {
        log::error!("sync status listener panicked; continuing delivery");
    }
}

pub struct StatusSubscription {
    id: usize,
    registry: Weak<Mutex<Registry>>,
}

impl Drop for StatusSubscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            if let Ok(mut guard) = registry.lock() {
                guard.listeners.retain(|(id, _)| *id != self.id);
            }
        }
    }
}
