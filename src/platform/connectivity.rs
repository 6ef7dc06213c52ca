//! Connectivity signal consumed from the hosting runtime.
//!
//! The host feeds a single boolean through [`Connectivity::set_online`]
//! whenever the environment reports a transition (browser online/offline
//! events, a reachability probe, etc.). Subscribers are only notified on
//! actual transitions, not on repeated reports of the same state.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Weak};

pub type ConnectivityListener = Arc<dyn Fn(bool) + Send + Sync>;

#[derive(Default)]
struct ListenerRegistry {
    listeners: Vec<(usize, ConnectivityListener)>,
}

/// Process-wide connectivity state with transition listeners.
pub struct Connectivity {
    online: AtomicBool,
    registry: Arc<Mutex<ListenerRegistry>>,
    next_id: AtomicUsize,
}

impl Connectivity {
    pub fn new(initially_online: bool) -> Self {
        Self {
            online: AtomicBool::new(initially_online),
            registry: Arc::new(Mutex::new(ListenerRegistry::default())),
            next_id: AtomicUsize::new(1),
        }
    }

    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    /// Records the connectivity flag reported by the host. Listeners fire
    /// only when the value actually changes.
    pub fn set_online(&self, online: bool) {
        let previous = self.online.swap(online, Ordering::SeqCst);
        if previous == online {
            return;
        }

        log::info!(
            "connectivity transition: {}",
            if online { "online" } else { "offline" }
        );

        let listeners = {
            let guard = self.registry.lock().unwrap();
            guard
                .listeners
                .iter()
                .map(|(_, listener)| listener.clone())
                .collect::<Vec<_>>()
        };
        for listener in listeners {
            listener(online);
        }
    }

    /// Registers a transition listener. Dropping the returned subscription
    /// unregisters it.
    pub fn subscribe(&self, listener: ConnectivityListener) -> ConnectivitySubscription {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        {
            let mut guard = self.registry.lock().unwrap();
            guard.listeners.push((id, listener));
        }

        ConnectivitySubscription {
            id,
            registry: Arc::downgrade(&self.registry),
        }
    }
}

impl Default for Connectivity {
    fn default() -> Self {
        Self::new(true)
    }
}

pub struct ConnectivitySubscription {
    id: usize,
    registry: Weak<Mutex<ListenerRegistry>>,
}

impl Drop for ConnectivitySubscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            if let Ok(mut guard) = registry.lock() {
                guard.listeners.retain(|(id, _)| *id != self.id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn notifies_only_on_transitions() {
        let connectivity = Connectivity::new(true);
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = fired.clone();
        let _subscription = connectivity.subscribe(Arc::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        connectivity.set_online(true);
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        connectivity.set_online(false);
        connectivity.set_online(false);
        connectivity.set_online(true);
        assert_eq!(fired.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn dropping_subscription_unregisters_listener() {
        let connectivity = Connectivity::new(true);
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = fired.clone();
        let subscription = connectivity.subscribe(Arc::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        connectivity.set_online(false);
        assert_eq!(fired.load(Ordering::SeqCst), 1);

        drop(subscription);
        connectivity.set_online(true);
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }
}
