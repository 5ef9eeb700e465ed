//! Reload Hook
//!
//! The host calls [`Reloader::reload`] whenever configuration or code is
//! reloaded; every live listener is told to drop what it memoized.

use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::debug;

/// Something that must forget cached state on reload
pub trait ReloadListener: Send + Sync {
    fn on_reload(&self);
}

/// Registration point for reload listeners
///
/// Listeners are held weakly; dropping a listener unregisters it.
#[derive(Default)]
pub struct Reloader {
    listeners: Mutex<Vec<Weak<dyn ReloadListener>>>,
}

impl Reloader {
    /// Create an empty reloader
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `listener`
    pub fn register<L: ReloadListener + 'static>(&self, listener: &Arc<L>) {
        let weak: Weak<L> = Arc::downgrade(listener);
        let weak: Weak<dyn ReloadListener> = weak;
        self.listeners.lock().push(weak);
    }

    /// Notify all live listeners; returns how many were notified
    pub fn reload(&self) -> usize {
        let live: Vec<Arc<dyn ReloadListener>> = {
            let mut listeners = self.listeners.lock();
            listeners.retain(|weak| weak.strong_count() > 0);
            listeners.iter().filter_map(Weak::upgrade).collect()
        };

        // notify outside the lock so listeners may register others
        for listener in &live {
            listener.on_reload();
        }
        debug!(listeners = live.len(), "Reload notified");
        live.len()
    }

    /// Number of live listeners
    pub fn len(&self) -> usize {
        self.listeners
            .lock()
            .iter()
            .filter(|weak| weak.strong_count() > 0)
            .count()
    }

    /// True when no live listener is registered
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
