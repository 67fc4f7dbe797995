use std::sync::{Arc, Mutex, Weak};

use tracing::trace;

/// Lifecycle notifications for every connect and disconnect request.
///
/// All methods default to no-ops so observers implement only what they
/// need. Each request produces one "requested" notification and then
/// exactly one terminal notification, success or failure.
pub trait ConnectionObserver: Send + Sync {
    fn connect_to_network_requested(&self, _network_id: &str) {}
    fn connect_succeeded(&self, _network_id: &str) {}
    fn connect_failed(&self, _network_id: &str, _error_name: &str) {}
    fn disconnect_requested(&self, _network_id: &str) {}
}

/// Fan-out of request lifecycle events to registered observers.
///
/// Registrations are non-owning. Notification snapshots the list first, so
/// an observer removing itself mid-callback cannot invalidate the
/// iteration. Observers are called in registration order.
#[derive(Default)]
pub struct ObserverHub {
    observers: Mutex<Vec<Weak<dyn ConnectionObserver>>>,
}

impl ObserverHub {
    pub fn add(&self, observer: Arc<dyn ConnectionObserver>) {
        self.observers.lock().unwrap().push(Arc::downgrade(&observer));
    }

    pub fn remove(&self, observer: &Arc<dyn ConnectionObserver>) {
        let target = Arc::as_ptr(observer) as *const ();
        self.observers.lock().unwrap().retain(|weak| {
            weak.upgrade()
                .map_or(false, |o| Arc::as_ptr(&o) as *const () != target)
        });
    }

    /// Upgrade live registrations and drop dead ones.
    fn snapshot(&self) -> Vec<Arc<dyn ConnectionObserver>> {
        let mut observers = self.observers.lock().unwrap();
        observers.retain(|weak| weak.strong_count() > 0);
        observers.iter().filter_map(Weak::upgrade).collect()
    }

    pub fn notify_connect_requested(&self, network_id: &str) {
        trace!(network_id, "notify: connect requested");
        for observer in self.snapshot() {
            observer.connect_to_network_requested(network_id);
        }
    }

    pub fn notify_connect_succeeded(&self, network_id: &str) {
        trace!(network_id, "notify: connect succeeded");
        for observer in self.snapshot() {
            observer.connect_succeeded(network_id);
        }
    }

    pub fn notify_connect_failed(&self, network_id: &str, error_name: &str) {
        trace!(network_id, error_name, "notify: connect failed");
        for observer in self.snapshot() {
            observer.connect_failed(network_id, error_name);
        }
    }

    pub fn notify_disconnect_requested(&self, network_id: &str) {
        trace!(network_id, "notify: disconnect requested");
        for observer in self.snapshot() {
            observer.disconnect_requested(network_id);
        }
    }
}
