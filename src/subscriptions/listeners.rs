//! Ordered listener lists shared by the root store and subscription nodes.

use crate::types::ListenerId;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::trace;

/// A zero-argument notification callback.
pub(crate) type Listener = Arc<dyn Fn() + Send + Sync>;

/// One registration. `active` flips to false on removal so that a pass which
/// already snapshotted the list skips it.
struct Registration {
    id: ListenerId,
    active: AtomicBool,
    listener: Listener,
}

/// Registration-ordered listener list.
///
/// Notification runs over a snapshot taken when the pass starts; no lock is
/// held while listeners run, so listeners may subscribe, unsubscribe or
/// dispatch.
pub(crate) struct ListenerList {
    registrations: RwLock<Vec<Arc<Registration>>>,
    next_id: AtomicU64,
}

impl ListenerList {
    pub(crate) fn new() -> Self {
        Self {
            registrations: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Append a listener.
    pub(crate) fn subscribe(self: &Arc<Self>, listener: Listener) -> Subscription {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let registration = Arc::new(Registration {
            id,
            active: AtomicBool::new(true),
            listener,
        });
        self.registrations.write().push(registration);
        trace!(listener = %id, "listener subscribed");

        Subscription {
            id,
            list: Arc::downgrade(self),
        }
    }

    /// Remove a registration. Returns false if it was already gone.
    pub(crate) fn remove(&self, id: ListenerId) -> bool {
        let mut registrations = self.registrations.write();
        match registrations.iter().position(|r| r.id == id) {
            Some(pos) => {
                let registration = registrations.remove(pos);
                registration.active.store(false, Ordering::Release);
                trace!(listener = %id, "listener unsubscribed");
                true
            }
            None => false,
        }
    }

    /// Invoke every active listener in registration order.
    ///
    /// Returns the number of listeners invoked.
    pub(crate) fn notify(&self) -> usize {
        let snapshot: Vec<Arc<Registration>> = self.registrations.read().clone();
        let mut invoked = 0;
        for registration in snapshot {
            if registration.active.load(Ordering::Acquire) {
                (registration.listener)();
                invoked += 1;
            }
        }
        invoked
    }

    pub(crate) fn len(&self) -> usize {
        self.registrations.read().len()
    }
}

/// Capability to remove one listener registration.
///
/// Dropping the handle unsubscribes. Unsubscribing more than once, or after
/// the owning store is gone, is a no-op.
#[must_use = "dropping a Subscription unsubscribes its listener"]
pub struct Subscription {
    id: ListenerId,
    list: Weak<ListenerList>,
}

impl Subscription {
    pub fn id(&self) -> ListenerId {
        self.id
    }

    /// Remove the listener. Safe to call repeatedly and from inside a
    /// notification pass.
    pub fn unsubscribe(&self) {
        if let Some(list) = self.list.upgrade() {
            list.remove(self.id);
        }
    }

    /// Whether the listener is still registered.
    pub fn is_active(&self) -> bool {
        self.list
            .upgrade()
            .is_some_and(|list| list.registrations.read().iter().any(|r| r.id == self.id))
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}
