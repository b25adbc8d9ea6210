//! Channel-backed state watchers for consumers on other threads.

use crate::types::ListenerId;
use crossbeam_channel::{bounded, Receiver, RecvError, RecvTimeoutError, Sender, TryRecvError};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::{trace, warn};

struct Watcher<S> {
    id: ListenerId,
    sender: Sender<Arc<S>>,
    dropped: Arc<AtomicBool>,
}

/// Watchers of one store.
///
/// `dispatch` publishes each post-reducer state here before notifying
/// listeners, so every watcher sees every state in dispatch order, nested
/// dispatches included.
pub(crate) struct WatchList<S> {
    watchers: Mutex<Vec<Watcher<S>>>,
    next_id: AtomicU64,
}

impl<S: Send + Sync + 'static> WatchList<S> {
    pub(crate) fn new() -> Self {
        Self {
            watchers: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register a watcher with a bounded buffer (at least one slot).
    pub(crate) fn attach(self: &Arc<Self>, buffer_size: usize) -> StateWatch<S> {
        let (sender, receiver) = bounded(buffer_size.max(1));
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let dropped = Arc::new(AtomicBool::new(false));

        self.watchers.lock().push(Watcher {
            id,
            sender,
            dropped: Arc::clone(&dropped),
        });
        trace!(watcher = %id, buffer_size, "state watcher attached");

        StateWatch {
            id,
            receiver,
            list: Arc::downgrade(self),
            dropped,
        }
    }

    /// Send `state` to every watcher, dropping the ones that cannot take it.
    pub(crate) fn publish(&self, state: &Arc<S>) {
        self.watchers.lock().retain(|watcher| {
            if watcher.sender.try_send(Arc::clone(state)).is_ok() {
                return true;
            }
            warn!(watcher = %watcher.id, "state watcher fell behind, dropping it");
            watcher.dropped.store(true, Ordering::Release);
            false
        });
    }
}

impl<S> WatchList<S> {
    fn remove(&self, id: ListenerId) {
        self.watchers.lock().retain(|watcher| watcher.id != id);
    }

    pub(crate) fn len(&self) -> usize {
        self.watchers.lock().len()
    }
}

/// Receives the post-dispatch state after every dispatch.
///
/// The buffer is bounded. A watcher that falls behind, or whose receiver is
/// gone, is removed instead of stalling dispatch; [`is_dropped`] reports it.
/// Dropping the watch detaches it.
///
/// [`is_dropped`]: StateWatch::is_dropped
pub struct StateWatch<S> {
    id: ListenerId,
    receiver: Receiver<Arc<S>>,
    list: Weak<WatchList<S>>,
    dropped: Arc<AtomicBool>,
}

impl<S> StateWatch<S> {
    /// Receive the next state (blocking).
    pub fn recv(&self) -> Result<Arc<S>, RecvError> {
        self.receiver.recv()
    }

    /// Try to receive a state (non-blocking).
    pub fn try_recv(&self) -> Result<Arc<S>, TryRecvError> {
        self.receiver.try_recv()
    }

    /// Receive with timeout.
    pub fn recv_timeout(&self, timeout: std::time::Duration) -> Result<Arc<S>, RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }

    /// Whether the watcher was dropped for falling behind.
    pub fn is_dropped(&self) -> bool {
        self.dropped.load(Ordering::Acquire)
    }

    /// Stop watching. Already-buffered states can still be received.
    pub fn unsubscribe(&self) {
        if let Some(list) = self.list.upgrade() {
            list.remove(self.id);
        }
    }
}

impl<S> Drop for StateWatch<S> {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}
