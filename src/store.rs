//! Main Store struct tying the reducer, listeners and batcher together.

use crate::batch::Batcher;
use crate::subscriptions::{ListenerList, StateWatch, Subscription, WatchList};
use crate::types::{ConsumerId, ProjectionFailurePolicy, StoreStats};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

/// A pure state transition.
///
/// Returning the incoming `Arc` unchanged signals "no change" by identity.
pub type Reducer<S, A> = dyn Fn(&Arc<S>, &A) -> Arc<S> + Send + Sync;

/// Store configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Defer render requests issued during a dispatch until every listener
    /// has run, then commit them together.
    pub batch_notifications: bool,

    /// What bindings do when a projection panics during a notification.
    pub projection_failure: ProjectionFailurePolicy,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            batch_notifications: true,
            projection_failure: ProjectionFailurePolicy::ForceRefresh,
        }
    }
}

struct StoreInner<S, A> {
    config: StoreConfig,
    state: RwLock<Arc<S>>,
    reducer: Box<Reducer<S, A>>,
    listeners: Arc<ListenerList>,
    watchers: Arc<WatchList<S>>,
    batcher: Batcher,
    next_consumer: AtomicU64,
    dispatches: AtomicU64,
    state_changes: AtomicU64,
}

/// The root state container.
///
/// Provides:
/// - Snapshot reads of the current state
/// - Registration-ordered listeners
/// - Synchronous dispatch through the reducer
///
/// `Store` is a cheap handle; clones share the same state.
pub struct Store<S, A> {
    inner: Arc<StoreInner<S, A>>,
}

impl<S, A> Clone for Store<S, A> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

/// Create a store with the default configuration.
pub fn create_store<S, A, R>(reducer: R, initial_state: S) -> Store<S, A>
where
    S: Send + Sync + 'static,
    A: 'static,
    R: Fn(&Arc<S>, &A) -> Arc<S> + Send + Sync + 'static,
{
    Store::new(reducer, initial_state)
}

impl<S, A> Store<S, A>
where
    S: Send + Sync + 'static,
    A: 'static,
{
    /// Create a store with the default configuration.
    pub fn new<R>(reducer: R, initial_state: S) -> Self
    where
        R: Fn(&Arc<S>, &A) -> Arc<S> + Send + Sync + 'static,
    {
        Self::with_config(reducer, initial_state, StoreConfig::default())
    }

    /// Create a store with a custom configuration.
    pub fn with_config<R>(reducer: R, initial_state: S, config: StoreConfig) -> Self
    where
        R: Fn(&Arc<S>, &A) -> Arc<S> + Send + Sync + 'static,
    {
        let batcher = Batcher::new(config.batch_notifications);
        Self {
            inner: Arc::new(StoreInner {
                config,
                state: RwLock::new(Arc::new(initial_state)),
                reducer: Box::new(reducer),
                listeners: Arc::new(ListenerList::new()),
                watchers: Arc::new(WatchList::new()),
                batcher,
                next_consumer: AtomicU64::new(1),
                dispatches: AtomicU64::new(0),
                state_changes: AtomicU64::new(0),
            }),
        }
    }

    pub fn config(&self) -> &StoreConfig {
        &self.inner.config
    }

    /// Current state. Shared, not copied.
    pub fn get_state(&self) -> Arc<S> {
        Arc::clone(&self.inner.state.read())
    }

    /// Register a listener, invoked after every dispatch.
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.inner.listeners.subscribe(Arc::new(listener))
    }

    /// Run the reducer and notify every listener.
    ///
    /// Listeners run over a snapshot of the list taken here: listeners added
    /// during the pass wait for the next dispatch, listeners removed during
    /// the pass are skipped. A panicking reducer propagates to the caller
    /// and leaves the state untouched.
    pub fn dispatch(&self, action: A) {
        let current = self.get_state();
        let next = (self.inner.reducer)(&current, &action);
        let changed = !Arc::ptr_eq(&current, &next);
        *self.inner.state.write() = Arc::clone(&next);

        let seq = self.inner.dispatches.fetch_add(1, Ordering::SeqCst) + 1;
        if changed {
            self.inner.state_changes.fetch_add(1, Ordering::Relaxed);
        }
        debug!(
            dispatch = seq,
            changed,
            listeners = self.inner.listeners.len(),
            "dispatch"
        );

        self.inner.watchers.publish(&next);
        self.inner
            .batcher
            .run_batched(|| self.inner.listeners.notify());
    }

    /// Dispatch-only capability bound to this store.
    pub fn dispatcher(&self) -> Dispatcher<S, A> {
        Dispatcher {
            store: self.clone(),
        }
    }

    /// Run `f` so that renders it triggers commit together.
    pub fn run_batched<R>(&self, f: impl FnOnce() -> R) -> R {
        self.inner.batcher.run_batched(f)
    }

    pub fn batcher(&self) -> &Batcher {
        &self.inner.batcher
    }

    /// Watch post-dispatch states through a bounded channel.
    ///
    /// Each watcher receives exactly the states produced by `dispatch`, in
    /// order, including those of nested dispatches.
    pub fn watch(&self, buffer_size: usize) -> StateWatch<S> {
        self.inner.watchers.attach(buffer_size)
    }

    pub fn listener_count(&self) -> usize {
        self.inner.listeners.len()
    }

    pub fn watcher_count(&self) -> usize {
        self.inner.watchers.len()
    }

    pub fn stats(&self) -> StoreStats {
        StoreStats {
            dispatches: self.inner.dispatches.load(Ordering::SeqCst),
            state_changes: self.inner.state_changes.load(Ordering::Relaxed),
            listeners: self.inner.listeners.len(),
            batches_flushed: self.inner.batcher.batches_flushed(),
        }
    }

    /// Whether both handles refer to the same store.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn next_consumer_id(&self) -> ConsumerId {
        ConsumerId(self.inner.next_consumer.fetch_add(1, Ordering::SeqCst))
    }
}

/// The root store's `dispatch`, detached from state access.
///
/// Stable for the lifetime of the store: every dispatcher obtained from the
/// same store, through any scope, compares equal under [`ptr_eq`].
///
/// [`ptr_eq`]: Dispatcher::ptr_eq
pub struct Dispatcher<S, A> {
    store: Store<S, A>,
}

impl<S, A> Clone for Dispatcher<S, A> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
        }
    }
}

impl<S, A> Dispatcher<S, A>
where
    S: Send + Sync + 'static,
    A: 'static,
{
    pub fn dispatch(&self, action: A) {
        self.store.dispatch(action)
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        self.store.ptr_eq(&other.store)
    }
}

impl<S, A> std::fmt::Debug for Dispatcher<S, A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    #[derive(Debug, PartialEq)]
    struct Counter {
        value: i64,
    }

    enum Action {
        Add(i64),
        Noop,
    }

    fn test_store() -> Store<Counter, Action> {
        create_store(
            |state: &Arc<Counter>, action: &Action| match action {
                Action::Add(n) => Arc::new(Counter {
                    value: state.value + n,
                }),
                Action::Noop => Arc::clone(state),
            },
            Counter { value: 0 },
        )
    }

    #[test]
    fn test_dispatch_updates_state() {
        let store = test_store();
        store.dispatch(Action::Add(2));
        store.dispatch(Action::Add(3));
        assert_eq!(store.get_state().value, 5);
    }

    #[test]
    fn test_noop_keeps_identity() {
        let store = test_store();
        let before = store.get_state();
        store.dispatch(Action::Noop);
        assert!(Arc::ptr_eq(&before, &store.get_state()));

        let stats = store.stats();
        assert_eq!(stats.dispatches, 1);
        assert_eq!(stats.state_changes, 0);
    }

    #[test]
    fn test_listeners_see_new_state() {
        let store = test_store();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let reader = store.clone();
        let log = seen.clone();
        let _sub = store.subscribe(move || log.lock().push(reader.get_state().value));

        store.dispatch(Action::Add(1));
        store.dispatch(Action::Add(1));
        assert_eq!(*seen.lock(), vec![1, 2]);
    }

    #[test]
    fn test_unsubscribe_twice_is_noop() {
        let store = test_store();
        let hits = Arc::new(AtomicUsize::new(0));
        let h = hits.clone();
        let sub = store.subscribe(move || {
            h.fetch_add(1, Ordering::SeqCst);
        });

        store.dispatch(Action::Add(1));
        sub.unsubscribe();
        sub.unsubscribe();
        store.dispatch(Action::Add(1));

        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(store.listener_count(), 0);
    }

    #[test]
    fn test_reentrant_dispatch_completes_before_outer_pass_continues() {
        let store = test_store();
        let order = Arc::new(Mutex::new(Vec::new()));

        let inner_store = store.clone();
        let log = order.clone();
        let _first = store.subscribe(move || {
            let value = inner_store.get_state().value;
            log.lock().push(("first", value));
            if value == 1 {
                inner_store.dispatch(Action::Add(10));
            }
        });

        let reader = store.clone();
        let log = order.clone();
        let _second = store.subscribe(move || {
            log.lock().push(("second", reader.get_state().value));
        });

        store.dispatch(Action::Add(1));

        assert_eq!(
            *order.lock(),
            vec![("first", 1), ("first", 11), ("second", 11), ("second", 11)]
        );
    }

    #[test]
    fn test_reducer_panic_leaves_state() {
        let store: Store<Counter, Action> = Store::new(
            |state: &Arc<Counter>, action: &Action| match action {
                Action::Add(n) if *n < 0 => panic!("negative"),
                Action::Add(n) => Arc::new(Counter {
                    value: state.value + n,
                }),
                Action::Noop => Arc::clone(state),
            },
            Counter { value: 1 },
        );
        let hits = Arc::new(AtomicUsize::new(0));
        let h = hits.clone();
        let _sub = store.subscribe(move || {
            h.fetch_add(1, Ordering::SeqCst);
        });

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            store.dispatch(Action::Add(-1));
        }));

        assert!(result.is_err());
        assert_eq!(store.get_state().value, 1);
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_dispatcher_is_stable() {
        let store = test_store();
        let a = store.dispatcher();
        let b = store.clone().dispatcher();
        assert!(a.ptr_eq(&b));

        a.dispatch(Action::Add(4));
        assert_eq!(store.get_state().value, 4);
    }

    #[test]
    fn test_watch_receives_states() {
        let store = test_store();
        let watch = store.watch(8);

        store.dispatch(Action::Add(1));
        store.dispatch(Action::Add(2));

        assert_eq!(watch.recv_timeout(Duration::from_millis(100)).unwrap().value, 1);
        assert_eq!(watch.recv_timeout(Duration::from_millis(100)).unwrap().value, 3);
        assert!(watch.try_recv().is_err());
    }

    #[test]
    fn test_watch_sees_intermediate_state_of_nested_dispatch() {
        let store = test_store();
        let watch = store.watch(8);

        let inner_store = store.clone();
        let _sub = store.subscribe(move || {
            if inner_store.get_state().value == 1 {
                inner_store.dispatch(Action::Add(10));
            }
        });

        store.dispatch(Action::Add(1));

        assert_eq!(watch.try_recv().unwrap().value, 1);
        assert_eq!(watch.try_recv().unwrap().value, 11);
        assert!(watch.try_recv().is_err());
    }

    #[test]
    fn test_watch_dropped_when_full() {
        let store = test_store();
        let watch = store.watch(2);
        assert_eq!(store.watcher_count(), 1);
        assert_eq!(store.listener_count(), 0);

        for _ in 0..5 {
            store.dispatch(Action::Add(1));
        }

        assert!(watch.is_dropped());
        assert_eq!(store.watcher_count(), 0);
        // Buffered states are still readable.
        assert_eq!(watch.try_recv().unwrap().value, 1);
        assert_eq!(watch.try_recv().unwrap().value, 2);
    }

    #[test]
    fn test_watch_across_threads() {
        let store = test_store();
        let watch = store.watch(16);

        let handle = std::thread::spawn(move || {
            let mut seen = Vec::new();
            while seen.len() < 3 {
                seen.push(watch.recv_timeout(Duration::from_secs(1)).unwrap().value);
            }
            seen
        });

        for _ in 0..3 {
            store.dispatch(Action::Add(1));
        }

        assert_eq!(handle.join().unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn test_config_from_json() {
        let config: StoreConfig = serde_json::from_str(r#"{"batch_notifications": false}"#).unwrap();
        assert!(!config.batch_notifications);
        assert_eq!(config.projection_failure, ProjectionFailurePolicy::ForceRefresh);
    }
}
