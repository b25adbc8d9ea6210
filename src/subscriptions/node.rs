//! Scoped pub/sub channels layered over the root store.

use super::listeners::{ListenerList, Subscription};
use crate::scope::Scope;
use crate::store::{Dispatcher, Store};
use std::sync::Arc;

/// A store-like handle with its own private listener list.
///
/// State access and dispatch go to the root store; `subscribe` and
/// [`notify_descendants`](Self::notify_descendants) only touch this node's
/// listeners, so notifying one subtree never reaches a sibling subtree.
pub struct SubscriptionNode<S, A> {
    root: Store<S, A>,
    listeners: Arc<ListenerList>,
    depth: usize,
}

impl<S, A> Clone for SubscriptionNode<S, A> {
    fn clone(&self) -> Self {
        Self {
            root: self.root.clone(),
            listeners: Arc::clone(&self.listeners),
            depth: self.depth,
        }
    }
}

impl<S, A> SubscriptionNode<S, A>
where
    S: Send + Sync + 'static,
    A: 'static,
{
    /// Create an empty node one level below `parent`.
    pub fn new(parent: &Scope<S, A>) -> Self {
        Self {
            root: parent.store().clone(),
            listeners: Arc::new(ListenerList::new()),
            depth: parent.depth() + 1,
        }
    }

    pub fn get_state(&self) -> Arc<S> {
        self.root.get_state()
    }

    pub fn dispatch(&self, action: A) {
        self.root.dispatch(action)
    }

    pub fn dispatcher(&self) -> Dispatcher<S, A> {
        self.root.dispatcher()
    }

    /// Register a listener on this node only.
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.listeners.subscribe(Arc::new(listener))
    }

    /// Fire this node's listeners without touching state.
    ///
    /// Returns the number of listeners invoked.
    pub fn notify_descendants(&self) -> usize {
        self.listeners.notify()
    }

    /// Distance from the root store (the root is 0).
    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    pub fn store(&self) -> &Store<S, A> {
        &self.root
    }

    /// Whether both handles refer to the same node.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.listeners, &other.listeners)
    }
}
