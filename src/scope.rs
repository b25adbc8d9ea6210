//! Scopes: handles to the nearest enclosing store or subscription node.
//!
//! Components receive their parent scope explicitly, or read it from the
//! provider environment: a thread-local stack that [`provide`] pushes for the
//! duration of a closure. There is no global store.

use crate::error::{Result, StoreError};
use crate::store::{Dispatcher, Store};
use crate::subscriptions::{Subscription, SubscriptionNode};
use std::any::{type_name, Any};
use std::cell::RefCell;
use std::sync::Arc;

/// The nearest enclosing store or subscription node.
pub enum Scope<S, A> {
    Root(Store<S, A>),
    Node(SubscriptionNode<S, A>),
}

impl<S, A> Clone for Scope<S, A> {
    fn clone(&self) -> Self {
        match self {
            Scope::Root(store) => Scope::Root(store.clone()),
            Scope::Node(node) => Scope::Node(node.clone()),
        }
    }
}

impl<S, A> From<Store<S, A>> for Scope<S, A> {
    fn from(store: Store<S, A>) -> Self {
        Scope::Root(store)
    }
}

impl<S, A> From<SubscriptionNode<S, A>> for Scope<S, A> {
    fn from(node: SubscriptionNode<S, A>) -> Self {
        Scope::Node(node)
    }
}

impl<S, A> Scope<S, A>
where
    S: Send + Sync + 'static,
    A: 'static,
{
    pub fn get_state(&self) -> Arc<S> {
        self.store().get_state()
    }

    /// Dispatch to the root store.
    pub fn dispatch(&self, action: A) {
        self.store().dispatch(action)
    }

    pub fn dispatcher(&self) -> Dispatcher<S, A> {
        self.store().dispatcher()
    }

    /// Register a listener on this scope's own listener list.
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn() + Send + Sync + 'static,
    {
        match self {
            Scope::Root(store) => store.subscribe(listener),
            Scope::Node(node) => node.subscribe(listener),
        }
    }

    /// The root store.
    pub fn store(&self) -> &Store<S, A> {
        match self {
            Scope::Root(store) => store,
            Scope::Node(node) => node.store(),
        }
    }

    /// Distance from the root store (the root is 0).
    pub fn depth(&self) -> usize {
        match self {
            Scope::Root(_) => 0,
            Scope::Node(node) => node.depth(),
        }
    }

    /// Whether both handles refer to the same store or node.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Scope::Root(a), Scope::Root(b)) => a.ptr_eq(b),
            (Scope::Node(a), Scope::Node(b)) => a.ptr_eq(b),
            _ => false,
        }
    }

    /// Make this scope the innermost provider while `f` runs.
    pub fn provide<R>(&self, f: impl FnOnce() -> R) -> R {
        provide(self.clone(), f)
    }
}

thread_local! {
    static PROVIDERS: RefCell<Vec<Box<dyn Any>>> = const { RefCell::new(Vec::new()) };
}

/// Pops the provider pushed by [`provide`], also on unwind.
struct ProviderGuard;

impl Drop for ProviderGuard {
    fn drop(&mut self) {
        PROVIDERS.with(|providers| {
            providers.borrow_mut().pop();
        });
    }
}

/// Run `f` with `scope` as the innermost provider for its state type.
pub fn provide<S, A, R>(scope: Scope<S, A>, f: impl FnOnce() -> R) -> R
where
    S: 'static,
    A: 'static,
{
    PROVIDERS.with(|providers| providers.borrow_mut().push(Box::new(scope)));
    let _guard = ProviderGuard;
    f()
}

/// The innermost provided scope for `(S, A)`.
pub fn current_scope<S, A>() -> Result<Scope<S, A>>
where
    S: 'static,
    A: 'static,
{
    PROVIDERS
        .with(|providers| {
            providers
                .borrow()
                .iter()
                .rev()
                .find_map(|p| p.downcast_ref::<Scope<S, A>>().cloned())
        })
        .ok_or(StoreError::MissingProvider {
            state: type_name::<S>(),
        })
}

/// The root store's dispatch capability, from the provider environment.
pub fn get_dispatcher<S, A>() -> Result<Dispatcher<S, A>>
where
    S: Send + Sync + 'static,
    A: 'static,
{
    Ok(current_scope::<S, A>()?.dispatcher())
}
