//! Hook-style selections: one selector, identity comparison, no subtree.

use super::connector::Counters;
use crate::error::{ProjectionError, Result};
use crate::props::Identical;
use crate::scope::{current_scope, Scope};
use crate::store::Dispatcher;
use crate::subscriptions::Subscription;
use crate::types::{BindingStats, ConsumerId};
use parking_lot::Mutex;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Weak};
use tracing::warn;

type Selector<S, T> = dyn Fn(&S) -> T + Send + Sync;
type Renderer<S, A, T> = dyn Fn(&Selection<S, A, T>) + Send + Sync;

struct SelectionInner<S, A, T> {
    id: ConsumerId,
    scope: Scope<S, A>,
    selector: Box<Selector<S, T>>,
    current: Mutex<T>,
    renderer: Box<Renderer<S, A, T>>,
    registration: Mutex<Option<Subscription>>,
    counters: Counters,
}

/// A selected value kept in sync with the nearest scope.
///
/// Stricter than a [`Binding`](super::Binding): the new value must be
/// [`Identical`] to the cached one to skip a render, and nothing is
/// re-broadcast to descendants. Selector panics during notifications are
/// swallowed and force a render.
pub struct Selection<S, A, T> {
    inner: Arc<SelectionInner<S, A, T>>,
}

impl<S, A, T> Clone for Selection<S, A, T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

/// Select from the innermost provided scope.
pub fn get_selection<S, A, T, F, R>(selector: F, renderer: R) -> Result<Selection<S, A, T>>
where
    S: Send + Sync + 'static,
    A: 'static,
    T: Identical + Clone + Send + 'static,
    F: Fn(&S) -> T + Send + Sync + 'static,
    R: Fn(&Selection<S, A, T>) + Send + Sync + 'static,
{
    Selection::new(&current_scope::<S, A>()?, selector, renderer)
}

impl<S, A, T> Selection<S, A, T>
where
    S: Send + Sync + 'static,
    A: 'static,
    T: Identical + Clone + Send + 'static,
{
    /// Evaluate `selector` now and re-evaluate it on every notification of
    /// `scope`.
    pub fn new<F, R>(scope: &Scope<S, A>, selector: F, renderer: R) -> Result<Self>
    where
        F: Fn(&S) -> T + Send + Sync + 'static,
        R: Fn(&Selection<S, A, T>) + Send + Sync + 'static,
    {
        let state = scope.get_state();
        let current = catch_unwind(AssertUnwindSafe(|| selector(&state)))
            .map_err(|payload| ProjectionError::from_panic(payload.as_ref()))?;

        let inner = Arc::new(SelectionInner {
            id: scope.store().next_consumer_id(),
            scope: scope.clone(),
            selector: Box::new(selector),
            current: Mutex::new(current),
            renderer: Box::new(renderer),
            registration: Mutex::new(None),
            counters: Counters::default(),
        });
        Counters::bump(&inner.counters.evaluations);

        let weak: Weak<SelectionInner<S, A, T>> = Arc::downgrade(&inner);
        let registration = scope.subscribe(move || {
            if let Some(inner) = weak.upgrade() {
                SelectionInner::on_notify(&inner);
            }
        });
        *inner.registration.lock() = Some(registration);

        Ok(Self { inner })
    }

    /// Re-run the selector during a render pass and cache the result.
    pub fn evaluate(&self) -> Result<T> {
        let state = self.inner.scope.get_state();
        let value = catch_unwind(AssertUnwindSafe(|| (self.inner.selector)(&state)))
            .map_err(|payload| ProjectionError::from_panic(payload.as_ref()))?;
        *self.inner.current.lock() = value.clone();
        Counters::bump(&self.inner.counters.evaluations);
        Ok(value)
    }

    /// The cached value.
    pub fn current(&self) -> T {
        self.inner.current.lock().clone()
    }

    pub fn dispatcher(&self) -> Dispatcher<S, A> {
        self.inner.scope.dispatcher()
    }

    /// Stop listening. Idempotent.
    pub fn unmount(&self) {
        let registration = self.inner.registration.lock().take();
        if let Some(registration) = registration {
            registration.unsubscribe();
        }
    }

    pub fn is_mounted(&self) -> bool {
        self.inner.registration.lock().is_some()
    }

    pub fn stats(&self) -> BindingStats {
        self.inner.counters.snapshot()
    }
}

impl<S, A, T> SelectionInner<S, A, T>
where
    S: Send + Sync + 'static,
    A: 'static,
    T: Identical + Clone + Send + 'static,
{
    fn on_notify(self: &Arc<Self>) {
        Counters::bump(&self.counters.notifications);
        let state = self.scope.get_state();

        match catch_unwind(AssertUnwindSafe(|| (self.selector)(&state))) {
            Ok(next) => {
                let mut current = self.current.lock();
                if current.identical(&next) {
                    Counters::bump(&self.counters.bail_outs);
                    return;
                }
                *current = next;
            }
            Err(payload) => {
                let error = ProjectionError::from_panic(payload.as_ref());
                warn!(selection = %self.id, %error, "selector failed, forcing refresh");
            }
        }

        Counters::bump(&self.counters.render_requests);
        let weak = Arc::downgrade(self);
        self.scope.store().batcher().request(
            self.id,
            self.scope.depth() + 1,
            Box::new(move || {
                let Some(inner) = weak.upgrade() else {
                    return;
                };
                if inner.registration.lock().is_none() {
                    return;
                }
                let selection = Selection { inner };
                (selection.inner.renderer)(&selection);
            }),
        );
    }
}
