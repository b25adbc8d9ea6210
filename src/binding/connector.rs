//! Connected bindings: derived props, bail-out, and re-broadcast.
//!
//! A [`Binding`] sits between a parent scope and one host component. On every
//! notification from the parent it re-projects state into derived props and
//! compares them with the previous ones:
//!
//! - unchanged: no render; the binding's own subscription node is notified
//!   right away so descendants that read state more directly still refresh.
//!   If a render is still pending from an earlier notification, the
//!   notification is left to that render's commit instead;
//! - changed: the new props are stored and a render is requested. The host
//!   renders, then calls [`Binding::commit`], which notifies descendants.
//!
//! Bail-out stops the render wave, never the notify wave: every live binding
//! in the tree observes every dispatch.
//!
//! # Host contract
//!
//! 1. [`Connector::mount`] once per component instance.
//! 2. For every render (requested or caused by new own props): call
//!    [`Binding::render`], render children, then [`Binding::commit`].
//! 3. [`Binding::unmount`] once when the component goes away.

use crate::error::{ProjectionError, Result, StoreError};
use crate::props::ShallowEq;
use crate::scope::{current_scope, Scope};
use crate::store::Dispatcher;
use crate::subscriptions::{Subscription, SubscriptionNode};
use crate::types::{BindingStats, ConsumerId, ProjectionFailurePolicy};
use parking_lot::Mutex;
use std::marker::PhantomData;
use std::panic::{catch_unwind, resume_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, trace, warn};

type Projection<S, O, P> = dyn Fn(&S, &O) -> P + Send + Sync;
type Renderer<S, A, O, P> = dyn Fn(&Binding<S, A, O, P>) + Send + Sync;

/// Where a binding is in its notification cycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BindingPhase {
    /// Nothing pending.
    Idle,
    /// Re-projecting after a notification or during `render`.
    Evaluating,
    /// Derived props changed; waiting for the host to render.
    RenderRequested,
    /// Rendered; waiting for `commit`.
    Rendered,
}

/// What the wrapped component receives: its own props, the derived props,
/// and the root store's dispatch.
pub struct ConnectedProps<S, A, O, P> {
    pub own: O,
    pub mapped: P,
    pub dispatch: Dispatcher<S, A>,
}

impl<S, A, O: Clone, P: Clone> Clone for ConnectedProps<S, A, O, P> {
    fn clone(&self) -> Self {
        Self {
            own: self.own.clone(),
            mapped: self.mapped.clone(),
            dispatch: self.dispatch.clone(),
        }
    }
}

impl<S, A, O: std::fmt::Debug, P: std::fmt::Debug> std::fmt::Debug for ConnectedProps<S, A, O, P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectedProps")
            .field("own", &self.own)
            .field("mapped", &self.mapped)
            .finish_non_exhaustive()
    }
}

/// Counters shared by bindings and selections.
#[derive(Default)]
pub(crate) struct Counters {
    pub(crate) notifications: AtomicU64,
    pub(crate) bail_outs: AtomicU64,
    pub(crate) render_requests: AtomicU64,
    pub(crate) evaluations: AtomicU64,
    pub(crate) commits: AtomicU64,
}

impl Counters {
    pub(crate) fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> BindingStats {
        BindingStats {
            notifications: self.notifications.load(Ordering::Relaxed),
            bail_outs: self.bail_outs.load(Ordering::Relaxed),
            render_requests: self.render_requests.load(Ordering::Relaxed),
            evaluations: self.evaluations.load(Ordering::Relaxed),
            commits: self.commits.load(Ordering::Relaxed),
        }
    }
}

/// Reusable description of how a component derives props from state.
pub struct Connector<S, A, O, P> {
    projection: Arc<Projection<S, O, P>>,
    _action: PhantomData<fn(A)>,
}

impl<S, A, O, P> Clone for Connector<S, A, O, P> {
    fn clone(&self) -> Self {
        Self {
            projection: Arc::clone(&self.projection),
            _action: PhantomData,
        }
    }
}

/// Describe a connected component by its projection `(state, own props) -> props`.
pub fn bind_component<S, A, O, P, F>(projection: F) -> Connector<S, A, O, P>
where
    F: Fn(&S, &O) -> P + Send + Sync + 'static,
{
    Connector {
        projection: Arc::new(projection),
        _action: PhantomData,
    }
}

impl<S, A, O, P> Connector<S, A, O, P>
where
    S: Send + Sync + 'static,
    A: 'static,
    O: Clone + Send + 'static,
    P: ShallowEq + Clone + Send + 'static,
{
    /// Mount a binding under `parent`.
    ///
    /// Evaluates the projection once, builds the binding's own subscription
    /// node, and registers one listener on `parent` that lives until
    /// [`Binding::unmount`]. `renderer` is called with the binding whenever
    /// its derived props change.
    pub fn mount<R>(&self, parent: &Scope<S, A>, own_props: O, renderer: R) -> Result<Binding<S, A, O, P>>
    where
        R: Fn(&Binding<S, A, O, P>) + Send + Sync + 'static,
    {
        let mapped = project(&*self.projection, &parent.get_state(), &own_props)?;
        let node = SubscriptionNode::new(parent);

        let inner = Arc::new(BindingInner {
            id: parent.store().next_consumer_id(),
            parent: parent.clone(),
            node,
            projection: Arc::clone(&self.projection),
            renderer: Box::new(renderer),
            mapped: Mutex::new(mapped),
            own_props: Mutex::new(own_props),
            phase: Mutex::new(BindingPhase::Idle),
            last_error: Mutex::new(None),
            registration: Mutex::new(None),
            counters: Counters::default(),
        });
        Counters::bump(&inner.counters.evaluations);

        let weak: Weak<BindingInner<S, A, O, P>> = Arc::downgrade(&inner);
        let registration = parent.subscribe(move || {
            if let Some(inner) = weak.upgrade() {
                inner.on_parent_notify();
            }
        });
        *inner.registration.lock() = Some(registration);

        debug!(binding = %inner.id, depth = inner.node.depth(), "binding mounted");
        Ok(Binding { inner })
    }

    /// Mount under the innermost provided scope.
    pub fn mount_in_context<R>(&self, own_props: O, renderer: R) -> Result<Binding<S, A, O, P>>
    where
        R: Fn(&Binding<S, A, O, P>) + Send + Sync + 'static,
    {
        let parent = current_scope::<S, A>()?;
        self.mount(&parent, own_props, renderer)
    }
}

fn project<S, O, P>(projection: &Projection<S, O, P>, state: &S, own_props: &O) -> std::result::Result<P, ProjectionError> {
    catch_unwind(AssertUnwindSafe(|| projection(state, own_props)))
        .map_err(|payload| ProjectionError::from_panic(payload.as_ref()))
}

struct BindingInner<S, A, O, P> {
    id: ConsumerId,
    parent: Scope<S, A>,
    node: SubscriptionNode<S, A>,
    projection: Arc<Projection<S, O, P>>,
    renderer: Box<Renderer<S, A, O, P>>,
    mapped: Mutex<P>,
    own_props: Mutex<O>,
    phase: Mutex<BindingPhase>,
    last_error: Mutex<Option<ProjectionError>>,
    registration: Mutex<Option<Subscription>>,
    counters: Counters,
}

impl<S, A, O, P> BindingInner<S, A, O, P>
where
    S: Send + Sync + 'static,
    A: 'static,
    O: Clone + Send + 'static,
    P: ShallowEq + Clone + Send + 'static,
{
    fn set_phase(&self, phase: BindingPhase) {
        *self.phase.lock() = phase;
    }

    fn is_mounted(&self) -> bool {
        self.registration.lock().is_some()
    }

    fn on_parent_notify(self: &Arc<Self>) {
        Counters::bump(&self.counters.notifications);
        let previous = std::mem::replace(&mut *self.phase.lock(), BindingPhase::Evaluating);
        let render_pending = matches!(
            previous,
            BindingPhase::RenderRequested | BindingPhase::Rendered
        );

        let own_props = self.own_props.lock().clone();
        let state = self.parent.get_state();

        match catch_unwind(AssertUnwindSafe(|| (self.projection)(&state, &own_props))) {
            Ok(next) => {
                let unchanged = self.mapped.lock().shallow_eq(&next);
                if unchanged && render_pending {
                    // Descendants wait for the pending commit.
                    self.set_phase(previous);
                    Counters::bump(&self.counters.bail_outs);
                    trace!(binding = %self.id, "props unchanged, render still pending");
                } else if unchanged {
                    self.set_phase(BindingPhase::Idle);
                    Counters::bump(&self.counters.bail_outs);
                    trace!(binding = %self.id, "props unchanged, notifying descendants");
                    self.node.notify_descendants();
                } else {
                    *self.mapped.lock() = next;
                    self.request_render();
                }
            }
            Err(payload) => {
                let error = ProjectionError::from_panic(payload.as_ref());
                match self.parent.store().config().projection_failure {
                    ProjectionFailurePolicy::ForceRefresh => {
                        warn!(binding = %self.id, %error, "projection failed, forcing refresh");
                        *self.last_error.lock() = Some(error);
                        self.request_render();
                    }
                    ProjectionFailurePolicy::Propagate => {
                        self.set_phase(BindingPhase::Idle);
                        *self.last_error.lock() = Some(error);
                        resume_unwind(payload);
                    }
                }
            }
        }
    }

    fn request_render(self: &Arc<Self>) {
        self.set_phase(BindingPhase::RenderRequested);
        Counters::bump(&self.counters.render_requests);

        let weak = Arc::downgrade(self);
        self.parent.store().batcher().request(
            self.id,
            self.node.depth(),
            Box::new(move || {
                let Some(inner) = weak.upgrade() else {
                    return;
                };
                if !inner.is_mounted() {
                    return;
                }
                let binding = Binding { inner };
                (binding.inner.renderer)(&binding);
            }),
        );
    }
}

/// A mounted connection between one component and its parent scope.
///
/// Cheap to clone; all clones are the same binding.
pub struct Binding<S, A, O, P> {
    inner: Arc<BindingInner<S, A, O, P>>,
}

impl<S, A, O, P> Clone for Binding<S, A, O, P> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S, A, O, P> Binding<S, A, O, P>
where
    S: Send + Sync + 'static,
    A: 'static,
    O: Clone + Send + 'static,
    P: ShallowEq + Clone + Send + 'static,
{
    pub fn id(&self) -> ConsumerId {
        self.inner.id
    }

    /// Evaluate for a render pass.
    ///
    /// Stores `own_props` as the latest props, re-projects, and stores the
    /// result before returning it. A panicking projection is reported as
    /// [`StoreError::Projection`].
    pub fn render(&self, own_props: O) -> Result<ConnectedProps<S, A, O, P>> {
        *self.inner.own_props.lock() = own_props.clone();
        self.inner.set_phase(BindingPhase::Evaluating);

        let state = self.inner.parent.get_state();
        let mapped = match project(&*self.inner.projection, &state, &own_props) {
            Ok(mapped) => mapped,
            Err(error) => {
                self.inner.set_phase(BindingPhase::Idle);
                *self.inner.last_error.lock() = Some(error.clone());
                return Err(StoreError::Projection(error));
            }
        };

        *self.inner.mapped.lock() = mapped.clone();
        *self.inner.last_error.lock() = None;
        Counters::bump(&self.inner.counters.evaluations);
        self.inner.set_phase(BindingPhase::Rendered);

        Ok(ConnectedProps {
            own: own_props,
            mapped,
            dispatch: self.inner.parent.dispatcher(),
        })
    }

    /// Re-render with the latest own props.
    pub fn rerender(&self) -> Result<ConnectedProps<S, A, O, P>> {
        self.render(self.own_props())
    }

    /// Finish a render: notify descendants exactly once.
    ///
    /// Returns the number of descendant listeners invoked.
    pub fn commit(&self) -> usize {
        Counters::bump(&self.inner.counters.commits);
        self.inner.set_phase(BindingPhase::Idle);
        self.inner.node.notify_descendants()
    }

    /// Remove the listener registered on the parent. Idempotent.
    pub fn unmount(&self) {
        let registration = self.inner.registration.lock().take();
        if let Some(registration) = registration {
            registration.unsubscribe();
            debug!(binding = %self.inner.id, "binding unmounted");
        }
    }

    pub fn is_mounted(&self) -> bool {
        self.inner.is_mounted()
    }

    /// Latest derived props.
    pub fn mapped(&self) -> P {
        self.inner.mapped.lock().clone()
    }

    /// Latest own props.
    pub fn own_props(&self) -> O {
        self.inner.own_props.lock().clone()
    }

    pub fn phase(&self) -> BindingPhase {
        *self.inner.phase.lock()
    }

    /// Scope for children of this component.
    pub fn scope(&self) -> Scope<S, A> {
        Scope::Node(self.inner.node.clone())
    }

    pub fn dispatcher(&self) -> Dispatcher<S, A> {
        self.inner.parent.dispatcher()
    }

    /// The last projection failure, cleared by a successful render.
    pub fn last_projection_error(&self) -> Option<ProjectionError> {
        self.inner.last_error.lock().clone()
    }

    pub fn stats(&self) -> BindingStats {
        self.inner.counters.snapshot()
    }
}

impl<S, A, O, P> std::fmt::Debug for Binding<S, A, O, P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Binding")
            .field("id", &self.inner.id)
            .field("phase", &*self.inner.phase.lock())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Store;
    use std::sync::atomic::AtomicUsize;

    #[derive(Debug, Clone)]
    struct AppState {
        count: i64,
        label: Arc<str>,
    }

    enum Action {
        Increment,
        Rename(&'static str),
        Touch,
    }

    fn app_store() -> Store<AppState, Action> {
        Store::new(
            |state: &Arc<AppState>, action: &Action| match action {
                Action::Increment => Arc::new(AppState {
                    count: state.count + 1,
                    ..(**state).clone()
                }),
                Action::Rename(label) => Arc::new(AppState {
                    label: (*label).into(),
                    ..(**state).clone()
                }),
                Action::Touch => Arc::new((**state).clone()),
            },
            AppState {
                count: 0,
                label: "start".into(),
            },
        )
    }

    fn count_renders() -> (Arc<AtomicUsize>, impl Fn(&Binding<AppState, Action, (), i64>) + Send + Sync) {
        let renders = Arc::new(AtomicUsize::new(0));
        let r = renders.clone();
        (renders, move |binding: &Binding<AppState, Action, (), i64>| {
            r.fetch_add(1, Ordering::SeqCst);
            binding.rerender().unwrap();
            binding.commit();
        })
    }

    #[test]
    fn test_mount_evaluates_and_registers() {
        let store = app_store();
        let connector = bind_component(|s: &AppState, _: &()| s.count);
        let (renders, renderer) = count_renders();

        let binding = connector
            .mount(&Scope::from(store.clone()), (), renderer)
            .unwrap();

        assert_eq!(binding.mapped(), 0);
        assert_eq!(binding.phase(), BindingPhase::Idle);
        assert_eq!(store.listener_count(), 1);
        assert_eq!(renders.load(Ordering::SeqCst), 0);
        assert_eq!(binding.stats().evaluations, 1);
    }

    #[test]
    fn test_changed_props_request_render() {
        let store = app_store();
        let connector = bind_component(|s: &AppState, _: &()| s.count);
        let (renders, renderer) = count_renders();
        let binding = connector
            .mount(&Scope::from(store.clone()), (), renderer)
            .unwrap();

        store.dispatch(Action::Increment);

        assert_eq!(renders.load(Ordering::SeqCst), 1);
        assert_eq!(binding.mapped(), 1);
        assert_eq!(binding.phase(), BindingPhase::Idle);
        let stats = binding.stats();
        assert_eq!(stats.render_requests, 1);
        assert_eq!(stats.commits, 1);
        assert_eq!(stats.bail_outs, 0);
    }

    #[test]
    fn test_unchanged_props_bail_out_and_notify() {
        let store = app_store();
        let connector = bind_component(|s: &AppState, _: &()| s.count);
        let (renders, renderer) = count_renders();
        let binding = connector
            .mount(&Scope::from(store.clone()), (), renderer)
            .unwrap();

        let child_hits = Arc::new(AtomicUsize::new(0));
        let hits = child_hits.clone();
        let _child = binding.scope().subscribe(move || {
            hits.fetch_add(1, Ordering::SeqCst);
        });

        store.dispatch(Action::Rename("other"));

        assert_eq!(renders.load(Ordering::SeqCst), 0);
        assert_eq!(child_hits.load(Ordering::SeqCst), 1);
        assert_eq!(binding.stats().bail_outs, 1);
    }

    #[test]
    fn test_commit_notifies_once() {
        let store = app_store();
        let connector = bind_component(|s: &AppState, _: &()| s.count);
        let binding = connector
            .mount(&Scope::from(store.clone()), (), |_: &Binding<_, _, _, _>| {})
            .unwrap();

        let child_hits = Arc::new(AtomicUsize::new(0));
        let hits = child_hits.clone();
        let _child = binding.scope().subscribe(move || {
            hits.fetch_add(1, Ordering::SeqCst);
        });

        binding.render(()).unwrap();
        assert_eq!(binding.phase(), BindingPhase::Rendered);
        assert_eq!(binding.commit(), 1);
        assert_eq!(child_hits.load(Ordering::SeqCst), 1);
        assert_eq!(binding.phase(), BindingPhase::Idle);
    }

    #[test]
    fn test_render_request_left_pending_by_host() {
        let store = app_store();
        let connector = bind_component(|s: &AppState, _: &()| s.count);
        let binding = connector
            .mount(&Scope::from(store.clone()), (), |_: &Binding<_, _, _, _>| {})
            .unwrap();

        store.dispatch(Action::Increment);
        // Mapped props are refreshed before the host renders.
        assert_eq!(binding.mapped(), 1);
        assert_eq!(binding.phase(), BindingPhase::RenderRequested);
    }

    #[test]
    fn test_own_props_feed_projection() {
        let store = app_store();
        let connector = bind_component(|s: &AppState, step: &i64| s.count * step);
        let binding = connector
            .mount(&Scope::from(store.clone()), 2, |_: &Binding<_, _, _, _>| {})
            .unwrap();

        store.dispatch(Action::Increment);
        assert_eq!(binding.mapped(), 2);

        let props = binding.render(10).unwrap();
        assert_eq!(props.own, 10);
        assert_eq!(props.mapped, 10);
        assert_eq!(binding.own_props(), 10);

        store.dispatch(Action::Increment);
        assert_eq!(binding.mapped(), 20);
    }

    #[test]
    fn test_unmount_removes_registration() {
        let store = app_store();
        let connector = bind_component(|s: &AppState, _: &()| s.count);
        let (renders, renderer) = count_renders();
        let binding = connector
            .mount(&Scope::from(store.clone()), (), renderer)
            .unwrap();

        binding.unmount();
        binding.unmount();
        assert!(!binding.is_mounted());
        assert_eq!(store.listener_count(), 0);

        store.dispatch(Action::Increment);
        assert_eq!(renders.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_dropping_binding_releases_registration() {
        let store = app_store();
        let connector = bind_component(|s: &AppState, _: &()| s.count);
        let binding = connector
            .mount(&Scope::from(store.clone()), (), |_: &Binding<_, _, _, _>| {})
            .unwrap();
        assert_eq!(store.listener_count(), 1);

        drop(binding);
        assert_eq!(store.listener_count(), 0);
    }

    #[test]
    fn test_projection_panic_forces_refresh() {
        let store = app_store();
        let connector = bind_component(|s: &AppState, _: &()| {
            if s.count == 1 {
                panic!("count one is cursed");
            }
            s.count
        });
        let renders = Arc::new(AtomicUsize::new(0));
        let r = renders.clone();
        let binding = connector
            .mount(&Scope::from(store.clone()), (), move |_: &Binding<_, _, _, _>| {
                r.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();

        store.dispatch(Action::Increment);

        assert_eq!(renders.load(Ordering::SeqCst), 1);
        assert_eq!(
            binding.last_projection_error().unwrap().message,
            "count one is cursed"
        );
        // The render path reports the failure explicitly.
        assert!(matches!(binding.rerender(), Err(StoreError::Projection(_))));

        store.dispatch(Action::Increment);
        assert_eq!(binding.rerender().unwrap().mapped, 2);
        assert!(binding.last_projection_error().is_none());
    }

    #[test]
    fn test_mount_reports_projection_failure() {
        let store = app_store();
        let connector = bind_component(|_: &AppState, _: &()| -> i64 { panic!("bad mount") });
        let result = connector.mount(&Scope::from(store.clone()), (), |_: &Binding<_, _, _, _>| {});
        assert!(matches!(result, Err(StoreError::Projection(_))));
        assert_eq!(store.listener_count(), 0);
    }

    #[test]
    fn test_mount_in_context_requires_provider() {
        let connector = bind_component(|s: &AppState, _: &()| s.count);
        let result = connector.mount_in_context((), |_: &Binding<AppState, Action, (), i64>| {});
        assert!(matches!(result, Err(StoreError::MissingProvider { .. })));

        let store = app_store();
        let binding = crate::scope::provide(Scope::from(store.clone()), || {
            connector.mount_in_context((), |_: &Binding<_, _, _, _>| {})
        })
        .unwrap();
        assert_eq!(binding.scope().depth(), 1);
        assert!(binding.dispatcher().ptr_eq(&store.dispatcher()));
    }

    #[test]
    fn test_identical_state_still_bails_out_for_fresh_state_copy() {
        let store = app_store();
        let connector = bind_component(|s: &AppState, _: &()| s.count);
        let (renders, renderer) = count_renders();
        let _binding = connector
            .mount(&Scope::from(store.clone()), (), renderer)
            .unwrap();

        // New state reference, same derived value.
        store.dispatch(Action::Touch);
        assert_eq!(renders.load(Ordering::SeqCst), 0);
    }
}
