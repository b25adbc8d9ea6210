//! # Statewire
//!
//! A minimal state container with a tree of subscription nodes that lets
//! bound components re-render top-down and skip work when their projected
//! props are shallowly equal.
//!
//! ## Core Concepts
//!
//! - **Store**: State, a pure reducer, and registration-ordered listeners
//! - **Subscription nodes**: Per-binding listener lists chained to a parent
//! - **Bindings**: Project state into props and bail out on shallow equality
//! - **Batching**: Render requests from one dispatch are committed together
//!
//! ## Example
//!
//! ```ignore
//! use statewire::{bind_component, create_store, props, Props, Scope};
//! use std::sync::Arc;
//!
//! let store = create_store(|count: &Arc<i64>, delta: &i64| Arc::new(**count + delta), 0);
//!
//! let counter = bind_component(|count: &i64, _own: &Props| props! { "count" => *count });
//! let binding = counter.mount(&Scope::from(store.clone()), Props::new(), |b| {
//!     println!("count = {:?}", b.mapped().get("count"));
//!     b.commit();
//! })?;
//!
//! store.dispatch(1);
//! ```

#![forbid(unsafe_code)]

pub mod batch;
pub mod binding;
pub mod error;
pub mod props;
pub mod scope;
pub mod store;
pub mod subscriptions;
pub mod types;

// Re-exports
pub use batch::{BatchScope, Batcher};
pub use binding::{
    bind_component, get_selection, Binding, BindingPhase, ConnectedProps, Connector, Selection,
};
pub use error::{ProjectionError, Result, StoreError};
pub use props::{shallow_equal, Identical, PropValue, Props, ShallowEq};
pub use scope::{current_scope, get_dispatcher, provide, Scope};
pub use store::{create_store, Dispatcher, Reducer, Store, StoreConfig};
pub use subscriptions::{StateWatch, Subscription, SubscriptionNode};
pub use types::*;
