//! Subscription system for store notifications.
//!
//! This module provides the listener plumbing of the container:
//! - Registration-ordered listener lists with independent unsubscribe handles
//! - Subscription nodes: scoped channels that mirror the component tree
//! - Channel-backed watchers for consumers outside the notification wave
//!
//! # Example
//!
//! ```ignore
//! let store = Store::new(reducer, AppState::default());
//! let root = Scope::from(store.clone());
//!
//! // A node for one subtree of the component tree
//! let node = SubscriptionNode::new(&root);
//! let _sub = node.subscribe(|| println!("subtree may need to re-evaluate"));
//!
//! // Fires only this subtree's listeners; state is untouched
//! node.notify_descendants();
//! ```

mod listeners;
mod node;
mod watch;

pub(crate) use listeners::ListenerList;
pub use listeners::Subscription;
pub use node::SubscriptionNode;
pub use watch::StateWatch;
pub(crate) use watch::WatchList;
