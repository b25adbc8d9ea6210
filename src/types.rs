//! Core types shared across the store, subscription nodes and bindings.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of one listener registration.
///
/// Subscribing the same closure twice yields two ids, each removed
/// independently.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ListenerId(pub u64);

impl fmt::Debug for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ListenerId({})", self.0)
    }
}

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a render consumer (a binding or a selection) within a store.
///
/// Used as the deduplication key for batched render requests.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ConsumerId(pub u64);

impl fmt::Debug for ConsumerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ConsumerId({})", self.0)
    }
}

impl fmt::Display for ConsumerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What a binding does when its projection panics during a notification.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectionFailurePolicy {
    /// Log, remember the failure, and request a render anyway.
    #[default]
    ForceRefresh,
    /// Resume the panic into whoever triggered the notification.
    Propagate,
}

/// Store statistics.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreStats {
    /// Number of completed `dispatch` calls.
    pub dispatches: u64,
    /// Dispatches whose reducer returned a new state reference.
    pub state_changes: u64,
    /// Listeners currently registered on the root store.
    pub listeners: usize,
    /// Batches that flushed at least one render request.
    pub batches_flushed: u64,
}

/// Per-binding counters, mostly useful for tests and diagnostics.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BindingStats {
    /// Notifications received from the parent scope.
    pub notifications: u64,
    /// Notifications where derived props were unchanged.
    pub bail_outs: u64,
    /// Render requests handed to the batcher.
    pub render_requests: u64,
    /// Calls to `render` (including the initial evaluation at mount).
    pub evaluations: u64,
    /// Calls to `commit`.
    pub commits: u64,
}
