//! Batching of render requests issued during a notification wave.
//!
//! Listeners always run synchronously and in order. What the batcher changes
//! is when consumers' render requests reach the host: inside a batch they are
//! queued, deduplicated per consumer, and run once the outermost batch exits.
//!
//! # Invariants
//!
//! 1. Nested scopes are supported; only the outermost exit flushes.
//! 2. A consumer appears at most once in the queue.
//! 3. The queue drains shallowest-first (then in request order), so a parent
//!    commits before its descendants re-evaluate.
//! 4. Requests issued while flushing join the running flush.
//! 5. Unwinding out of a batch discards the queue instead of flushing it.

use crate::types::ConsumerId;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashSet};
use tracing::{debug, trace};

/// A deferred render, run at most once.
pub(crate) type RenderTask = Box<dyn FnOnce() + Send>;

#[derive(Default)]
struct BatchState {
    depth: usize,
    flushing: bool,
    next_seq: u64,
    queue: BTreeMap<(usize, u64), (ConsumerId, RenderTask)>,
    queued: HashSet<ConsumerId>,
    flushed: u64,
}

/// Render-request envelope owned by a store.
pub struct Batcher {
    enabled: bool,
    state: Mutex<BatchState>,
}

impl Batcher {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            state: Mutex::new(BatchState::default()),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Whether requests are currently being deferred.
    pub fn is_batching(&self) -> bool {
        let state = self.state.lock();
        self.enabled && (state.depth > 0 || state.flushing)
    }

    /// Enter a batch; it ends when the guard drops.
    pub fn enter(&self) -> BatchScope<'_> {
        self.state.lock().depth += 1;
        BatchScope { batcher: self }
    }

    /// Run `f` inside a batch.
    pub fn run_batched<R>(&self, f: impl FnOnce() -> R) -> R {
        let _scope = self.enter();
        f()
    }

    /// Requests waiting for the current batch to end.
    pub fn pending(&self) -> usize {
        self.state.lock().queue.len()
    }

    /// Number of batches that flushed at least one request.
    pub fn batches_flushed(&self) -> u64 {
        self.state.lock().flushed
    }

    /// Queue a render for `consumer`, or run it now when not batching.
    pub(crate) fn request(&self, consumer: ConsumerId, depth: usize, task: RenderTask) {
        let mut state = self.state.lock();
        if self.enabled && (state.depth > 0 || state.flushing) {
            if state.queued.insert(consumer) {
                let seq = state.next_seq;
                state.next_seq += 1;
                state.queue.insert((depth, seq), (consumer, task));
            } else {
                trace!(consumer = %consumer, "render already queued");
            }
            return;
        }
        drop(state);
        task();
    }

    fn exit(&self) {
        let mut state = self.state.lock();
        state.depth -= 1;
        if state.depth > 0 || state.flushing {
            return;
        }
        if std::thread::panicking() {
            state.queue.clear();
            state.queued.clear();
            return;
        }
        if state.queue.is_empty() {
            return;
        }
        state.flushing = true;
        drop(state);
        self.flush();
    }

    fn flush(&self) {
        let _reset = FlushReset { batcher: self };
        let mut rendered = 0usize;
        loop {
            let task = {
                let mut state = self.state.lock();
                match state.queue.pop_first() {
                    Some((_, (consumer, task))) => {
                        state.queued.remove(&consumer);
                        task
                    }
                    None => {
                        state.flushed += 1;
                        break;
                    }
                }
            };
            task();
            rendered += 1;
        }
        debug!(rendered, "batch flushed");
    }
}

impl Default for Batcher {
    fn default() -> Self {
        Self::new(true)
    }
}

/// Guard returned by [`Batcher::enter`].
#[must_use = "the batch ends when the scope is dropped"]
pub struct BatchScope<'a> {
    batcher: &'a Batcher,
}

impl Drop for BatchScope<'_> {
    fn drop(&mut self) {
        self.batcher.exit();
    }
}

/// Clears the flushing flag even if a render task unwinds.
struct FlushReset<'a> {
    batcher: &'a Batcher,
}

impl Drop for FlushReset<'_> {
    fn drop(&mut self) {
        let mut state = self.batcher.state.lock();
        state.flushing = false;
        if std::thread::panicking() {
            state.queue.clear();
            state.queued.clear();
        }
    }
}
