#![forbid(unsafe_code)]

//! Batching of rerun requests.
//!
//! [`batch`] opens a frame on the thread's batch stack. While any frame is
//! open, [`register_batch_callback`] adds callbacks to the innermost frame's
//! pending set instead of invoking them. When a frame closes its pending set
//! is merged into the parent frame; when the outermost frame closes, each
//! distinct callback is invoked exactly once, in first-enqueued order.
//!
//! # Invariants
//!
//! 1. A callback enqueued several times in one frame runs once.
//! 2. Nothing enqueued inside a nested frame runs before the outermost frame
//!    closes.
//! 3. Frames are popped by an RAII guard, so a panicking batch body leaves
//!    the stack balanced.
//!
//! # Failure Modes
//!
//! - **Body panics in the outermost frame**: pending callbacks are dropped
//!   instead of flushed. Watchers re-check their snapshot on the next
//!   notification, so the missed change is still picked up then.
//! - **A flushed callback panics**: the remaining callbacks of the frame
//!   still run, then the first panic is resumed. Later panics from the same
//!   flush are dropped.

use std::collections::hash_map::Entry;
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use ahash::AHashMap;

use crate::runtime::Runtime;

static NEXT_CALLBACK_ID: AtomicU64 = AtomicU64::new(1);

/// Total number of outermost batch frames that flushed callbacks.
static BATCH_FLUSHES_TOTAL: AtomicU64 = AtomicU64::new(0);

/// Read the total batch flush count (for diagnostics).
#[must_use]
pub fn batch_flushes_total() -> u64 {
    BATCH_FLUSHES_TOTAL.load(Ordering::Relaxed)
}

/// Identity of a [`BatchCallback`]; pending sets deduplicate on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CallbackId(u64);

impl CallbackId {
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

/// A rerun request that can be deferred by a batch frame.
///
/// Clones share identity, so enqueueing any clone twice in one frame still
/// runs the callback once.
#[derive(Clone)]
pub struct BatchCallback {
    id: CallbackId,
    run: Rc<dyn Fn()>,
}

impl BatchCallback {
    pub fn new(run: impl Fn() + 'static) -> Self {
        Self {
            id: CallbackId(NEXT_CALLBACK_ID.fetch_add(1, Ordering::Relaxed)),
            run: Rc::new(run),
        }
    }

    #[must_use]
    pub fn id(&self) -> CallbackId {
        self.id
    }

    /// Invoke the callback now, bypassing any batch frame.
    pub fn invoke(&self) {
        (self.run)();
    }
}

impl fmt::Debug for BatchCallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("BatchCallback").field(&self.id).finish()
    }
}

/// Insertion-ordered set of pending callbacks for one frame.
#[derive(Default)]
pub(crate) struct PendingSet {
    order: Vec<BatchCallback>,
    index: AHashMap<CallbackId, usize>,
}

impl PendingSet {
    fn insert(&mut self, callback: BatchCallback) {
        if let Entry::Vacant(slot) = self.index.entry(callback.id) {
            slot.insert(self.order.len());
            self.order.push(callback);
        }
    }

    fn merge(&mut self, other: PendingSet) {
        for callback in other.order {
            self.insert(callback);
        }
    }

    fn len(&self) -> usize {
        self.order.len()
    }
}

/// Request `callback` to run, deferring it if a batch frame is open.
pub fn register_batch_callback(callback: &BatchCallback) {
    let deferred = Runtime::with(|rt| match rt.batches.borrow_mut().last_mut() {
        Some(frame) => {
            frame.insert(callback.clone());
            true
        }
        None => false,
    });
    if !deferred {
        callback.invoke();
    }
}

/// Whether a batch frame is open on this thread.
#[must_use]
pub fn in_batch() -> bool {
    Runtime::with(|rt| !rt.batches.borrow().is_empty())
}

/// Run `f` with rerun requests coalesced until the outermost batch exits.
///
/// The return value of `f` is passed through.
pub fn batch<T>(f: impl FnOnce() -> T) -> T {
    let scope = BatchScope::new();
    let out = f();
    drop(scope);
    out
}

/// RAII batch frame. Opening one is equivalent to entering [`batch`]; the
/// frame closes (merging or flushing) when the scope is dropped.
#[must_use = "the batch frame closes as soon as the scope is dropped"]
pub struct BatchScope {
    depth: usize,
}

impl BatchScope {
    pub fn new() -> Self {
        let depth = Runtime::with(|rt| {
            let mut frames = rt.batches.borrow_mut();
            frames.push(PendingSet::default());
            frames.len()
        });
        Self { depth }
    }

    /// Nesting depth of this frame, starting at 1 for the outermost.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.depth
    }
}

impl Default for BatchScope {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for BatchScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchScope")
            .field("depth", &self.depth)
            .finish()
    }
}

impl Drop for BatchScope {
    fn drop(&mut self) {
        let depth = self.depth;
        let flush = Runtime::try_with(|rt| {
            let mut frames = rt.batches.borrow_mut();
            debug_assert_eq!(frames.len(), depth, "batch scopes dropped out of order");
            let frame = frames.pop()?;
            match frames.last_mut() {
                Some(parent) => {
                    parent.merge(frame);
                    None
                }
                None => Some(frame),
            }
        })
        .flatten();

        let Some(frame) = flush else {
            return;
        };
        if std::thread::panicking() {
            tracing::debug!(message = "batch.discard", pending = frame.len());
            return;
        }
        BATCH_FLUSHES_TOTAL.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(message = "batch.flush", pending = frame.len());
        let mut first_panic = None;
        for callback in frame.order {
            let outcome =
                std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| callback.invoke()));
            if let Err(payload) = outcome {
                tracing::debug!(message = "batch.callback_panicked", id = callback.id().raw());
                first_panic.get_or_insert(payload);
            }
        }
        if let Some(payload) = first_panic {
            std::panic::resume_unwind(payload);
        }
    }
}
