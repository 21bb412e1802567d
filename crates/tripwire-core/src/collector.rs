#![forbid(unsafe_code)]

//! Dependency collection.
//!
//! Containers call [`report_read`] on every trackable read. The read is
//! forwarded to the innermost active [`Collector`], if any. Collectors are
//! activated with a [`CollectorGuard`], which pops the collector when dropped,
//! including during unwinding, so a panicking tracked function never leaves
//! tracking enabled for unrelated code.

use std::rc::Rc;

use crate::owner::OwnerRef;
use crate::runtime::Runtime;
use crate::value::{Key, Value};

/// Receives reads while active.
pub trait Collector {
    fn add(&self, owner: &OwnerRef, key: &Key, value: &Value);
}

/// Report that `key` on `owner` was read with `value`.
///
/// No-op unless a collector is active.
pub fn report_read(owner: &OwnerRef, key: &Key, value: &Value) {
    let top = Runtime::with(|rt| rt.collectors.borrow().last().cloned());
    if let Some(collector) = top {
        collector.add(owner, key, value);
    }
}

/// Whether a collector is currently active on this thread.
#[must_use]
pub fn is_tracking() -> bool {
    Runtime::with(|rt| !rt.collectors.borrow().is_empty())
}

/// Run `f` with every active collector suspended.
///
/// Reads inside `f` are not recorded and [`is_tracking`] reports `false`.
pub fn untracked<T>(f: impl FnOnce() -> T) -> T {
    let _suspend = SuspendGuard::new();
    f()
}

/// Keeps a collector on top of the stack for its lifetime.
#[must_use = "the collector is popped as soon as the guard is dropped"]
pub struct CollectorGuard {
    depth: usize,
}

impl CollectorGuard {
    /// Push `collector` as the innermost active collector.
    pub fn push(collector: Rc<dyn Collector>) -> Self {
        let depth = Runtime::with(|rt| {
            let mut stack = rt.collectors.borrow_mut();
            stack.push(collector);
            stack.len()
        });
        tracing::trace!(message = "collector.push", depth);
        Self { depth }
    }
}

impl Drop for CollectorGuard {
    fn drop(&mut self) {
        let depth = self.depth;
        Runtime::try_with(|rt| {
            let mut stack = rt.collectors.borrow_mut();
            debug_assert_eq!(stack.len(), depth, "collector guards dropped out of order");
            stack.pop();
        });
        tracing::trace!(message = "collector.pop", depth);
    }
}

struct SuspendGuard {
    saved: Vec<Rc<dyn Collector>>,
}

impl SuspendGuard {
    fn new() -> Self {
        let saved = Runtime::with(|rt| std::mem::take(&mut *rt.collectors.borrow_mut()));
        Self { saved }
    }
}

impl Drop for SuspendGuard {
    fn drop(&mut self) {
        let saved = std::mem::take(&mut self.saved);
        Runtime::try_with(|rt| {
            let mut stack = rt.collectors.borrow_mut();
            // Collectors pushed inside the untracked region are already popped.
            debug_assert!(stack.is_empty());
            *stack = saved;
        });
    }
}
