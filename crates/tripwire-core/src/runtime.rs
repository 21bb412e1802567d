#![forbid(unsafe_code)]

//! Thread-confined reactive context.
//!
//! The collector stack, the batch-frame stack and the global fan-out
//! registry live in one [`Runtime`] per thread, together with a count of
//! change signals so a run can tell whether anything was written meanwhile.
//! Every push onto either stack is paired with an RAII guard that pops it,
//! so at rest both stacks are empty and there is nothing to initialize or
//! tear down.

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::rc::Rc;

use crate::batch::{BatchCallback, CallbackId, PendingSet};
use crate::collector::Collector;

thread_local! {
    static RUNTIME: Runtime = Runtime::default();
}

#[derive(Default)]
pub(crate) struct Runtime {
    /// Active collectors, innermost last.
    pub(crate) collectors: RefCell<Vec<Rc<dyn Collector>>>,
    /// Open batch frames, innermost last.
    pub(crate) batches: RefCell<Vec<PendingSet>>,
    /// Watchers notified by every global change signal, in creation order.
    pub(crate) fan_out: RefCell<BTreeMap<CallbackId, BatchCallback>>,
    /// Number of global change signals seen so far.
    pub(crate) changes: Cell<u64>,
}

impl Runtime {
    pub(crate) fn with<R>(f: impl FnOnce(&Runtime) -> R) -> R {
        RUNTIME.with(f)
    }

    /// Like [`with`](Self::with) but tolerates access during thread-local
    /// destruction, where it returns `None`.
    pub(crate) fn try_with<R>(f: impl FnOnce(&Runtime) -> R) -> Option<R> {
        RUNTIME.try_with(f).ok()
    }
}
