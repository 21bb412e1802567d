#![forbid(unsafe_code)]

//! Watchers: tracked functions that rerun when what they read changes.
//!
//! # Lifecycle
//!
//! A [`Watcher`] runs its function once, synchronously, on creation. Each run
//! pushes a fresh collector, invokes the function, pops the collector and
//! then reconciles notifications for the new dependency set. On every change
//! notification the watcher compares live values against its snapshot and
//! reruns only if something it read actually changed.
//!
//! ```text
//! constructing -> running -> idle -> running -> ... -> disposed
//! ```
//!
//! # Notification
//!
//! With [`NotifyMode::PerOwner`] the watcher subscribes to every owner it
//! touched in its last run, dropping subscriptions for owners it no longer
//! touches. Owners without per-object notifications put the watcher on the
//! global fan-out instead. With [`NotifyMode::Global`] it always relies on
//! the global fan-out.
//!
//! # Invariants
//!
//! 1. The function runs exactly once before the constructor returns.
//! 2. The dependency snapshot is rebuilt from scratch on every run.
//! 3. Live subscriptions always match the owners touched by the last run.
//! 4. After [`dispose`](Watcher::dispose) no rerun happens; repeated
//!    disposal is a no-op. Dropping the handle disposes.
//!
//! # Failure Modes
//!
//! - **Tracked function panics**: the panic propagates to whoever caused the
//!   run. The collector is popped, the running flag cleared and the partial
//!   dependency set committed, so the watcher keeps reacting afterwards.
//! - **Writes during its own run**: the notification is remembered. Once the
//!   run commits, the new snapshot is checked again and, if a value it read
//!   has moved on, a rerun is requested through the batching path. A function
//!   that keeps writing a fresh value to something it reads never settles.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

use ahash::AHashMap;

use crate::batch::{BatchCallback, CallbackId, register_batch_callback};
use crate::collector::{Collector, CollectorGuard};
use crate::config::NotifyMode;
use crate::dependency::DependencyMap;
use crate::owner::{OwnerId, OwnerRef};
use crate::signal::{change_count, owner_listener, register_fan_out, unregister_fan_out};
use crate::subscription::Subscription;
use crate::value::{Key, Value};

/// Total number of tracked function runs, initial runs included.
static WATCHER_RUNS_TOTAL: AtomicU64 = AtomicU64::new(0);

/// Total number of notifications that found nothing changed.
static WATCHER_RERUNS_SKIPPED_TOTAL: AtomicU64 = AtomicU64::new(0);

#[must_use]
pub fn watcher_runs_total() -> u64 {
    WATCHER_RUNS_TOTAL.load(Ordering::Relaxed)
}

#[must_use]
pub fn watcher_reruns_skipped_total() -> u64 {
    WATCHER_RERUNS_SKIPPED_TOTAL.load(Ordering::Relaxed)
}

/// Collector for a single run.
#[derive(Default)]
struct RunCollector {
    deps: RefCell<DependencyMap>,
}

impl Collector for RunCollector {
    fn add(&self, owner: &OwnerRef, key: &Key, value: &Value) {
        self.deps.borrow_mut().record(owner, key, value);
    }
}

struct WatcherInner {
    mode: NotifyMode,
    func: RefCell<Box<dyn FnMut()>>,
    deps: RefCell<DependencyMap>,
    /// `None` marks a touched owner without per-object notifications.
    subscriptions: RefCell<AHashMap<OwnerId, Option<Subscription>>>,
    callback: BatchCallback,
    fan_out: Cell<bool>,
    running: Cell<bool>,
    /// Set when a notification arrives while `running`.
    missed: Cell<bool>,
    disposed: Cell<bool>,
    cleanup: RefCell<Option<Box<dyn FnOnce()>>>,
}

impl WatcherInner {
    fn id(&self) -> u64 {
        self.callback.id().raw()
    }

    /// Rerun-candidate entry point: rerun only if a dependency changed.
    fn notify(self: &Rc<Self>) {
        if self.disposed.get() {
            return;
        }
        if self.running.get() {
            self.missed.set(true);
            return;
        }
        let changed = self.deps.borrow().is_changed();
        if changed {
            tracing::trace!(message = "watcher.changed", id = self.id());
            self.run();
        } else {
            WATCHER_RERUNS_SKIPPED_TOTAL.fetch_add(1, Ordering::Relaxed);
            tracing::trace!(message = "watcher.unchanged", id = self.id());
        }
    }

    fn run(self: &Rc<Self>) {
        WATCHER_RUNS_TOTAL.fetch_add(1, Ordering::Relaxed);
        self.deps.borrow_mut().clear();
        let collector = Rc::new(RunCollector::default());
        // Dropped in reverse order: function borrow, collector, then commit.
        let _run = RunGuard::enter(self, Rc::clone(&collector));
        let _tracking = CollectorGuard::push(collector);
        let mut func = self.func.borrow_mut();
        (*func)();
    }

    /// Bring subscriptions and fan-out registration in line with `deps`.
    fn reconcile(&self) {
        let mut released = Vec::new();
        let mut needs_fan_out = self.mode == NotifyMode::Global;
        {
            let deps = self.deps.borrow();
            let mut subscriptions = self.subscriptions.borrow_mut();
            subscriptions.retain(|id, sub| {
                let keep = deps.contains_owner(*id);
                if !keep {
                    released.push(sub.take());
                }
                keep
            });
            if self.mode == NotifyMode::PerOwner {
                for owner in deps.owners() {
                    let entry = subscriptions
                        .entry(owner.owner_id())
                        .or_insert_with(|| owner.subscribe(owner_listener(&self.callback), true));
                    needs_fan_out |= entry.is_none();
                }
            }
            tracing::trace!(
                message = "watcher.reconcile",
                id = self.id(),
                owners = deps.owner_count(),
                keys = deps.key_count(),
                released = released.len(),
                fan_out = needs_fan_out
            );
        }
        drop(released);
        self.set_fan_out(needs_fan_out);
    }

    fn set_fan_out(&self, on: bool) {
        if self.fan_out.replace(on) == on {
            return;
        }
        if on {
            register_fan_out(&self.callback);
        } else {
            unregister_fan_out(self.callback.id());
        }
    }

    fn dispose(&self) {
        if self.disposed.replace(true) {
            return;
        }
        let subscriptions = std::mem::take(&mut *self.subscriptions.borrow_mut());
        let released = subscriptions.values().filter(|sub| sub.is_some()).count();
        drop(subscriptions);
        self.set_fan_out(false);
        if let Ok(mut deps) = self.deps.try_borrow_mut() {
            deps.clear();
        }
        // Release captures unless the function is disposing itself mid-run.
        if let Ok(mut func) = self.func.try_borrow_mut() {
            *func = Box::new(|| {});
        }
        tracing::debug!(message = "watcher.dispose", id = self.id(), released);
        let cleanup = self.cleanup.borrow_mut().take();
        if let Some(cleanup) = cleanup {
            cleanup();
        }
    }
}

/// Marks a watcher as running and commits the collected dependencies when
/// dropped, including during unwinding.
struct RunGuard<'a> {
    watcher: &'a Rc<WatcherInner>,
    collector: Rc<RunCollector>,
    changes: u64,
}

impl<'a> RunGuard<'a> {
    fn enter(watcher: &'a Rc<WatcherInner>, collector: Rc<RunCollector>) -> Self {
        watcher.running.set(true);
        watcher.missed.set(false);
        Self {
            watcher,
            collector,
            changes: change_count(),
        }
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        let watcher = self.watcher;
        let deps = std::mem::take(&mut *self.collector.deps.borrow_mut());
        watcher.running.set(false);
        let missed = watcher.missed.replace(false);
        if watcher.disposed.get() {
            return;
        }
        *watcher.deps.borrow_mut() = deps;
        watcher.reconcile();
        if std::thread::panicking() {
            return;
        }
        // Owners first touched during this run had no subscription yet, so a
        // global change signal also counts as a missed notification.
        if !missed && change_count() == self.changes {
            return;
        }
        let stale = watcher.deps.borrow().is_changed();
        if stale {
            tracing::trace!(message = "watcher.stale", id = watcher.id());
            register_batch_callback(&watcher.callback);
        }
    }
}

/// Handle to a running watcher. Dropping it disposes the watcher.
#[must_use = "dropping a Watcher disposes it immediately"]
pub struct Watcher {
    inner: Rc<WatcherInner>,
}

impl Watcher {
    /// Create a watcher and run `f` once.
    pub fn new(mode: NotifyMode, f: impl FnMut() + 'static) -> Self {
        Self::build(mode, Box::new(f), None)
    }

    /// Create a watcher whose disposal also runs `cleanup` exactly once,
    /// after every subscription is released.
    pub fn with_cleanup(
        mode: NotifyMode,
        f: impl FnMut() + 'static,
        cleanup: impl FnOnce() + 'static,
    ) -> Self {
        Self::build(mode, Box::new(f), Some(Box::new(cleanup)))
    }

    fn build(
        mode: NotifyMode,
        func: Box<dyn FnMut()>,
        cleanup: Option<Box<dyn FnOnce()>>,
    ) -> Self {
        let inner = Rc::new_cyclic(|weak: &Weak<WatcherInner>| {
            let weak = weak.clone();
            WatcherInner {
                mode,
                func: RefCell::new(func),
                deps: RefCell::new(DependencyMap::new()),
                subscriptions: RefCell::new(AHashMap::new()),
                callback: BatchCallback::new(move || {
                    if let Some(inner) = weak.upgrade() {
                        inner.notify();
                    }
                }),
                fan_out: Cell::new(false),
                running: Cell::new(false),
                missed: Cell::new(false),
                disposed: Cell::new(false),
                cleanup: RefCell::new(cleanup),
            }
        });
        tracing::debug!(message = "watcher.create", id = inner.id(), mode = %mode);
        let watcher = Self { inner };
        watcher.inner.run();
        watcher
    }

    /// Stop reacting and release every subscription. Idempotent.
    pub fn dispose(&self) {
        self.inner.dispose();
    }

    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.get()
    }

    /// Whether a dependency changed since the last run.
    #[must_use]
    pub fn is_changed(&self) -> bool {
        !self.is_disposed() && self.inner.deps.borrow().is_changed()
    }

    #[must_use]
    pub fn id(&self) -> CallbackId {
        self.inner.callback.id()
    }

    #[must_use]
    pub fn mode(&self) -> NotifyMode {
        self.inner.mode
    }

    /// Number of `(owner, key)` pairs read by the last run.
    #[must_use]
    pub fn dependency_count(&self) -> usize {
        self.inner.deps.borrow().key_count()
    }

    /// Number of live per-owner subscriptions.
    #[must_use]
    pub fn subscription_count(&self) -> usize {
        self.inner
            .subscriptions
            .borrow()
            .values()
            .filter(|sub| sub.is_some())
            .count()
    }

    /// Whether the watcher is registered for global fan-out.
    #[must_use]
    pub fn is_fan_out(&self) -> bool {
        self.inner.fan_out.get()
    }
}

impl Drop for Watcher {
    fn drop(&mut self) {
        self.inner.dispose();
    }
}

impl fmt::Debug for Watcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Watcher")
            .field("id", &self.inner.id())
            .field("mode", &self.inner.mode)
            .field("disposed", &self.inner.disposed.get())
            .field("dependencies", &self.dependency_count())
            .finish()
    }
}

/// Watch `f` with per-owner notifications.
pub fn watch(f: impl FnMut() + 'static) -> Watcher {
    Watcher::new(NotifyMode::default(), f)
}

/// Like [`watch`], running `cleanup` once when the watcher is disposed.
pub fn effect(f: impl FnMut() + 'static, cleanup: impl FnOnce() + 'static) -> Watcher {
    Watcher::with_cleanup(NotifyMode::default(), f, cleanup)
}
