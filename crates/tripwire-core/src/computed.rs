#![forbid(unsafe_code)]

//! Derived values materialized into an observable container.
//!
//! # Design
//!
//! [`Computed`] owns a fresh container produced by the engine's bound
//! [`ContainerFactory`] and one [`Watcher`] per getter. Each watcher
//! evaluates its getter and writes the result into the container under the
//! getter's key, so sibling keys recompute independently and downstream
//! watchers can track computed keys like any other container key.
//!
//! # Invariants
//!
//! 1. Every key holds its getter's value as soon as construction returns.
//! 2. A key is rewritten only when something its getter read has changed.
//! 3. After [`dispose`](Computed::dispose) the container keeps the last
//!    values and is never written again.
//!
//! # Failure Modes
//!
//! - **Getter panics during construction**: watchers created so far are
//!   disposed while the panic unwinds; nothing leaks.
//! - **Getter panics on a rerun**: the key keeps its previous value and the
//!   panic reaches whoever wrote the dependency.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::config::NotifyMode;
use crate::owner::{ContainerRef, OwnerRef};
use crate::value::{Key, Value};
use crate::watcher::Watcher;

/// A getter evaluated under tracking.
pub type Getter = Box<dyn Fn() -> Value>;

/// Ordered `key -> getter` pairs for [`Reactive::computed`](crate::Reactive::computed).
#[derive(Default)]
pub struct Getters {
    entries: Vec<(Key, Getter)>,
}

impl Getters {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a getter. A later getter for the same key replaces the earlier one.
    #[must_use]
    pub fn with<V, F>(mut self, key: impl Into<Key>, getter: F) -> Self
    where
        V: Into<Value>,
        F: Fn() -> V + 'static,
    {
        let key = key.into();
        self.entries.retain(|(existing, _)| *existing != key);
        self.entries.push((key, Box::new(move || getter().into())));
        self
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl IntoIterator for Getters {
    type Item = (Key, Getter);
    type IntoIter = std::vec::IntoIter<(Key, Getter)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl fmt::Debug for Getters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.entries.iter().map(|(key, _)| key))
            .finish()
    }
}

/// Result container plus the watchers keeping it up to date.
///
/// Dropping a `Computed` disposes it.
#[must_use = "dropping a Computed disposes it immediately"]
pub struct Computed {
    state: ContainerRef,
    keys: Vec<Key>,
    watchers: RefCell<Vec<Watcher>>,
}

impl Computed {
    pub(crate) fn new(state: ContainerRef, mode: NotifyMode, getters: Getters) -> Self {
        let mut computed = Self {
            state,
            keys: Vec::with_capacity(getters.len()),
            watchers: RefCell::new(Vec::with_capacity(getters.len())),
        };
        for (key, getter) in getters {
            let target = ContainerRef::clone(&computed.state);
            let slot = key.clone();
            let watcher = Watcher::new(mode, move || target.set(slot.clone(), getter()));
            computed.keys.push(key);
            computed.watchers.borrow_mut().push(watcher);
        }
        tracing::debug!(message = "computed.create", keys = computed.keys.len());
        computed
    }

    /// The container holding computed values. Reads through it are tracked.
    #[must_use]
    pub fn state(&self) -> &ContainerRef {
        &self.state
    }

    /// The owner behind [`state`](Self::state).
    #[must_use]
    pub fn owner(&self) -> OwnerRef {
        Rc::clone(&self.state).owner()
    }

    /// Tracked read of a computed key.
    pub fn get(&self, key: impl Into<Key>) -> Value {
        self.state.get(&key.into())
    }

    /// Computed keys, in getter order.
    #[must_use]
    pub fn keys(&self) -> &[Key] {
        &self.keys
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Tear down every per-key watcher. Idempotent.
    pub fn dispose(&self) {
        let watchers = std::mem::take(&mut *self.watchers.borrow_mut());
        if watchers.is_empty() {
            return;
        }
        tracing::debug!(message = "computed.dispose", keys = watchers.len());
        for watcher in &watchers {
            watcher.dispose();
        }
    }

    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.watchers.borrow().is_empty()
    }
}

impl Drop for Computed {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl fmt::Debug for Computed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Computed")
            .field("keys", &self.keys)
            .field("disposed", &self.is_disposed())
            .finish()
    }
}
