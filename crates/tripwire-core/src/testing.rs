#![forbid(unsafe_code)]

//! Minimal in-memory owner for unit tests.
//!
//! Unlike a real store, [`MockOwner::write`] always notifies, even when the
//! value is unchanged, so tests exercise the engine's own filtering. Nested
//! owners do not propagate versions to their parents.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use ahash::AHashMap;

use crate::collector::report_read;
use crate::owner::{Container, ContainerFactory, ContainerRef, Owner, OwnerId, OwnerRef};
use crate::signal::report_change;
use crate::subscription::Subscription;
use crate::value::{Key, Value};

/// Test owner with optional versioning and per-owner subscriptions.
pub struct MockOwner {
    id: OwnerId,
    slots: RefCell<AHashMap<Key, Value>>,
    version: Cell<Option<u64>>,
    listeners: RefCell<Vec<Weak<dyn Fn()>>>,
    subscribable: bool,
    this: Weak<MockOwner>,
}

impl MockOwner {
    fn build(versioned: bool, subscribable: bool) -> Rc<Self> {
        Rc::new_cyclic(|this| Self {
            id: OwnerId::next(),
            slots: RefCell::new(AHashMap::new()),
            version: Cell::new(versioned.then_some(0)),
            listeners: RefCell::new(Vec::new()),
            subscribable,
            this: this.clone(),
        })
    }

    /// Unversioned owner with per-owner subscriptions.
    #[must_use]
    pub fn new() -> Rc<Self> {
        Self::build(false, true)
    }

    /// Versioned owner with per-owner subscriptions.
    #[must_use]
    pub fn versioned() -> Rc<Self> {
        Self::build(true, true)
    }

    /// Owner that only participates in global fan-out.
    #[must_use]
    pub fn without_subscriptions() -> Rc<Self> {
        Self::build(false, false)
    }

    /// This owner as a value, for nesting.
    #[must_use]
    pub fn as_value(self: &Rc<Self>) -> Value {
        Value::Owner(Rc::clone(self) as OwnerRef)
    }

    /// Tracked read.
    pub fn read(self: &Rc<Self>, key: impl Into<Key>) -> Value {
        let key = key.into();
        let value = self.peek_value(&key);
        let owner: OwnerRef = Rc::clone(self) as OwnerRef;
        report_read(&owner, &key, &value);
        value
    }

    /// Untracked read.
    #[must_use]
    pub fn peek_value(&self, key: &Key) -> Value {
        self.slots.borrow().get(key).cloned().unwrap_or_default()
    }

    /// Write and notify unconditionally.
    pub fn write(&self, key: impl Into<Key>, value: impl Into<Value>) {
        self.slots.borrow_mut().insert(key.into(), value.into());
        if let Some(v) = self.version.get() {
            self.version.set(Some(v + 1));
        }
        self.notify();
        report_change();
    }

    fn notify(&self) {
        let live: Vec<Rc<dyn Fn()>> = {
            let mut listeners = self.listeners.borrow_mut();
            listeners.retain(|weak| weak.strong_count() > 0);
            listeners.iter().filter_map(Weak::upgrade).collect()
        };
        for listener in live {
            listener();
        }
    }

    /// Number of subscriptions still alive.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.listeners
            .borrow()
            .iter()
            .filter(|weak| weak.strong_count() > 0)
            .count()
    }

    /// Drop every stored value, breaking reference cycles.
    pub fn unlink(&self) {
        self.slots.borrow_mut().clear();
    }
}

impl Owner for MockOwner {
    fn owner_id(&self) -> OwnerId {
        self.id
    }

    fn peek(&self, key: &Key) -> Value {
        self.peek_value(key)
    }

    fn version(&self) -> Option<u64> {
        self.version.get()
    }

    fn subscribe(&self, callback: Rc<dyn Fn()>, _notify_in_sync: bool) -> Option<Subscription> {
        if !self.subscribable {
            return None;
        }
        self.listeners.borrow_mut().push(Rc::downgrade(&callback));
        Some(Subscription::new(callback))
    }
}

impl Container for MockOwner {
    fn get(&self, key: &Key) -> Value {
        let value = self.peek_value(key);
        if let Some(this) = self.this.upgrade() {
            let owner: OwnerRef = this;
            report_read(&owner, key, &value);
        }
        value
    }

    fn set(&self, key: Key, value: Value) {
        self.write(key, value);
    }

    fn owner(self: Rc<Self>) -> OwnerRef {
        self
    }
}

/// Factory producing fresh versioned [`MockOwner`] containers.
#[derive(Debug, Default)]
pub struct MockFactory;

impl ContainerFactory for MockFactory {
    fn create(&self) -> ContainerRef {
        MockOwner::versioned()
    }
}
