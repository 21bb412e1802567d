#![forbid(unsafe_code)]

//! Observable records and lists.
//!
//! # Invariants
//!
//! 1. A write that leaves the stored value identical is a no-op: no version
//!    bump, no notification, no change hook.
//! 2. Every effective mutation assigns a fresh version to the object and to
//!    every ancestor reachable through parent links. Propagation stops at an
//!    object that already carries the new version, so cycles terminate.
//! 3. Synchronous listeners of every re-versioned object are invoked before
//!    the write returns; deferred listeners are queued on the store.
//! 4. Reads report to plugins only after internal borrows are released.
//!
//! Objects hold their children strongly. A self-referencing graph stays
//! alive until one of its edges is deleted.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

use ahash::AHashMap;

use tripwire_core::{BatchScope, Container, Key, Owner, OwnerId, OwnerRef, Subscription, Value};

use crate::error::{Result, StoreError};
use crate::store::{Store, StoreInner};

static NEXT_VERSION: AtomicU64 = AtomicU64::new(1);

fn next_version() -> u64 {
    NEXT_VERSION.fetch_add(1, Ordering::Relaxed)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Kind {
    Record,
    List,
}

enum Slots {
    Record {
        entries: AHashMap<Key, Value>,
        order: Vec<Key>,
    },
    List(Vec<Value>),
}

impl Slots {
    fn new(kind: Kind) -> Self {
        match kind {
            Kind::Record => Self::Record {
                entries: AHashMap::new(),
                order: Vec::new(),
            },
            Kind::List => Self::List(Vec::new()),
        }
    }

    fn get(&self, key: &Key) -> Value {
        match self {
            Self::Record { entries, .. } => entries.get(key).cloned().unwrap_or_default(),
            Self::List(items) => match key {
                Key::Index(idx) => items.get(*idx).cloned().unwrap_or_default(),
                key if *key == Key::length() => Value::Int(items.len() as i64),
                _ => Value::Undefined,
            },
        }
    }

    /// Store `value`, returning the values that left the object.
    fn put(&mut self, key: Key, value: Value) -> Option<Vec<Value>> {
        match self {
            Self::Record { entries, order } => {
                let previous = entries.insert(key.clone(), value);
                if previous.is_none() {
                    order.push(key);
                }
                Some(previous.into_iter().collect())
            }
            Self::List(items) => match key {
                Key::Index(idx) => {
                    if idx >= items.len() {
                        items.resize(idx + 1, Value::Undefined);
                    }
                    Some(vec![std::mem::replace(&mut items[idx], value)])
                }
                key if key == Key::length() => {
                    let len = usize::try_from(value.as_int()?).ok()?;
                    if len >= items.len() {
                        items.resize(len, Value::Undefined);
                        Some(Vec::new())
                    } else {
                        Some(items.split_off(len))
                    }
                }
                _ => None,
            },
        }
    }

    fn remove(&mut self, key: &Key) -> Option<Value> {
        match self {
            Self::Record { entries, order } => {
                let previous = entries.remove(key)?;
                order.retain(|existing| existing != key);
                Some(previous)
            }
            // Deleting an element leaves a hole; the length is unchanged.
            Self::List(items) => match key {
                Key::Index(idx) if *idx < items.len() => {
                    Some(std::mem::take(&mut items[*idx]))
                }
                _ => None,
            },
        }
    }

    fn len(&self) -> usize {
        match self {
            Self::Record { entries, .. } => entries.len(),
            Self::List(items) => items.len(),
        }
    }
}

struct Listener {
    callback: Weak<dyn Fn()>,
    sync: bool,
}

/// Shared state of one object.
pub(crate) struct ObjectInner {
    id: OwnerId,
    kind: Kind,
    store: Weak<StoreInner>,
    slots: RefCell<Slots>,
    version: Cell<u64>,
    /// Objects holding this one, with the number of slots that do.
    parents: RefCell<AHashMap<OwnerId, (Weak<ObjectInner>, usize)>>,
    listeners: RefCell<Vec<Listener>>,
    this: Weak<ObjectInner>,
}

impl ObjectInner {
    pub(crate) fn new(kind: Kind, store: Weak<StoreInner>) -> Rc<Self> {
        Rc::new_cyclic(|this| Self {
            id: OwnerId::next(),
            kind,
            store,
            slots: RefCell::new(Slots::new(kind)),
            version: Cell::new(next_version()),
            parents: RefCell::new(AHashMap::new()),
            listeners: RefCell::new(Vec::new()),
            this: this.clone(),
        })
    }

    pub(crate) fn id(&self) -> OwnerId {
        self.id
    }

    fn peek_slot(&self, key: &Key) -> Value {
        self.slots.borrow().get(key)
    }

    /// Tracked read: peek, then report to every plugin.
    fn read(&self, key: &Key) -> Value {
        let value = self.peek_slot(key);
        if let (Some(store), Some(this)) = (self.store.upgrade(), self.this.upgrade()) {
            let owner: OwnerRef = this;
            for plugin in store.plugins() {
                plugin.on_read(&owner, key, &value);
            }
        }
        value
    }

    /// Populate a slot of a freshly created object without notifying.
    pub(crate) fn init(&self, key: Key, value: Value) {
        let added = value.clone();
        let removed = self.slots.borrow_mut().put(key, value);
        if let Some(removed) = removed {
            self.relink(&removed, Some(&added));
        }
    }

    fn write(&self, key: Key, value: Value) {
        if self.peek_slot(&key).same_value(&value) {
            return;
        }
        let added = value.clone();
        let removed = self.slots.borrow_mut().put(key.clone(), value);
        let Some(removed) = removed else {
            tracing::warn!(message = "object.ignored_write", id = ?self.id, key = ?key);
            return;
        };
        self.relink(&removed, Some(&added));
        self.changed(&key);
    }

    fn delete(&self, key: &Key) -> bool {
        let removed = self.slots.borrow_mut().remove(key);
        match removed {
            Some(previous) => {
                self.relink(&[previous], None);
                self.changed(key);
                true
            }
            None => false,
        }
    }

    fn with_list<T>(&self, f: impl FnOnce(&mut Vec<Value>) -> T) -> Result<T> {
        match &mut *self.slots.borrow_mut() {
            Slots::List(items) => Ok(f(items)),
            Slots::Record { .. } => Err(StoreError::NotAList { id: self.id }),
        }
    }

    fn push(&self, value: Value) -> Result<usize> {
        let added = value.clone();
        let len = self.with_list(|items| {
            items.push(value);
            items.len()
        })?;
        self.relink(&[], Some(&added));
        self.changed(&Key::Index(len - 1));
        Ok(len)
    }

    fn take_from_list(&self, front: bool) -> Result<Option<Value>> {
        let taken = self.with_list(|items| {
            if front {
                (!items.is_empty()).then(|| items.remove(0))
            } else {
                items.pop()
            }
        })?;
        if let Some(value) = &taken {
            self.relink(std::slice::from_ref(value), None);
            self.changed(&Key::length());
        }
        Ok(taken)
    }

    /// Update parent links after `removed` left and `added` entered.
    fn relink(&self, removed: &[Value], added: Option<&Value>) {
        let Some(store) = self.store.upgrade() else {
            return;
        };
        for child in removed.iter().filter_map(|value| value.as_owner()) {
            if let Some(child) = store.lookup(child.owner_id()) {
                child.unlink_parent(self.id);
            }
        }
        if let Some(child) = added.and_then(Value::as_owner)
            && let Some(child) = store.lookup(child.owner_id())
        {
            child.link_parent(self);
        }
    }

    fn link_parent(&self, parent: &ObjectInner) {
        self.parents
            .borrow_mut()
            .entry(parent.id)
            .or_insert_with(|| (parent.this.clone(), 0))
            .1 += 1;
    }

    fn unlink_parent(&self, parent: OwnerId) {
        let mut parents = self.parents.borrow_mut();
        if let Some((_, count)) = parents.get_mut(&parent) {
            *count -= 1;
            if *count == 0 {
                parents.remove(&parent);
            }
        }
    }

    /// Re-version this object and its ancestors, then notify.
    fn changed(&self, key: &Key) {
        let Some(this) = self.this.upgrade() else {
            return;
        };
        let version = next_version();
        let mut touched = Vec::new();
        let mut stack = vec![this];
        while let Some(object) = stack.pop() {
            if object.version.replace(version) == version {
                continue;
            }
            stack.extend(
                object
                    .parents
                    .borrow()
                    .values()
                    .filter_map(|(parent, _)| parent.upgrade()),
            );
            touched.push(object);
        }
        tracing::trace!(
            message = "object.changed",
            id = ?self.id,
            key = ?key,
            version,
            touched = touched.len()
        );

        let store = self.store.upgrade();
        // One write reruns each watcher at most once, even when it is
        // subscribed to several of the re-versioned objects.
        let scope = BatchScope::new();
        for object in &touched {
            object.notify(store.as_deref());
        }
        if let (Some(store), Some(owner)) = (&store, touched.first()) {
            let owner: OwnerRef = Rc::clone(owner) as OwnerRef;
            for plugin in store.plugins() {
                plugin.after_change(&owner, key);
            }
        }
        drop(scope);
    }

    fn notify(&self, store: Option<&StoreInner>) {
        let live: Vec<(Rc<dyn Fn()>, bool)> = {
            let mut listeners = self.listeners.borrow_mut();
            listeners.retain(|listener| listener.callback.strong_count() > 0);
            listeners
                .iter()
                .filter_map(|listener| Some((listener.callback.upgrade()?, listener.sync)))
                .collect()
        };
        for (callback, sync) in live {
            match store {
                Some(store) if !sync => store.defer(&callback),
                _ => callback(),
            }
        }
    }

    fn add_listener(&self, callback: &Rc<dyn Fn()>, sync: bool) {
        self.listeners.borrow_mut().push(Listener {
            callback: Rc::downgrade(callback),
            sync,
        });
    }

    fn listener_count(&self) -> usize {
        self.listeners
            .borrow()
            .iter()
            .filter(|listener| listener.callback.strong_count() > 0)
            .count()
    }
}

impl Drop for ObjectInner {
    fn drop(&mut self) {
        if let Some(store) = self.store.upgrade()
            && let Ok(mut objects) = store.objects.try_borrow_mut()
        {
            objects.remove(&self.id);
        }
    }
}

impl Owner for ObjectInner {
    fn owner_id(&self) -> OwnerId {
        self.id
    }

    fn peek(&self, key: &Key) -> Value {
        self.peek_slot(key)
    }

    fn version(&self) -> Option<u64> {
        Some(self.version.get())
    }

    fn subscribe(&self, callback: Rc<dyn Fn()>, notify_in_sync: bool) -> Option<Subscription> {
        self.add_listener(&callback, notify_in_sync);
        Some(Subscription::new(callback))
    }
}

impl Container for ObjectInner {
    fn get(&self, key: &Key) -> Value {
        self.read(key)
    }

    fn set(&self, key: Key, value: Value) {
        self.write(key, value);
    }

    fn owner(self: Rc<Self>) -> OwnerRef {
        self
    }
}

/// Handle to a record or list. Clones refer to the same object.
#[derive(Clone)]
pub struct Object {
    inner: Rc<ObjectInner>,
}

impl Object {
    pub(crate) fn from_inner(inner: Rc<ObjectInner>) -> Self {
        Self { inner }
    }

    pub(crate) fn inner(&self) -> &ObjectInner {
        &self.inner
    }

    #[must_use]
    pub fn id(&self) -> OwnerId {
        self.inner.id
    }

    #[must_use]
    pub fn is_list(&self) -> bool {
        self.inner.kind == Kind::List
    }

    /// Current version. Changes whenever this object or a descendant is
    /// mutated.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.inner.version.get()
    }

    /// The store that created this object, if it is still alive.
    #[must_use]
    pub fn store(&self) -> Option<Store> {
        self.inner.store.upgrade().map(Store::from_inner)
    }

    /// Tracked read. Absent keys read as [`Value::Undefined`] and are still
    /// tracked.
    pub fn get(&self, key: impl Into<Key>) -> Value {
        self.inner.read(&key.into())
    }

    /// Untracked read.
    #[must_use]
    pub fn peek(&self, key: impl Into<Key>) -> Value {
        self.inner.peek_slot(&key.into())
    }

    /// Tracked read of a nested object of the same store.
    pub fn child(&self, key: impl Into<Key>) -> Option<Object> {
        let value = self.get(key);
        let owner = value.as_owner()?;
        let store = self.inner.store.upgrade()?;
        store.lookup(owner.owner_id()).map(Object::from_inner)
    }

    /// Write `value` at `key`. Writing an identical value does nothing.
    ///
    /// On lists, keys other than an index or `length` are ignored.
    pub fn set(&self, key: impl Into<Key>, value: impl Into<Value>) {
        self.inner.write(key.into(), value.into());
    }

    /// Remove `key`. Returns whether anything was removed.
    pub fn delete(&self, key: impl Into<Key>) -> bool {
        self.inner.delete(&key.into())
    }

    /// Append to a list. Returns the new length.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotAList`] on a record.
    pub fn push(&self, value: impl Into<Value>) -> Result<usize> {
        self.inner.push(value.into())
    }

    /// Remove and return the last element of a list.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotAList`] on a record.
    pub fn pop(&self) -> Result<Option<Value>> {
        self.inner.take_from_list(false)
    }

    /// Remove and return the first element of a list.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotAList`] on a record.
    pub fn shift(&self) -> Result<Option<Value>> {
        self.inner.take_from_list(true)
    }

    /// Number of entries. On lists this is a tracked read of `length`.
    pub fn len(&self) -> usize {
        if self.is_list() {
            let len = self.inner.read(&Key::length());
            return len.as_int().and_then(|n| usize::try_from(n).ok()).unwrap_or(0);
        }
        self.inner.slots.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Record keys in insertion order, or list indices. Untracked.
    #[must_use]
    pub fn keys(&self) -> Vec<Key> {
        match &*self.inner.slots.borrow() {
            Slots::Record { order, .. } => order.clone(),
            Slots::List(items) => (0..items.len()).map(Key::Index).collect(),
        }
    }

    /// Values in key order. Untracked.
    #[must_use]
    pub fn values(&self) -> Vec<Value> {
        match &*self.inner.slots.borrow() {
            Slots::Record { entries, order } => order
                .iter()
                .map(|key| entries.get(key).cloned().unwrap_or_default())
                .collect(),
            Slots::List(items) => items.clone(),
        }
    }

    /// Invoke `callback` after every change to this object or a descendant.
    /// Deferred callbacks (`sync == false`) run on [`Store::flush`].
    pub fn subscribe(&self, callback: impl Fn() + 'static, sync: bool) -> Subscription {
        let callback: Rc<dyn Fn()> = Rc::new(callback);
        self.inner.add_listener(&callback, sync);
        Subscription::new(callback)
    }

    /// Number of live subscriptions.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.inner.listener_count()
    }

    #[must_use]
    pub fn to_value(&self) -> Value {
        Value::Owner(self.as_owner())
    }

    #[must_use]
    pub fn as_owner(&self) -> OwnerRef {
        Rc::clone(&self.inner) as OwnerRef
    }
}

impl From<&Object> for Value {
    fn from(object: &Object) -> Self {
        object.to_value()
    }
}

impl From<Object> for Value {
    fn from(object: Object) -> Self {
        object.to_value()
    }
}

impl fmt::Debug for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Object")
            .field("id", &self.inner.id)
            .field("kind", &self.inner.kind)
            .field("version", &self.version())
            .field("len", &self.inner.slots.borrow().len())
            .finish()
    }
}
