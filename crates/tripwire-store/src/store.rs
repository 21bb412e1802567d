#![forbid(unsafe_code)]

//! Store: creates objects, owns plugins and queues deferred notifications.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use ahash::AHashMap;

use tripwire_core::{ContainerFactory, ContainerRef, OwnerId, Value};

use crate::error::{Result, StoreError};
use crate::object::{Kind, Object, ObjectInner};
use crate::plugin::StorePlugin;

pub(crate) struct StoreInner {
    pub(crate) plugins: RefCell<Vec<Rc<dyn StorePlugin>>>,
    /// Live objects by identity, for parent linking and [`Store::resolve`].
    pub(crate) objects: RefCell<AHashMap<OwnerId, Weak<ObjectInner>>>,
    pending: RefCell<Vec<Weak<dyn Fn()>>>,
    disposed: Cell<bool>,
    this: Weak<StoreInner>,
}

impl StoreInner {
    pub(crate) fn plugins(&self) -> Vec<Rc<dyn StorePlugin>> {
        self.plugins.borrow().clone()
    }

    pub(crate) fn lookup(&self, id: OwnerId) -> Option<Rc<ObjectInner>> {
        self.objects.borrow().get(&id).and_then(Weak::upgrade)
    }

    /// Queue a deferred listener until the next [`Store::flush`].
    pub(crate) fn defer(&self, listener: &Rc<dyn Fn()>) {
        let weak = Rc::downgrade(listener);
        let mut pending = self.pending.borrow_mut();
        if !pending.iter().any(|queued| Weak::ptr_eq(queued, &weak)) {
            pending.push(weak);
        }
    }

    fn create(&self, kind: Kind) -> Rc<ObjectInner> {
        let object = ObjectInner::new(kind, self.this.clone());
        self.objects
            .borrow_mut()
            .insert(object.id(), Rc::downgrade(&object));
        object
    }
}

/// Handle to an object store. Clones share the same store.
#[derive(Clone)]
pub struct Store {
    inner: Rc<StoreInner>,
}

impl Store {
    #[must_use]
    pub fn new() -> Self {
        let inner = Rc::new_cyclic(|this| StoreInner {
            plugins: RefCell::new(Vec::new()),
            objects: RefCell::new(AHashMap::new()),
            pending: RefCell::new(Vec::new()),
            disposed: Cell::new(false),
            this: this.clone(),
        });
        Self { inner }
    }

    pub(crate) fn from_inner(inner: Rc<StoreInner>) -> Self {
        Self { inner }
    }

    /// Register `plugin` and run its attach hook.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Disposed`] after [`dispose`](Self::dispose).
    pub fn use_plugin(&self, plugin: Rc<dyn StorePlugin>) -> Result<()> {
        self.ensure_live()?;
        self.inner.plugins.borrow_mut().push(Rc::clone(&plugin));
        tracing::debug!(
            message = "store.use_plugin",
            plugin = plugin.id(),
            plugins = self.plugin_count()
        );
        plugin.on_attach(Rc::new(StoreFactory {
            store: Rc::downgrade(&self.inner),
        }));
        Ok(())
    }

    /// Remove every plugin. Objects keep working but are no longer tracked.
    pub fn clear_plugins(&self) {
        let removed = std::mem::take(&mut *self.inner.plugins.borrow_mut());
        tracing::debug!(message = "store.clear_plugins", removed = removed.len());
    }

    #[must_use]
    pub fn plugin_count(&self) -> usize {
        self.inner.plugins.borrow().len()
    }

    /// Drop plugins and pending notifications and refuse further use.
    /// Existing objects stay readable and writable. Idempotent.
    pub fn dispose(&self) {
        if self.inner.disposed.replace(true) {
            return;
        }
        let plugins = std::mem::take(&mut *self.inner.plugins.borrow_mut());
        let pending = std::mem::take(&mut *self.inner.pending.borrow_mut());
        tracing::debug!(
            message = "store.dispose",
            plugins = plugins.len(),
            pending = pending.len()
        );
    }

    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.get()
    }

    /// Create an empty record.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Disposed`] after [`dispose`](Self::dispose).
    pub fn record(&self) -> Result<Object> {
        self.ensure_live()?;
        Ok(Object::from_inner(self.inner.create(Kind::Record)))
    }

    /// Create a record holding `entries`. Writing the entries does not
    /// notify anyone, since nothing can observe the record yet.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Disposed`] after [`dispose`](Self::dispose).
    pub fn record_from<K, V>(&self, entries: impl IntoIterator<Item = (K, V)>) -> Result<Object>
    where
        K: Into<tripwire_core::Key>,
        V: Into<Value>,
    {
        let record = self.record()?;
        for (key, value) in entries {
            record.inner().init(key.into(), value.into());
        }
        Ok(record)
    }

    /// Create an empty list.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Disposed`] after [`dispose`](Self::dispose).
    pub fn list(&self) -> Result<Object> {
        self.ensure_live()?;
        Ok(Object::from_inner(self.inner.create(Kind::List)))
    }

    /// Create a list holding `items`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Disposed`] after [`dispose`](Self::dispose).
    pub fn list_from<V: Into<Value>>(&self, items: impl IntoIterator<Item = V>) -> Result<Object> {
        let list = self.list()?;
        for (idx, item) in items.into_iter().enumerate() {
            list.inner().init(tripwire_core::Key::Index(idx), item.into());
        }
        Ok(list)
    }

    /// The live object behind `value`, if it belongs to this store.
    #[must_use]
    pub fn resolve(&self, value: &Value) -> Option<Object> {
        let owner = value.as_owner()?;
        self.lookup(owner.owner_id())
    }

    #[must_use]
    pub fn lookup(&self, id: OwnerId) -> Option<Object> {
        self.inner.lookup(id).map(Object::from_inner)
    }

    /// Number of live objects created by this store.
    #[must_use]
    pub fn object_count(&self) -> usize {
        self.inner
            .objects
            .borrow()
            .values()
            .filter(|weak| weak.strong_count() > 0)
            .count()
    }

    /// Run every queued deferred listener once. Returns how many ran.
    pub fn flush(&self) -> usize {
        let pending = std::mem::take(&mut *self.inner.pending.borrow_mut());
        let live: Vec<Rc<dyn Fn()>> = pending.iter().filter_map(Weak::upgrade).collect();
        tracing::trace!(message = "store.flush", queued = pending.len(), live = live.len());
        for listener in &live {
            listener();
        }
        live.len()
    }

    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.inner.pending.borrow().len()
    }

    fn ensure_live(&self) -> Result<()> {
        if self.is_disposed() {
            Err(StoreError::Disposed)
        } else {
            Ok(())
        }
    }
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

impl ContainerFactory for Store {
    fn create(&self) -> ContainerRef {
        self.inner.create(Kind::Record)
    }
}

impl fmt::Debug for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("plugins", &self.plugin_count())
            .field("objects", &self.object_count())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

/// Factory handed to plugins on attach. Holds the store weakly so a plugin
/// kept by the store does not keep the store alive.
struct StoreFactory {
    store: Weak<StoreInner>,
}

impl ContainerFactory for StoreFactory {
    fn create(&self) -> ContainerRef {
        match self.store.upgrade() {
            Some(store) => store.create(Kind::Record),
            None => {
                tracing::warn!(message = "store.detached_create");
                ObjectInner::new(Kind::Record, Weak::new())
            }
        }
    }
}
