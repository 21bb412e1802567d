#![forbid(unsafe_code)]

//! Hooks a [`Store`](crate::Store) invokes on its plugins.
//!
//! Plugins are called in registration order. Hooks run after the store has
//! released its internal borrows, so a hook may read or write the store.

use std::rc::Rc;

use tripwire_core::{ContainerFactory, Key, OwnerRef, Reactive, Value};

/// Fixed-capability plugin interface.
pub trait StorePlugin {
    /// Short identifier used in diagnostics.
    fn id(&self) -> &str;

    /// Called once when the plugin is added to a store. `factory` creates
    /// records owned by that store.
    fn on_attach(&self, factory: Rc<dyn ContainerFactory>) {
        let _ = factory;
    }

    /// Called after every trackable read.
    fn on_read(&self, owner: &OwnerRef, key: &Key, value: &Value) {
        let _ = (owner, key, value);
    }

    /// Called after every write that changed something.
    fn after_change(&self, owner: &OwnerRef, key: &Key) {
        let _ = (owner, key);
    }
}

impl StorePlugin for Reactive {
    fn id(&self) -> &str {
        "reactive"
    }

    fn on_attach(&self, factory: Rc<dyn ContainerFactory>) {
        self.attach(factory);
    }

    fn on_read(&self, owner: &OwnerRef, key: &Key, value: &Value) {
        Reactive::on_read(self, owner, key, value);
    }

    fn after_change(&self, _owner: &OwnerRef, _key: &Key) {
        self.on_change();
    }
}
