#![forbid(unsafe_code)]

//! Engine handle tying configuration to a container factory.
//!
//! A [`Reactive`] is what a container system plugs in. The container calls
//! [`on_read`](Reactive::on_read) and [`on_change`](Reactive::on_change) from
//! its read and write paths, and [`attach`](Reactive::attach) once it can
//! create fresh containers. Application code uses the same handle to
//! [`watch`](Reactive::watch), [`batch`](Reactive::batch) and build
//! [`computed`](Reactive::computed) values.
//!
//! Handles are cheap to clone and share one factory binding. Separate
//! handles are independent: attaching one does not bind the other.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::batch;
use crate::collector::{is_tracking, report_read};
use crate::computed::{Computed, Getters};
use crate::config::ReactiveConfig;
use crate::error::{ReactiveError, Result};
use crate::owner::{ContainerFactory, OwnerRef};
use crate::signal::report_change;
use crate::value::{Key, Value};
use crate::watcher::Watcher;

struct ReactiveInner {
    config: ReactiveConfig,
    factory: RefCell<Option<Rc<dyn ContainerFactory>>>,
}

/// Shared engine handle.
#[derive(Clone)]
pub struct Reactive {
    inner: Rc<ReactiveInner>,
}

impl Reactive {
    /// Engine with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(ReactiveConfig::default())
    }

    #[must_use]
    pub fn with_config(config: ReactiveConfig) -> Self {
        Self {
            inner: Rc::new(ReactiveInner {
                config,
                factory: RefCell::new(None),
            }),
        }
    }

    /// Engine configured from `TRIPWIRE_*` environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        Self::with_config(ReactiveConfig::from_env())
    }

    #[must_use]
    pub fn config(&self) -> &ReactiveConfig {
        &self.inner.config
    }

    /// Bind the factory used by [`computed`](Self::computed). A later call
    /// replaces the binding.
    pub fn attach(&self, factory: Rc<dyn ContainerFactory>) {
        let rebound = self.inner.factory.replace(Some(factory)).is_some();
        tracing::debug!(
            message = "reactive.attach",
            notify = %self.inner.config.notify,
            rebound
        );
    }

    #[must_use]
    pub fn is_attached(&self) -> bool {
        self.inner.factory.borrow().is_some()
    }

    /// Run `f` now and again whenever something it read changes.
    pub fn watch(&self, f: impl FnMut() + 'static) -> Watcher {
        Watcher::new(self.inner.config.notify, f)
    }

    /// [`watch`](Self::watch) with a cleanup run once on disposal.
    pub fn effect(&self, f: impl FnMut() + 'static, cleanup: impl FnOnce() + 'static) -> Watcher {
        Watcher::with_cleanup(self.inner.config.notify, f, cleanup)
    }

    /// Coalesce reruns until `f` and every enclosing batch return.
    pub fn batch<T>(&self, f: impl FnOnce() -> T) -> T {
        batch::batch(f)
    }

    #[must_use]
    pub fn is_tracking(&self) -> bool {
        is_tracking()
    }

    /// Materialize `getters` into a fresh container from the bound factory.
    ///
    /// # Errors
    ///
    /// Returns [`ReactiveError::Unbound`] if no factory has been attached.
    /// Nothing is created in that case.
    pub fn computed(&self, getters: Getters) -> Result<Computed> {
        let factory = self
            .inner
            .factory
            .borrow()
            .clone()
            .ok_or(ReactiveError::Unbound)?;
        let state = factory.create();
        Ok(Computed::new(state, self.inner.config.notify, getters))
    }

    /// Read hook for containers: forwards to the active collector.
    pub fn on_read(&self, owner: &OwnerRef, key: &Key, value: &Value) {
        report_read(owner, key, value);
    }

    /// Change hook for containers: signals the global fan-out.
    pub fn on_change(&self) {
        report_change();
    }
}

impl Default for Reactive {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Reactive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reactive")
            .field("config", &self.inner.config)
            .field("attached", &self.is_attached())
            .finish()
    }
}
