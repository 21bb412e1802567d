#![forbid(unsafe_code)]

//! Capabilities the engine consumes from an observable-container system.
//!
//! An [`Owner`] is any container whose keyed values can be read without
//! tracking, optionally versioned, and optionally subscribed to. Hosts also
//! call [`report_read`](crate::report_read) on every trackable read and
//! [`report_change`](crate::report_change) after every write.
//!
//! [`Container`] and [`ContainerFactory`] are the writable side used by the
//! computed layer to materialize derived values.

use std::fmt;
use std::num::NonZeroU64;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::subscription::Subscription;
use crate::value::{Key, Value};

static NEXT_OWNER_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of an owner. Dependency bookkeeping is keyed by this, never by
/// structural equality.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OwnerId(NonZeroU64);

impl OwnerId {
    /// Allocate a process-unique identity.
    #[must_use]
    pub fn next() -> Self {
        let raw = NEXT_OWNER_ID.fetch_add(1, Ordering::Relaxed);
        Self(NonZeroU64::new(raw).unwrap_or(NonZeroU64::MIN))
    }

    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0.get()
    }
}

impl fmt::Debug for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// An observable container instance.
pub trait Owner {
    /// Stable identity of this container.
    fn owner_id(&self) -> OwnerId;

    /// Live value at `key`, without reporting a read.
    fn peek(&self, key: &Key) -> Value;

    /// Monotonic version, bumped on every in-place mutation.
    ///
    /// `None` means the container does not version itself, in which case
    /// only identity comparison is available for change detection.
    fn version(&self) -> Option<u64> {
        None
    }

    /// Register `callback` to be invoked whenever this container changes.
    ///
    /// Returns `None` if the container has no per-object notifications; the
    /// engine then relies on [`report_change`](crate::report_change) for it.
    /// The returned [`Subscription`] holds the only strong reference to
    /// `callback`, so hosts should keep a [`Weak`](std::rc::Weak) and skip
    /// callbacks that fail to upgrade.
    fn subscribe(&self, callback: Rc<dyn Fn()>, notify_in_sync: bool) -> Option<Subscription> {
        let _ = (callback, notify_in_sync);
        None
    }
}

/// Shared handle to an owner.
pub type OwnerRef = Rc<dyn Owner>;

/// A writable container, as created by a [`ContainerFactory`].
pub trait Container {
    /// Read `key`, reporting the read to the active collector.
    fn get(&self, key: &Key) -> Value;

    /// Write `value` at `key`, notifying the container's observers.
    fn set(&self, key: Key, value: Value);

    /// The owner backing this container, for identity and peeking.
    fn owner(self: Rc<Self>) -> OwnerRef;
}

/// Shared handle to a container.
pub type ContainerRef = Rc<dyn Container>;

/// Creates empty observable containers. Bound to a
/// [`Reactive`](crate::Reactive) engine by its attach step.
pub trait ContainerFactory {
    fn create(&self) -> ContainerRef;
}
