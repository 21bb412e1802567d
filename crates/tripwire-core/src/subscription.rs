#![forbid(unsafe_code)]

//! RAII handle for a per-owner change subscription.
//!
//! Hosts store subscribers as [`Weak`](std::rc::Weak) callbacks and clean
//! them up lazily during notification. A [`Subscription`] owns the strong
//! side: once it is dropped the callback can no longer be upgraded and is
//! never invoked again. An optional release hook lets hosts remove the entry
//! eagerly instead.

use std::fmt;
use std::rc::Rc;

/// Keeps a change callback alive; dropping it unsubscribes.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    callback: Option<Rc<dyn Fn()>>,
    release: Option<Box<dyn FnOnce()>>,
}

impl Subscription {
    /// Hold `callback` alive for as long as this subscription lives.
    pub fn new(callback: Rc<dyn Fn()>) -> Self {
        Self {
            callback: Some(callback),
            release: None,
        }
    }

    /// Like [`new`](Self::new), additionally running `release` exactly once
    /// when the subscription ends.
    pub fn with_release(callback: Rc<dyn Fn()>, release: impl FnOnce() + 'static) -> Self {
        Self {
            callback: Some(callback),
            release: Some(Box::new(release)),
        }
    }

    /// End the subscription now.
    pub fn unsubscribe(mut self) {
        self.release_now();
    }

    fn release_now(&mut self) {
        self.callback = None;
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release_now();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.callback.is_some())
            .finish()
    }
}
