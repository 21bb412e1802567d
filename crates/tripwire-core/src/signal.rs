#![forbid(unsafe_code)]

//! Change signal bridge.
//!
//! Containers announce changes at one of two granularities:
//!
//! - **Global**: [`report_change`] after any write. Every watcher registered
//!   for global fan-out is asked to reconsider.
//! - **Per owner**: the container invokes callbacks registered through
//!   [`Owner::subscribe`](crate::Owner::subscribe). The engine builds those
//!   callbacks with [`owner_listener`].
//!
//! Both paths end in [`register_batch_callback`], so an open batch frame
//! coalesces them.

use std::rc::Rc;

use crate::batch::{BatchCallback, CallbackId, register_batch_callback};
use crate::runtime::Runtime;

/// Announce that some container changed.
pub fn report_change() {
    let callbacks: Vec<BatchCallback> = Runtime::with(|rt| {
        rt.changes.set(rt.changes.get().wrapping_add(1));
        rt.fan_out.borrow().values().cloned().collect()
    });
    for callback in &callbacks {
        register_batch_callback(callback);
    }
}

/// Number of [`report_change`] calls made on this thread so far.
pub(crate) fn change_count() -> u64 {
    Runtime::try_with(|rt| rt.changes.get()).unwrap_or_default()
}

/// Build a per-owner change callback that routes into the batching path.
#[must_use]
pub fn owner_listener(callback: &BatchCallback) -> Rc<dyn Fn()> {
    let callback = callback.clone();
    Rc::new(move || register_batch_callback(&callback))
}

/// Number of callbacks registered for global fan-out on this thread.
#[must_use]
pub fn fan_out_len() -> usize {
    Runtime::with(|rt| rt.fan_out.borrow().len())
}

pub(crate) fn register_fan_out(callback: &BatchCallback) {
    Runtime::with(|rt| {
        rt.fan_out
            .borrow_mut()
            .insert(callback.id(), callback.clone());
    });
}

pub(crate) fn unregister_fan_out(id: CallbackId) {
    Runtime::try_with(|rt| {
        rt.fan_out.borrow_mut().remove(&id);
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::batch;
    use std::cell::Cell;

    #[test]
    fn fan_out_reaches_registered_callbacks() {
        let hits = Rc::new(Cell::new(0u32));
        let h = Rc::clone(&hits);
        let callback = BatchCallback::new(move || h.set(h.get() + 1));
        register_fan_out(&callback);
        report_change();
        assert_eq!(hits.get(), 1);
        unregister_fan_out(callback.id());
        report_change();
        assert_eq!(hits.get(), 1);
    }

    #[test]
    fn fan_out_is_coalesced_by_batch() {
        let hits = Rc::new(Cell::new(0u32));
        let h = Rc::clone(&hits);
        let callback = BatchCallback::new(move || h.set(h.get() + 1));
        register_fan_out(&callback);
        batch(|| {
            report_change();
            report_change();
        });
        assert_eq!(hits.get(), 1);
        unregister_fan_out(callback.id());
    }

    #[test]
    fn owner_listener_routes_through_batch() {
        let hits = Rc::new(Cell::new(0u32));
        let h = Rc::clone(&hits);
        let callback = BatchCallback::new(move || h.set(h.get() + 1));
        let listener = owner_listener(&callback);
        listener();
        assert_eq!(hits.get(), 1);
        batch(|| {
            listener();
            listener();
        });
        assert_eq!(hits.get(), 2);
    }
}
