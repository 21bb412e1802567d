#![forbid(unsafe_code)]

//! Reference observable store for tripwire.
//!
//! A [`Store`] creates [`Object`]s (records and lists) and forwards their
//! reads and writes to registered [`StorePlugin`]s. Adding a
//! [`Reactive`](tripwire_core::Reactive) engine as a plugin makes every
//! object trackable:
//!
//! ```
//! use std::rc::Rc;
//! use tripwire_core::Reactive;
//! use tripwire_store::Store;
//!
//! let reactive = Reactive::new();
//! let store = Store::new();
//! store.use_plugin(Rc::new(reactive.clone())).unwrap();
//!
//! let state = store.record_from([("count", 0)]).unwrap();
//! let seen = Rc::new(std::cell::RefCell::new(Vec::new()));
//! let (s, log) = (state.clone(), Rc::clone(&seen));
//! let _watcher = reactive.watch(move || log.borrow_mut().push(s.get("count")));
//!
//! state.set("count", 1);
//! assert_eq!(seen.borrow().len(), 2);
//! ```
//!
//! Objects version themselves and propagate versions to the objects that
//! hold them, which lets watchers notice in-place mutation of nested
//! containers they never read into.

pub mod error;
pub mod object;
pub mod plugin;
pub mod store;

pub use error::{Result, StoreError};
pub use object::Object;
pub use plugin::StorePlugin;
pub use store::Store;
