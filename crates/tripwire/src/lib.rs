#![forbid(unsafe_code)]

//! Tripwire public facade crate.
//!
//! Re-exports the engine and, with the default `store` feature, the
//! reference observable store.

pub use tripwire_core::*;

#[cfg(feature = "store")]
pub use tripwire_store as store;

pub mod prelude {
    pub use tripwire_core::{
        Getters, Key, NotifyMode, Reactive, ReactiveConfig, ReactiveError, Value, Watcher, batch,
        effect, in_batch, is_tracking, untracked, watch,
    };
    #[cfg(feature = "store")]
    pub use tripwire_store::{Object, Store, StoreError, StorePlugin};

    pub use tripwire_core as core;
    #[cfg(feature = "store")]
    pub use tripwire_store as store;
}
