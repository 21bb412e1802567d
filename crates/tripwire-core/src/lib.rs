#![forbid(unsafe_code)]

//! Automatic dependency tracking and change propagation for observable
//! containers.
//!
//! - [`watch`] / [`effect`]: run a function, record every `(owner, key)` it
//!   reads, and rerun it when one of those values actually changes.
//! - [`batch`]: coalesce reruns until the outermost batch returns.
//! - [`Reactive::computed`]: materialize derived values into an observable
//!   container so they can be tracked downstream.
//!
//! # Architecture
//!
//! The engine never owns data. Containers implement [`Owner`] (identity,
//! untracked peek, optional version, optional subscription) and call
//! [`report_read`] from their read path and [`report_change`] from their
//! write path. Collector and batch stacks live in a thread-local runtime
//! context; every push is paired with an RAII guard that pops it.
//!
//! # Invariants
//!
//! 1. A watcher's function runs once, synchronously, before `watch` returns.
//! 2. Writes to keys a watcher did not read in its last run never rerun it.
//! 3. A write that leaves a read value identical never reruns it.
//! 4. Inside a batch, each watcher reruns at most once, after the outermost
//!    batch returns.
//! 5. Disposal is idempotent and final.

pub mod batch;
pub mod collector;
pub mod computed;
pub mod config;
pub mod dependency;
pub mod error;
pub mod owner;
pub mod reactive;
mod runtime;
pub mod signal;
pub mod subscription;
#[cfg(any(test, feature = "test-helpers"))]
pub mod testing;
pub mod value;
pub mod watcher;

pub use batch::{
    BatchCallback, BatchScope, CallbackId, batch, batch_flushes_total, in_batch,
    register_batch_callback,
};
pub use collector::{Collector, CollectorGuard, is_tracking, report_read, untracked};
pub use computed::{Computed, Getter, Getters};
pub use config::{NotifyMode, ReactiveConfig};
pub use dependency::{DependencyMap, Snapshot};
pub use error::{ReactiveError, Result};
pub use owner::{Container, ContainerFactory, ContainerRef, Owner, OwnerId, OwnerRef};
pub use reactive::Reactive;
pub use signal::{fan_out_len, owner_listener, report_change};
pub use subscription::Subscription;
pub use value::{Key, Symbol, Value};
pub use watcher::{Watcher, effect, watch, watcher_reruns_skipped_total, watcher_runs_total};
