#![forbid(unsafe_code)]

use thiserror::Error;

use tripwire_core::OwnerId;

pub type Result<T> = std::result::Result<T, StoreError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// The store was disposed; it no longer creates objects or accepts plugins.
    #[error("store has been disposed")]
    Disposed,

    /// A list operation was applied to a record.
    #[error("object {id:?} is a record, not a list")]
    NotAList { id: OwnerId },
}
