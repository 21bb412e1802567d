#![forbid(unsafe_code)]

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ReactiveError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReactiveError {
    /// `computed` was called before a container factory was attached.
    #[error("reactive engine must be attached to a container factory before using computed()")]
    Unbound,

    #[error("invalid notify mode: {value} (expected `global` or `per-owner`)")]
    InvalidNotifyMode { value: String },
}

impl ReactiveError {
    #[must_use]
    pub fn invalid_notify_mode(value: impl Into<String>) -> Self {
        Self::InvalidNotifyMode {
            value: value.into(),
        }
    }
}
