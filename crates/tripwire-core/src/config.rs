#![forbid(unsafe_code)]

//! Engine configuration.
//!
//! Environment variables take precedence over defaults but are overridden by
//! explicit builder calls:
//!
//! | Variable          | Values                  | Default     |
//! |-------------------|-------------------------|-------------|
//! | `TRIPWIRE_NOTIFY` | `global`, `per-owner`   | `per-owner` |

use std::env;
use std::fmt;
use std::str::FromStr;

use crate::error::ReactiveError;

/// How watchers learn that something they read may have changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NotifyMode {
    /// Subscribe to each touched owner; writes reach only the watchers that
    /// read from the written owner.
    #[default]
    PerOwner,
    /// Register with the global fan-out; every write reaches every watcher,
    /// which then filters by snapshot comparison.
    Global,
}

impl FromStr for NotifyMode {
    type Err = ReactiveError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "per-owner" | "per_owner" | "owner" => Ok(Self::PerOwner),
            "global" => Ok(Self::Global),
            other => Err(ReactiveError::invalid_notify_mode(other)),
        }
    }
}

impl fmt::Display for NotifyMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::PerOwner => "per-owner",
            Self::Global => "global",
        })
    }
}

/// Configuration for a [`Reactive`](crate::Reactive) engine.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReactiveConfig {
    pub notify: NotifyMode,
}

impl ReactiveConfig {
    pub const ENV_NOTIFY: &'static str = "TRIPWIRE_NOTIFY";

    /// Defaults overlaid with environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Defaults overlaid with values from `lookup`. Unparseable values are
    /// logged and ignored.
    #[must_use]
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        if let Some(raw) = lookup(Self::ENV_NOTIFY) {
            match raw.parse() {
                Ok(mode) => config.notify = mode,
                Err(err) => tracing::warn!(
                    message = "config.ignored",
                    variable = Self::ENV_NOTIFY,
                    error = %err
                ),
            }
        }
        config
    }

    #[must_use]
    pub fn with_notify(mut self, notify: NotifyMode) -> Self {
        self.notify = notify;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_per_owner() {
        assert_eq!(ReactiveConfig::default().notify, NotifyMode::PerOwner);
    }

    #[test]
    fn parses_modes() {
        assert_eq!("global".parse::<NotifyMode>(), Ok(NotifyMode::Global));
        assert_eq!(" Per-Owner ".parse::<NotifyMode>(), Ok(NotifyMode::PerOwner));
        assert_eq!(
            "sometimes".parse::<NotifyMode>(),
            Err(ReactiveError::invalid_notify_mode("sometimes"))
        );
    }

    #[test]
    fn lookup_overrides_default() {
        let config = ReactiveConfig::from_lookup(|name| {
            (name == ReactiveConfig::ENV_NOTIFY).then(|| "global".to_string())
        });
        assert_eq!(config.notify, NotifyMode::Global);
    }

    #[test]
    fn invalid_lookup_keeps_default() {
        let config = ReactiveConfig::from_lookup(|_| Some("bogus".to_string()));
        assert_eq!(config, ReactiveConfig::default());
    }

    #[test]
    fn builder_overrides_lookup() {
        let config = ReactiveConfig::from_lookup(|_| Some("global".to_string()))
            .with_notify(NotifyMode::PerOwner);
        assert_eq!(config.notify, NotifyMode::PerOwner);
    }

    #[test]
    fn display_round_trips() {
        for mode in [NotifyMode::PerOwner, NotifyMode::Global] {
            assert_eq!(mode.to_string().parse::<NotifyMode>(), Ok(mode));
        }
    }
}
