#![forbid(unsafe_code)]

//! Store configuration.

use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;

/// Environment variable selecting [`SetupNotify`].
pub const ENV_SETUP_NOTIFY: &str = "DRAFTSTATE_SETUP_NOTIFY";
/// Environment variable overriding the store label.
pub const ENV_LABEL: &str = "DRAFTSTATE_LABEL";

/// When a repeated `setup` tells existing observers about the new snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SetupNotify {
    /// Hand the notification to the store's scheduler (next tick).
    #[default]
    Deferred,
    /// Notify inline, inside the `setup` call.
    Immediate,
}

impl FromStr for SetupNotify {
    type Err = UnknownSetupNotify;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "deferred" | "defer" | "tick" => Ok(Self::Deferred),
            "immediate" | "sync" => Ok(Self::Immediate),
            _ => Err(UnknownSetupNotify(s.to_string())),
        }
    }
}

impl fmt::Display for SetupNotify {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Deferred => "deferred",
            Self::Immediate => "immediate",
        })
    }
}

/// Unrecognised [`SetupNotify`] spelling.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown setup notify mode: {0:?}")]
pub struct UnknownSetupNotify(pub String);

/// Configuration for one store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    /// Name attached to every log event from this store.
    /// Default: "store".
    pub label: Cow<'static, str>,

    /// Notification policy for a repeated `setup`.
    /// Default: [`SetupNotify::Deferred`].
    pub setup_notify: SetupNotify,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            label: Cow::Borrowed("store"),
            setup_notify: SetupNotify::Deferred,
        }
    }
}

impl StoreConfig {
    #[must_use]
    pub fn with_label(mut self, label: impl Into<Cow<'static, str>>) -> Self {
        self.label = label.into();
        self
    }

    #[must_use]
    pub fn with_setup_notify(mut self, setup_notify: SetupNotify) -> Self {
        self.setup_notify = setup_notify;
        self
    }

    /// Defaults overridden by `DRAFTSTATE_LABEL` and `DRAFTSTATE_SETUP_NOTIFY`.
    ///
    /// Unparseable values are ignored.
    #[must_use]
    pub fn from_env() -> Self {
        Self::default().apply_env(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary variable lookup.
    #[must_use]
    pub fn apply_env(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(label) = lookup(ENV_LABEL).filter(|l| !l.is_empty()) {
            self.label = Cow::Owned(label);
        }
        if let Some(mode) = lookup(ENV_SETUP_NOTIFY).and_then(|m| m.parse().ok()) {
            self.setup_notify = mode;
        }
        self
    }
}
