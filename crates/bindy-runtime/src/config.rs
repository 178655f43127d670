#![forbid(unsafe_code)]

//! Runtime configuration.
//!
//! [`BindyConfig`] is installed per thread. New endpoints read their default
//! ticker settings from it, and the propagation pipeline reads
//! `strict_assignability`. With the `config` feature it can be loaded from
//! TOML:
//!
//! ```toml
//! strict_assignability = false
//! register_default_converters = true
//!
//! [ticker]
//! mode = "time_based"
//! time_interval = "twice_per_second"
//! ```
//!
//! Missing keys fall back to [`BindyConfig::default`].

use std::cell::Cell;
#[cfg(feature = "config")]
use std::path::{Path, PathBuf};

#[cfg(feature = "config")]
use serde::{Deserialize, Serialize};

use crate::ticker::TickerSettings;

/// Per-thread runtime configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "config", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "config", serde(default))]
pub struct BindyConfig {
    /// Skip, instead of assigning, values that only fit a target through the
    /// `Any` top type and no converter.
    pub strict_assignability: bool,
    /// Whether [`reload`](crate::lifecycle::reload) restores the built-in
    /// converters.
    pub register_default_converters: bool,
    /// Ticker settings given to newly created endpoints.
    pub ticker: TickerSettings,
}

impl Default for BindyConfig {
    fn default() -> Self {
        Self {
            strict_assignability: false,
            register_default_converters: true,
            ticker: TickerSettings::default(),
        }
    }
}

thread_local! {
    static CURRENT: Cell<BindyConfig> = Cell::new(BindyConfig::default());
}

impl BindyConfig {
    /// The configuration installed on this thread.
    #[must_use]
    pub fn current() -> Self {
        CURRENT.with(Cell::get)
    }

    /// Install `self` on this thread.
    pub fn install(self) {
        tracing::debug!(config = ?self, "bindy config installed");
        CURRENT.with(|current| current.set(self));
    }

    /// Restore the default configuration on this thread.
    pub fn reset() {
        CURRENT.with(|current| current.set(Self::default()));
    }
}

/// Errors from loading a [`BindyConfig`].
#[cfg(feature = "config")]
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
}

#[cfg(feature = "config")]
impl BindyConfig {
    /// Parse from a TOML document.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Parse`] on malformed TOML or unknown enum values.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Read and parse a TOML file.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Io`] if the file cannot be read, otherwise as
    /// [`from_toml_str`](Self::from_toml_str).
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str(&text)?;
        tracing::info!(path = %path.display(), "loaded bindy config");
        Ok(config)
    }

    /// Render as TOML.
    ///
    /// # Errors
    ///
    /// Propagates serializer failures.
    pub fn to_toml_string(&self) -> Result<String, toml::ser::Error> {
        toml::to_string(self)
    }
}
