#![forbid(unsafe_code)]

//! Identifiers for endpoints and bind groups.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Global counter for unique guids. Zero is reserved for [`Guid::NIL`].
static GUID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Process-unique identifier for endpoints and bind groups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Guid(u64);

impl Guid {
    /// The empty guid. Never handed out by [`Guid::next`].
    pub const NIL: Guid = Guid(0);

    /// Allocate a fresh guid.
    #[must_use]
    pub fn next() -> Self {
        Self(GUID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Whether this is [`Guid::NIL`].
    #[inline]
    #[must_use]
    pub const fn is_nil(self) -> bool {
        self.0 == 0
    }

    /// Raw value.
    #[inline]
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Guid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// Category used by the default bind id.
pub const DEFAULT_CATEGORY: &str = "Default";
/// Name used by the default bind id.
pub const DEFAULT_NAME: &str = "Default";

/// Composite `(category, name)` key of a bind group.
///
/// The default pair is special: looking it up always yields a fresh,
/// unregistered group.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BindId {
    /// Grouping category (e.g. `"Audio"`).
    pub category: String,
    /// Name within the category (e.g. `"MasterVolume"`).
    pub name: String,
}

impl BindId {
    /// Create a bind id.
    #[must_use]
    pub fn new(category: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            category: category.into(),
            name: name.into(),
        }
    }

    /// Whether this is the distinguished default pair.
    #[must_use]
    pub fn is_default(&self) -> bool {
        self.category == DEFAULT_CATEGORY && self.name == DEFAULT_NAME
    }
}

impl Default for BindId {
    fn default() -> Self {
        Self::new(DEFAULT_CATEGORY, DEFAULT_NAME)
    }
}

impl fmt::Display for BindId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.category, self.name)
    }
}
