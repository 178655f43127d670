#![forbid(unsafe_code)]

//! Host-lifecycle glue for endpoints.
//!
//! A [`BindingScope`] collects the `(BindId, Endpoint)` pairs that belong to
//! one host object. Enabling the scope joins every endpoint to its group and
//! starts ticking; disabling stops ticking and leaves the groups. The
//! endpoints survive and rejoin on the next `enable`.
//!
//! # Usage
//!
//! ```ignore
//! let mut scope = BindingScope::new();
//! scope.add(BindId::new("Audio", "Master"), Endpoint::field(slider, "value"));
//! scope.enable();
//! // Dropping the scope disables it.
//! ```
//!
//! # Invariants
//!
//! 1. While enabled, every held endpoint is a member of its group.
//! 2. After `disable` (or drop), no held endpoint ticks or is bound.
//! 3. Endpoints added to an enabled scope join immediately.

use bindy_core::BindId;

use crate::endpoint::Endpoint;
use crate::registry::BindRegistry;

/// Endpoints owned by one host, joined and left together.
pub struct BindingScope {
    entries: Vec<(BindId, Endpoint)>,
    enabled: bool,
    registry: BindRegistry,
}

impl BindingScope {
    /// A disabled scope using this thread's global registry.
    #[must_use]
    pub fn new() -> Self {
        Self::with_registry(BindRegistry::global())
    }

    /// A disabled scope using `registry`.
    #[must_use]
    pub fn with_registry(registry: BindRegistry) -> Self {
        Self {
            entries: Vec::new(),
            enabled: false,
            registry,
        }
    }

    /// Hold `endpoint` for the group `id`. Joins right away if enabled.
    ///
    /// Returns a reference to the scope for chaining.
    pub fn add(&mut self, id: BindId, endpoint: Endpoint) -> &mut Self {
        if self.enabled {
            Self::join(&self.registry, &id, &endpoint);
        }
        self.entries.push((id, endpoint));
        self
    }

    fn join(registry: &BindRegistry, id: &BindId, endpoint: &Endpoint) {
        registry.add_bindable(id.clone(), endpoint);
        endpoint.start_ticking();
    }

    fn leave(endpoint: &Endpoint) {
        endpoint.stop_ticking();
        endpoint.unbind();
    }

    /// Join every endpoint to its group and start ticking.
    pub fn enable(&mut self) {
        if self.enabled {
            return;
        }
        self.enabled = true;
        for (id, endpoint) in &self.entries {
            Self::join(&self.registry, id, endpoint);
        }
        tracing::debug!(endpoints = self.entries.len(), "binding scope enabled");
    }

    /// Stop ticking and leave every group.
    pub fn disable(&mut self) {
        if !self.enabled {
            return;
        }
        self.enabled = false;
        for (_, endpoint) in &self.entries {
            Self::leave(endpoint);
        }
        tracing::debug!(endpoints = self.entries.len(), "binding scope disabled");
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Drop endpoints whose accessor cannot resolve. Returns how many were
    /// dropped.
    pub fn prune_invalid(&mut self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|(id, endpoint)| {
            let valid = endpoint.is_valid();
            if !valid {
                tracing::warn!(group = %id, endpoint = %endpoint.describe(), "pruned invalid endpoint");
                Self::leave(endpoint);
            }
            valid
        });
        before - self.entries.len()
    }

    /// Held endpoints with their group ids.
    pub fn endpoints(&self) -> impl Iterator<Item = (&BindId, &Endpoint)> {
        self.entries.iter().map(|(id, e)| (id, e))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Disable and forget every endpoint. The scope can be reused.
    pub fn clear(&mut self) {
        self.disable();
        self.entries.clear();
    }
}

impl Default for BindingScope {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for BindingScope {
    fn drop(&mut self) {
        self.disable();
    }
}

impl std::fmt::Debug for BindingScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BindingScope")
            .field("endpoints", &self.entries.len())
            .field("enabled", &self.enabled)
            .finish()
    }
}
