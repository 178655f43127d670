#![forbid(unsafe_code)]

//! Registry of bind groups keyed by [`BindId`].
//!
//! Each thread has a global registry ([`BindRegistry::global`]); standalone
//! registries can be created for isolation.
//!
//! # Invariants
//!
//! 1. At most one group per non-default id.
//! 2. The default id is never registered; looking it up always returns a
//!    fresh group.
//! 3. `clear` empties every group it held, so no endpoint stays bound to a
//!    forgotten group.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use ahash::AHashMap;
use bindy_core::{BindId, Guid};
use thiserror::Error;

use crate::endpoint::Endpoint;
use crate::group::BindGroup;

/// Errors from explicit group registration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BindRegistryError {
    #[error("the default bind id cannot be registered")]
    DefaultId,
    #[error("group {0} is already registered")]
    AlreadyRegistered(BindId),
    #[error("group {0} is not registered")]
    NotRegistered(BindId),
    #[error("another group is already registered as {0}")]
    Conflict(BindId),
}

#[derive(Default)]
struct RegistryState {
    binds: AHashMap<BindId, BindGroup>,
    guids: AHashMap<Guid, BindId>,
}

/// Shared handle to a bind group registry.
#[derive(Clone, Default)]
pub struct BindRegistry {
    state: Rc<RefCell<RegistryState>>,
}

impl fmt::Debug for BindRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BindRegistry")
            .field("binds", &self.len())
            .finish()
    }
}

thread_local! {
    static GLOBAL: BindRegistry = BindRegistry::new();
}

impl BindRegistry {
    /// A standalone, empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// This thread's global registry.
    #[must_use]
    pub fn global() -> Self {
        GLOBAL.with(Clone::clone)
    }

    /// The group for `id`, created and registered if missing. The default id
    /// always yields a new unregistered group.
    pub fn get_or_create(&self, id: BindId) -> BindGroup {
        if id.is_default() {
            return BindGroup::new(id);
        }
        if let Some(group) = self.get(&id) {
            return group;
        }
        let group = BindGroup::new(id.clone());
        let mut state = self.state.borrow_mut();
        state.guids.insert(group.guid(), id.clone());
        state.binds.insert(id, group.clone());
        tracing::debug!(group = %group.id(), "bind group created");
        group
    }

    #[must_use]
    pub fn get(&self, id: &BindId) -> Option<BindGroup> {
        self.state.borrow().binds.get(id).cloned()
    }

    /// Register a group built outside the registry.
    ///
    /// # Errors
    ///
    /// [`BindRegistryError::DefaultId`], [`BindRegistryError::AlreadyRegistered`]
    /// or [`BindRegistryError::Conflict`] when another group holds the id.
    pub fn add_bind(&self, group: &BindGroup) -> Result<(), BindRegistryError> {
        let id = group.id().clone();
        if id.is_default() {
            return Err(BindRegistryError::DefaultId);
        }
        let mut state = self.state.borrow_mut();
        if state.guids.contains_key(&group.guid()) {
            return Err(BindRegistryError::AlreadyRegistered(id));
        }
        if state.binds.contains_key(&id) {
            return Err(BindRegistryError::Conflict(id));
        }
        state.guids.insert(group.guid(), id.clone());
        state.binds.insert(id, group.clone());
        Ok(())
    }

    /// Unregister `group`. Its endpoints stay bound to it.
    ///
    /// # Errors
    ///
    /// [`BindRegistryError::NotRegistered`] if this exact group is not held.
    pub fn remove_bind(&self, group: &BindGroup) -> Result<(), BindRegistryError> {
        let mut state = self.state.borrow_mut();
        if state.guids.remove(&group.guid()).is_none() {
            return Err(BindRegistryError::NotRegistered(group.id().clone()));
        }
        state.binds.remove(group.id());
        Ok(())
    }

    /// Unregister whatever group holds `id`.
    pub fn remove_bind_id(&self, id: &BindId) -> Option<BindGroup> {
        let mut state = self.state.borrow_mut();
        let group = state.binds.remove(id)?;
        state.guids.remove(&group.guid());
        Some(group)
    }

    /// Whether a group with this guid is registered.
    #[must_use]
    pub fn contains_bind(&self, guid: Guid) -> bool {
        self.state.borrow().guids.contains_key(&guid)
    }

    #[must_use]
    pub fn contains_bind_id(&self, id: &BindId) -> bool {
        self.state.borrow().binds.contains_key(id)
    }

    #[must_use]
    pub fn contains(&self, category: &str, name: &str) -> bool {
        self.state
            .borrow()
            .binds
            .keys()
            .any(|id| id.category == category && id.name == name)
    }

    /// Bind `endpoint` to the group for `id`, creating it if needed.
    pub fn add_bindable(&self, id: BindId, endpoint: &Endpoint) -> BindGroup {
        let group = self.get_or_create(id);
        group.add_bindable(endpoint);
        group
    }

    pub fn add_bindables<'a>(
        &self,
        id: BindId,
        endpoints: impl IntoIterator<Item = &'a Endpoint>,
    ) -> BindGroup {
        let group = self.get_or_create(id);
        group.add_bindables(endpoints);
        group
    }

    /// Remove `endpoint` from the group registered for `id`.
    pub fn remove_bindable(&self, id: &BindId, endpoint: &Endpoint) -> bool {
        self.get(id).is_some_and(|g| g.remove_bindable(endpoint))
    }

    pub fn remove_bindables<'a>(
        &self,
        id: &BindId,
        endpoints: impl IntoIterator<Item = &'a Endpoint>,
    ) -> usize {
        self.get(id).map_or(0, |g| g.remove_bindables(endpoints))
    }

    /// Snapshot of the registered groups, ordered by id.
    #[must_use]
    pub fn binds(&self) -> Vec<BindGroup> {
        let mut binds: Vec<BindGroup> = self.state.borrow().binds.values().cloned().collect();
        binds.sort_by(|a, b| a.id().cmp(b.id()));
        binds
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.state.borrow().binds.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.state.borrow().binds.is_empty()
    }

    /// Forget every group and empty each of them.
    pub fn clear(&self) {
        let binds = {
            let mut state = self.state.borrow_mut();
            state.guids.clear();
            std::mem::take(&mut state.binds)
        };
        tracing::debug!(groups = binds.len(), "bind registry cleared");
        for group in binds.values() {
            group.clear_bindables();
        }
    }
}
