#![forbid(unsafe_code)]

//! Bind groups: the propagation hub.
//!
//! A [`BindGroup`] owns a set of [`Endpoint`]s. When one of them reports a
//! change through [`notify_change`](BindGroup::notify_change), the group runs
//! the propagation pipeline against every sibling that is not a Sender and
//! records the change as its last value.
//!
//! # Invariants
//!
//! 1. An endpoint is held at most once, checked by identity and by guid.
//! 2. Adding an endpoint removes it from its previous group first.
//! 3. The changed endpoint never receives its own value.
//! 4. Endpoint callbacks (on-join, pipeline writes, observers) run outside
//!    the group's borrows.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use ahash::AHashSet;
use bindy_core::{BindId, Guid, ObserverList, Subscription, Value, ValueType};

use crate::endpoint::{Endpoint, EndpointInner, Role};
use crate::pipeline::{self, Propagation, SkipReason};
use crate::registry::BindRegistry;

pub(crate) struct GroupInner {
    guid: Guid,
    id: BindId,
    endpoints: RefCell<Vec<Endpoint>>,
    guids: RefCell<AHashSet<Guid>>,
    last_changed: RefCell<Option<(Guid, Weak<EndpointInner>)>>,
    last_value: RefCell<Option<Value>>,
    last_value_type: Cell<Option<(ValueType, ValueType)>>,
    updates: ObserverList<Value>,
}

/// Shared handle to a group of bound endpoints.
#[derive(Clone)]
pub struct BindGroup {
    inner: Rc<GroupInner>,
}

impl BindGroup {
    /// A new group that is not registered anywhere.
    #[must_use]
    pub fn new(id: BindId) -> Self {
        Self {
            inner: Rc::new(GroupInner {
                guid: Guid::next(),
                id,
                endpoints: RefCell::new(Vec::new()),
                guids: RefCell::new(AHashSet::new()),
                last_changed: RefCell::new(None),
                last_value: RefCell::new(None),
                last_value_type: Cell::new(None),
                updates: ObserverList::new(),
            }),
        }
    }

    /// Look up or create the group for `id` in this thread's global
    /// registry. The default id always yields a fresh group.
    #[must_use]
    pub fn get_or_create(id: BindId) -> Self {
        BindRegistry::global().get_or_create(id)
    }

    pub(crate) fn from_inner(inner: Rc<GroupInner>) -> Self {
        Self { inner }
    }

    pub(crate) fn as_ptr(&self) -> *const GroupInner {
        Rc::as_ptr(&self.inner)
    }

    #[must_use]
    pub fn guid(&self) -> Guid {
        self.inner.guid
    }

    #[must_use]
    pub fn id(&self) -> &BindId {
        &self.inner.id
    }

    /// Whether both handles point at the same group.
    #[must_use]
    pub fn ptr_eq(&self, other: &BindGroup) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    // -----------------------------------------------------------------------
    // Membership
    // -----------------------------------------------------------------------

    /// Add `endpoint`, moving it out of any previous group, then run its
    /// on-join behavior. Returns `false` if it is already a member.
    pub fn add_bindable(&self, endpoint: &Endpoint) -> bool {
        if self.contains_bindable(endpoint) || self.contains_guid(endpoint.guid()) {
            return false;
        }
        if let Some(previous) = endpoint.group() {
            previous.remove_bindable(endpoint);
        }
        self.inner.endpoints.borrow_mut().push(endpoint.clone());
        self.inner.guids.borrow_mut().insert(endpoint.guid());
        endpoint.set_group(Rc::downgrade(&self.inner));
        tracing::debug!(
            group = %self.inner.id,
            endpoint = %endpoint.describe(),
            role = ?endpoint.role(),
            "endpoint joined"
        );
        endpoint.run_on_join_behavior();
        true
    }

    /// Add several endpoints. Returns how many were added.
    pub fn add_bindables<'a>(&self, endpoints: impl IntoIterator<Item = &'a Endpoint>) -> usize {
        endpoints
            .into_iter()
            .filter(|e| self.add_bindable(e))
            .count()
    }

    /// Remove `endpoint` (matched by identity or guid).
    pub fn remove_bindable(&self, endpoint: &Endpoint) -> bool {
        let guid = endpoint.guid();
        let removed = {
            let mut endpoints = self.inner.endpoints.borrow_mut();
            let index = endpoints
                .iter()
                .position(|e| e.ptr_eq(endpoint) || e.guid() == guid);
            index.map(|i| endpoints.remove(i))
        };
        let Some(removed) = removed else {
            return false;
        };
        self.inner.guids.borrow_mut().remove(&guid);
        if removed.belongs_to(self) {
            removed.set_group(Weak::new());
        }
        {
            let mut last = self.inner.last_changed.borrow_mut();
            if last.as_ref().is_some_and(|(g, _)| *g == guid) {
                *last = None;
            }
        }
        tracing::debug!(group = %self.inner.id, endpoint = %removed.describe(), "endpoint left");
        true
    }

    /// Remove several endpoints. Returns how many were removed.
    pub fn remove_bindables<'a>(&self, endpoints: impl IntoIterator<Item = &'a Endpoint>) -> usize {
        endpoints
            .into_iter()
            .filter(|e| self.remove_bindable(e))
            .count()
    }

    #[must_use]
    pub fn contains_bindable(&self, endpoint: &Endpoint) -> bool {
        self.inner.endpoints.borrow().iter().any(|e| e.ptr_eq(endpoint))
    }

    #[must_use]
    pub fn contains_guid(&self, guid: Guid) -> bool {
        self.inner.guids.borrow().contains(&guid)
    }

    /// Snapshot of the member endpoints in join order.
    #[must_use]
    pub fn bindables(&self) -> Vec<Endpoint> {
        self.inner.endpoints.borrow().clone()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.endpoints.borrow().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.endpoints.borrow().is_empty()
    }

    /// Drop every member and forget the last change.
    pub fn clear_bindables(&self) {
        let endpoints = std::mem::take(&mut *self.inner.endpoints.borrow_mut());
        self.inner.guids.borrow_mut().clear();
        *self.inner.last_changed.borrow_mut() = None;
        *self.inner.last_value.borrow_mut() = None;
        self.inner.last_value_type.set(None);
        for endpoint in &endpoints {
            if endpoint.belongs_to(self) {
                endpoint.set_group(Weak::new());
            }
        }
    }

    fn find(&self, guid: Guid) -> Option<Endpoint> {
        self.inner
            .endpoints
            .borrow()
            .iter()
            .find(|e| e.guid() == guid)
            .cloned()
    }

    // -----------------------------------------------------------------------
    // Propagation
    // -----------------------------------------------------------------------

    /// Propagate the value of the member `changed` to every sibling that is
    /// not a Sender. Returns whether propagation ran.
    pub fn notify_change(&self, changed: Guid) -> bool {
        let _span = tracing::debug_span!(
            "bind_notify",
            group = %self.inner.id,
            source = %changed
        )
        .entered();

        if changed.is_nil() || !self.contains_guid(changed) {
            tracing::trace!("change from non-member ignored");
            return false;
        }
        let Some(source) = self.find(changed) else {
            return false;
        };
        if !source.is_valid() {
            tracing::warn!(source = %source.describe(), "change from unresolved endpoint ignored");
            return false;
        }
        let Some(source_type) = source.value_type() else {
            tracing::warn!(
                source = %source.describe(),
                "cannot propagate: source value type is undetermined"
            );
            return false;
        };

        let targets: Vec<Endpoint> = self
            .inner
            .endpoints
            .borrow()
            .iter()
            .filter(|e| e.guid() != changed)
            .cloned()
            .collect();
        for target in &targets {
            if target.role() == Role::Sender {
                continue;
            }
            let outcome = pipeline::process_value(self, &source, target);
            tracing::debug!(target = %target.describe(), ?outcome, "propagated");
        }

        let value = source.value();
        *self.inner.last_changed.borrow_mut() = Some((changed, source.downgrade()));
        *self.inner.last_value.borrow_mut() = value.clone();
        let declared_type = source.declared_type().unwrap_or(source_type);
        self.inner
            .last_value_type
            .set(Some((source_type, declared_type)));
        if let Some(value) = value {
            self.inner.updates.notify(&value);
        }
        true
    }

    /// The last endpoint that changed, if it is still alive and a member.
    #[must_use]
    pub fn last_changed(&self) -> Option<Endpoint> {
        let last = self.inner.last_changed.borrow();
        let (guid, weak) = last.as_ref()?;
        if !self.contains_guid(*guid) {
            return None;
        }
        weak.upgrade().map(Endpoint::from_inner)
    }

    #[must_use]
    pub fn last_changed_guid(&self) -> Option<Guid> {
        self.inner.last_changed.borrow().as_ref().map(|(g, _)| *g)
    }

    /// The last propagated value.
    #[must_use]
    pub fn last_value(&self) -> Option<Value> {
        self.inner.last_value.borrow().clone()
    }

    /// Bring `target` up to date with the group.
    ///
    /// Uses the last propagated value; before any change was propagated it
    /// falls back to the first other valid endpoint that is not a Receiver.
    /// Does nothing if `target` itself made the last change.
    pub fn pull_into(&self, target: &Endpoint) -> Propagation {
        if !self.contains_guid(target.guid()) {
            return Propagation::Skipped(SkipReason::InvalidTarget);
        }
        if self.last_changed_guid() == Some(target.guid()) {
            return Propagation::Discarded;
        }
        let last = self.last_value().zip(self.inner.last_value_type.get());
        if let Some((value, (value_type, declared_type))) = last {
            let source = self
                .last_changed()
                .map_or_else(|| format!("group {}", self.inner.id), |e| e.describe());
            return pipeline::deliver_typed(value, value_type, declared_type, &source, target);
        }
        let fallback = self.bindables().into_iter().find(|e| {
            !e.ptr_eq(target) && e.role() != Role::Receiver && e.is_valid()
        });
        match fallback {
            Some(source) => pipeline::process_value(self, &source, target),
            None => Propagation::Skipped(SkipReason::InvalidSource),
        }
    }

    /// Observe values propagated by this group.
    pub fn subscribe(&self, callback: impl Fn(&Value) + 'static) -> Subscription {
        self.inner.updates.subscribe(callback)
    }
}

impl fmt::Debug for BindGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BindGroup")
            .field("id", &self.inner.id)
            .field("guid", &self.inner.guid)
            .field("bindables", &self.len())
            .field("last_value", &self.inner.last_value.borrow())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bindy_core::{FrameClock, HostRef, TypeBuilder, host};
    use std::time::Duration;

    struct Meter {
        level: i32,
    }

    fn register() {
        TypeBuilder::<Meter>::new("Meter")
            .field("level", |m: &Meter| m.level, |m, v| m.level = v)
            .register();
    }

    fn meter(level: i32) -> HostRef {
        host(Meter { level })
    }

    fn endpoint(level: i32) -> Endpoint {
        Endpoint::field(meter(level), "level")
    }

    #[test]
    fn endpoint_is_added_once() {
        register();
        let group = BindGroup::new(BindId::new("t", "once"));
        let ep = endpoint(0);
        assert!(group.add_bindable(&ep));
        assert!(!group.add_bindable(&ep));
        assert!(!group.add_bindable(&ep.clone()));
        assert_eq!(group.len(), 1);
        assert!(ep.group().is_some_and(|g| g.ptr_eq(&group)));
    }

    #[test]
    fn joining_moves_between_groups() {
        register();
        let a = BindGroup::new(BindId::new("t", "a"));
        let b = BindGroup::new(BindId::new("t", "b"));
        let ep = endpoint(0);
        ep.bind_to(&a);
        ep.bind_to(&b);
        assert!(!a.contains_bindable(&ep));
        assert!(!a.contains_guid(ep.guid()));
        assert!(b.contains_bindable(&ep));
        assert!(ep.group().is_some_and(|g| g.ptr_eq(&b)));
    }

    #[test]
    fn change_reaches_siblings_but_not_source() {
        register();
        let group = BindGroup::new(BindId::new("t", "fanout"));
        let src = endpoint(0);
        let a = endpoint(0);
        let b = endpoint(0);
        group.add_bindables([&src, &a, &b]);

        let echoed = Rc::new(Cell::new(0));
        let e = Rc::clone(&echoed);
        let _sub = src.subscribe(move |_| e.set(e.get() + 1)).unwrap();

        assert!(src.set_value(5));
        assert_eq!(a.value(), Some(Value::Int(5)));
        assert_eq!(b.value(), Some(Value::Int(5)));
        assert_eq!(echoed.get(), 1);
        assert_eq!(group.last_value(), Some(Value::Int(5)));
        assert!(group.last_changed().is_some_and(|e| e.ptr_eq(&src)));
    }

    #[test]
    fn senders_are_skipped() {
        register();
        let group = BindGroup::new(BindId::new("t", "senders"));
        let src = endpoint(0);
        let sender = endpoint(1).with_role(Role::Sender);
        group.add_bindables([&src, &sender]);
        src.set_value(8);
        assert_eq!(sender.value(), Some(Value::Int(1)));
    }

    #[test]
    fn non_member_change_is_ignored() {
        register();
        let group = BindGroup::new(BindId::new("t", "strangers"));
        let member = endpoint(0);
        group.add_bindable(&member);
        assert!(!group.notify_change(Guid::NIL));
        assert!(!group.notify_change(endpoint(3).guid()));
        assert_eq!(member.value(), Some(Value::Int(0)));
    }

    #[test]
    fn removal_clears_back_reference() {
        register();
        let group = BindGroup::new(BindId::new("t", "remove"));
        let a = endpoint(0);
        let b = endpoint(0);
        group.add_bindables([&a, &b]);
        a.set_value(2);
        assert!(a.unbind_from(&group));
        assert!(a.group().is_none());
        assert!(group.last_changed().is_none());
        assert_eq!(group.last_value(), Some(Value::Int(2)));

        FrameClock::advance(Duration::from_millis(16));
        assert!(a.set_value(3));
        assert_eq!(b.value(), Some(Value::Int(2)));
        assert!(!a.unbind());
    }

    #[test]
    fn clear_bindables_unbinds_everyone() {
        register();
        let group = BindGroup::new(BindId::new("t", "clear"));
        let a = endpoint(0);
        let b = endpoint(0);
        group.add_bindables([&a, &b]);
        group.clear_bindables();
        assert!(group.is_empty());
        assert!(a.group().is_none());
        assert!(b.group().is_none());
        assert_eq!(group.last_value(), None);
    }

    #[test]
    fn updates_observers_see_propagated_value() {
        register();
        let group = BindGroup::new(BindId::new("t", "updates"));
        let a = endpoint(0);
        group.add_bindable(&a);
        let seen = Rc::new(RefCell::new(Vec::new()));
        let s = Rc::clone(&seen);
        let _sub = group.subscribe(move |v| s.borrow_mut().push(v.clone()));
        a.set_value(4);
        FrameClock::advance(Duration::from_millis(16));
        a.set_value(6);
        assert_eq!(*seen.borrow(), vec![Value::Int(4), Value::Int(6)]);
    }

    #[test]
    fn dropped_group_leaves_endpoint_unbound() {
        register();
        let ep = endpoint(0);
        {
            let group = BindGroup::new(BindId::new("t", "temp"));
            group.add_bindable(&ep);
            assert!(ep.is_live());
        }
        assert!(ep.group().is_none());
        assert!(ep.set_value(1));
    }
}
