#![forbid(unsafe_code)]

//! Bindable endpoints.
//!
//! An [`Endpoint`] wraps a [`ValueAccessor`] with a [`Role`], an optional
//! transformer, an [`OnJoin`] policy and a [`Ticker`] that polls the member
//! for external changes. Endpoints join a [`BindGroup`], which propagates a
//! change in one endpoint to its siblings.
//!
//! # Lifecycle
//!
//! ```text
//! Unbound --bind_to--> Bound, not ticking --start_ticking--> Bound, ticking
//!    ^                        |    ^                              |
//!    +------unbind_from-------+    +---------stop_ticking---------+
//! ```
//!
//! Receivers skip `start_ticking`. An endpoint that leaves its group keeps
//! its state and can rejoin.
//!
//! # Invariants
//!
//! 1. An endpoint belongs to at most one group.
//! 2. A Sender never receives propagated values.
//! 3. A Receiver never starts propagation, neither by ticking, by writing,
//!    nor by pushing on join.
//! 4. While an endpoint's write and the group notification it triggers are
//!    in progress, further writes to that endpoint are refused.
//! 5. After [`Endpoint::set_value`] changed the member, further `set_value`
//!    calls on that endpoint are refused until the next frame. Propagated
//!    writes and ticks are not limited this way.
//!
//! # Failure Modes
//!
//! | Condition | Behavior |
//! |-----------|----------|
//! | Accessor cannot resolve | Reads return `None`, writes return `false` (logged) |
//! | Accessor busy (re-entrant borrow) | Operation skipped (trace) |
//! | Group dropped | Endpoint behaves as unbound |

use std::cell::{Cell, RefCell, RefMut};
use std::fmt;
use std::rc::{Rc, Weak};

use bindy_core::{
    Guid, HostRef, ObserverList, Subscription, Value, ValueAccessor, ValueTransformer, ValueType,
    WeakHostRef,
};

use crate::config::BindyConfig;
use crate::group::{BindGroup, GroupInner};
use crate::scheduler::Scheduler;
use crate::ticker::{Ticker, TickerSettings};

/// Direction of an endpoint in its group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Role {
    /// Pushes changes, never receives.
    Sender,
    /// Receives changes, never pushes.
    Receiver,
    #[default]
    Bidirectional,
}

/// What happens when an endpoint joins a group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum OnJoin {
    #[default]
    DoNothing,
    /// Propagate this endpoint's value to the group immediately.
    PushValueOnJoin,
    /// At the end of the frame, take the group's last value.
    PullValueOnJoin,
}

pub(crate) struct EndpointInner {
    guid: Guid,
    accessor: RefCell<ValueAccessor>,
    role: Cell<Role>,
    on_join: Cell<OnJoin>,
    transformer: RefCell<Option<Rc<dyn ValueTransformer>>>,
    group: RefCell<Weak<GroupInner>>,
    host: RefCell<Option<WeakHostRef>>,
    label: RefCell<String>,
    ticker: RefCell<Ticker>,
}

/// Shared handle to a bindable endpoint.
#[derive(Clone)]
pub struct Endpoint {
    inner: Rc<EndpointInner>,
}

impl Endpoint {
    /// Wrap `accessor`, ticking on this thread's global scheduler with the
    /// installed default ticker settings.
    #[must_use]
    pub fn new(accessor: ValueAccessor) -> Self {
        Self::with_scheduler(accessor, Scheduler::global())
    }

    /// Wrap `accessor`, ticking on `scheduler`.
    #[must_use]
    pub fn with_scheduler(accessor: ValueAccessor, scheduler: Scheduler) -> Self {
        let settings = BindyConfig::current().ticker;
        let host = accessor.target().map(Rc::downgrade);
        let inner = Rc::new_cyclic(|weak: &Weak<EndpointInner>| {
            let weak = weak.clone();
            let ticker = Ticker::with_scheduler(scheduler, settings, move || {
                if let Some(inner) = weak.upgrade() {
                    Endpoint { inner }.tick();
                }
            });
            EndpointInner {
                guid: Guid::next(),
                accessor: RefCell::new(accessor),
                role: Cell::new(Role::default()),
                on_join: Cell::new(OnJoin::default()),
                transformer: RefCell::new(None),
                group: RefCell::new(Weak::new()),
                host: RefCell::new(host),
                label: RefCell::new(String::new()),
                ticker: RefCell::new(ticker),
            }
        });
        Self { inner }
    }

    /// Endpoint for the field `name` on `host`.
    #[must_use]
    pub fn field(host: HostRef, name: impl Into<String>) -> Self {
        Self::new(ValueAccessor::field(host, name))
    }

    /// Endpoint for the property `name` on `host`.
    #[must_use]
    pub fn property(host: HostRef, name: impl Into<String>) -> Self {
        Self::new(ValueAccessor::property(host, name))
    }

    pub(crate) fn from_inner(inner: Rc<EndpointInner>) -> Self {
        Self { inner }
    }

    pub(crate) fn downgrade(&self) -> Weak<EndpointInner> {
        Rc::downgrade(&self.inner)
    }

    #[must_use]
    pub fn with_role(self, role: Role) -> Self {
        self.set_role(role);
        self
    }

    #[must_use]
    pub fn with_on_join(self, on_join: OnJoin) -> Self {
        self.set_on_join(on_join);
        self
    }

    #[must_use]
    pub fn with_transformer(self, transformer: impl ValueTransformer + 'static) -> Self {
        self.set_transformer(Some(Rc::new(transformer)));
        self
    }

    #[must_use]
    pub fn with_ticker(self, settings: TickerSettings) -> Self {
        self.set_ticker_settings(settings);
        self
    }

    /// Diagnostic label used in log messages.
    #[must_use]
    pub fn with_label(self, label: impl Into<String>) -> Self {
        *self.inner.label.borrow_mut() = label.into();
        self
    }

    /// Associate a host object for diagnostics. Held weakly.
    #[must_use]
    pub fn with_host(self, host: &HostRef, label: impl Into<String>) -> Self {
        *self.inner.host.borrow_mut() = Some(Rc::downgrade(host));
        self.with_label(label)
    }

    #[must_use]
    pub fn guid(&self) -> Guid {
        self.inner.guid
    }

    #[must_use]
    pub fn role(&self) -> Role {
        self.inner.role.get()
    }

    /// Change the role. Turning into a Receiver stops ticking.
    pub fn set_role(&self, role: Role) {
        self.inner.role.set(role);
        if role == Role::Receiver {
            self.stop_ticking();
        }
    }

    #[must_use]
    pub fn on_join(&self) -> OnJoin {
        self.inner.on_join.get()
    }

    pub fn set_on_join(&self, on_join: OnJoin) {
        self.inner.on_join.set(on_join);
    }

    #[must_use]
    pub fn transformer(&self) -> Option<Rc<dyn ValueTransformer>> {
        self.inner.transformer.borrow().clone()
    }

    pub fn set_transformer(&self, transformer: Option<Rc<dyn ValueTransformer>>) {
        *self.inner.transformer.borrow_mut() = transformer;
    }

    #[must_use]
    pub fn label(&self) -> String {
        self.inner.label.borrow().clone()
    }

    /// Whether the diagnostic host association is still alive.
    #[must_use]
    pub fn host_alive(&self) -> bool {
        self.inner
            .host
            .borrow()
            .as_ref()
            .is_some_and(|h| h.strong_count() > 0)
    }

    // -----------------------------------------------------------------------
    // Accessor
    // -----------------------------------------------------------------------

    fn accessor(&self) -> Option<RefMut<'_, ValueAccessor>> {
        match self.inner.accessor.try_borrow_mut() {
            Ok(accessor) => Some(accessor),
            Err(_) => {
                tracing::trace!(endpoint = %self.describe(), "accessor busy");
                None
            }
        }
    }

    /// Point the accessor at a new host. The member is re-resolved lazily.
    pub fn set_target(&self, host: HostRef) {
        *self.inner.host.borrow_mut() = Some(Rc::downgrade(&host));
        if let Some(mut accessor) = self.accessor() {
            accessor.set_target(host);
        }
    }

    pub fn set_field(&self, name: impl Into<String>) {
        if let Some(mut accessor) = self.accessor() {
            accessor.set_field(name);
        }
    }

    pub fn set_property(&self, name: impl Into<String>) {
        if let Some(mut accessor) = self.accessor() {
            accessor.set_property(name);
        }
    }

    /// Resolve the member now instead of lazily.
    pub fn initialize(&self) -> bool {
        self.accessor().is_some_and(|mut a| a.ensure_initialized())
    }

    /// Whether the accessor resolves its member.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.accessor().is_some_and(|mut a| a.is_valid())
    }

    /// Valid and a member of a group.
    #[must_use]
    pub fn is_live(&self) -> bool {
        self.is_valid() && self.group().is_some()
    }

    /// Current member value.
    #[must_use]
    pub fn value(&self) -> Option<Value> {
        self.accessor()?.get_value()
    }

    /// Declared type of the member.
    #[must_use]
    pub fn declared_type(&self) -> Option<ValueType> {
        let mut accessor = self.accessor()?;
        if !accessor.ensure_initialized() {
            return None;
        }
        accessor.value_type()
    }

    /// Type used for routing: the declared type, or the runtime type of the
    /// current value when the member is declared as [`ValueType::Any`].
    #[must_use]
    pub fn value_type(&self) -> Option<ValueType> {
        match self.declared_type()? {
            ValueType::Any => self
                .value()
                .map(|v| v.value_type())
                .filter(|ty| *ty != ValueType::Unit),
            ty => Some(ty),
        }
    }

    // -----------------------------------------------------------------------
    // Writes
    // -----------------------------------------------------------------------

    /// Write `value` and notify the group unless this is a Receiver.
    ///
    /// Returns whether the member changed. Only one such write per frame is
    /// accepted; later ones in the same frame return `false`.
    pub fn set_value(&self, value: impl Into<Value>) -> bool {
        self.write(value.into(), true)
    }

    /// Write `value` without notifying the group.
    ///
    /// Value-changed observers still fire.
    pub fn set_value_without_notify(&self, value: impl Into<Value>) -> bool {
        self.write(value.into(), false)
    }

    fn write(&self, value: Value, notify_group: bool) -> bool {
        if notify_group && self.accessor().is_some_and(|a| a.pushed_this_frame()) {
            tracing::trace!(endpoint = %self.describe(), "second write this frame ignored");
            return false;
        }
        let Some(_scope) = WriteScope::enter(self) else {
            return false;
        };
        let stored = match self.accessor() {
            Some(mut accessor) => {
                if !accessor.ensure_initialized() {
                    return false;
                }
                let stored = accessor.store(value.clone());
                if notify_group && matches!(stored, Ok(true)) {
                    accessor.mark_pushed();
                }
                stored
            }
            None => return false,
        };
        match stored {
            Ok(true) => {}
            Ok(false) => return false,
            Err(err) => {
                tracing::warn!(endpoint = %self.describe(), error = %err, "write rejected");
                return false;
            }
        }
        self.notify_observers(&value);
        if notify_group && self.role() != Role::Receiver {
            if let Some(group) = self.group() {
                group.notify_change(self.guid());
            }
        }
        true
    }

    fn notify_observers(&self, value: &Value) {
        let observers: Option<ObserverList<Value>> =
            self.accessor().map(|a| a.observers().clone());
        if let Some(observers) = observers {
            observers.notify(value);
        }
    }

    /// Register a value-changed observer.
    pub fn subscribe(&self, callback: impl Fn(&Value) + 'static) -> Option<Subscription> {
        self.accessor().map(|a| a.subscribe(callback))
    }

    // -----------------------------------------------------------------------
    // Group membership
    // -----------------------------------------------------------------------

    /// The owning group, if it is still alive.
    #[must_use]
    pub fn group(&self) -> Option<BindGroup> {
        self.inner.group.borrow().upgrade().map(BindGroup::from_inner)
    }

    pub(crate) fn set_group(&self, group: Weak<GroupInner>) {
        *self.inner.group.borrow_mut() = group;
    }

    pub(crate) fn belongs_to(&self, group: &BindGroup) -> bool {
        std::ptr::eq(self.inner.group.borrow().as_ptr(), group.as_ptr())
    }

    /// Join `group`, leaving the current one. Runs the on-join behavior.
    pub fn bind_to(&self, group: &BindGroup) -> bool {
        group.add_bindable(self)
    }

    /// Leave `group` if this endpoint is a member of it.
    pub fn unbind_from(&self, group: &BindGroup) -> bool {
        group.remove_bindable(self)
    }

    /// Leave whatever group this endpoint belongs to.
    pub fn unbind(&self) -> bool {
        match self.group() {
            Some(group) => group.remove_bindable(self),
            None => false,
        }
    }

    /// Apply the [`OnJoin`] policy against the current group.
    pub fn run_on_join_behavior(&self) {
        match self.on_join() {
            OnJoin::DoNothing => {}
            OnJoin::PushValueOnJoin => {
                if self.role() == Role::Receiver {
                    tracing::trace!(endpoint = %self.describe(), "receiver does not push on join");
                    return;
                }
                if !self.is_valid() {
                    tracing::warn!(endpoint = %self.describe(), "push on join skipped: invalid accessor");
                    return;
                }
                let Some(group) = self.group() else {
                    return;
                };
                let Some(_scope) = WriteScope::enter(self) else {
                    return;
                };
                group.notify_change(self.guid());
            }
            OnJoin::PullValueOnJoin => {
                if self.role() == Role::Sender {
                    tracing::trace!(endpoint = %self.describe(), "sender does not pull on join");
                    return;
                }
                let weak = self.downgrade();
                self.scheduler().defer_to_end_of_frame(move || {
                    let Some(inner) = weak.upgrade() else {
                        return;
                    };
                    let endpoint = Endpoint::from_inner(inner);
                    if let Some(group) = endpoint.group() {
                        group.pull_into(&endpoint);
                    }
                });
            }
        }
    }

    // -----------------------------------------------------------------------
    // Ticking
    // -----------------------------------------------------------------------

    /// Start polling for external changes. Receivers never tick.
    pub fn start_ticking(&self) {
        if self.role() == Role::Receiver {
            tracing::trace!(endpoint = %self.describe(), "receiver does not tick");
            return;
        }
        self.inner.ticker.borrow_mut().start();
    }

    pub fn stop_ticking(&self) {
        if let Ok(mut ticker) = self.inner.ticker.try_borrow_mut() {
            ticker.stop();
        }
    }

    #[must_use]
    pub fn is_ticking(&self) -> bool {
        self.inner.ticker.borrow().is_running()
    }

    #[must_use]
    pub fn ticker_settings(&self) -> TickerSettings {
        self.inner.ticker.borrow().settings()
    }

    /// Change the polling cadence. A running ticker restarts.
    pub fn set_ticker_settings(&self, settings: TickerSettings) {
        self.inner.ticker.borrow_mut().set_settings(settings);
    }

    /// Callbacks fired by this endpoint's ticker so far.
    #[must_use]
    pub fn tick_count(&self) -> u64 {
        self.inner.ticker.borrow().tick_count()
    }

    fn scheduler(&self) -> Scheduler {
        self.inner.ticker.borrow().scheduler().clone()
    }

    /// Poll once: on external change, fire observers and notify the group
    /// (unless this is a Receiver). Returns whether a change was seen.
    pub fn tick(&self) -> bool {
        let Some(value) = self.accessor().and_then(|mut a| a.detect_change()) else {
            return false;
        };
        self.notify_observers(&value);
        if self.role() != Role::Receiver {
            if let Some(group) = self.group() {
                if let Some(_scope) = WriteScope::enter(self) {
                    group.notify_change(self.guid());
                }
            }
        }
        true
    }

    // -----------------------------------------------------------------------
    // Diagnostics
    // -----------------------------------------------------------------------

    /// Host context for log messages, e.g. `player-hud (field health)`.
    #[must_use]
    pub fn describe(&self) -> String {
        let label = self.inner.label.borrow();
        let label = if label.is_empty() {
            format!("endpoint {}", self.inner.guid)
        } else {
            label.clone()
        };
        let member = match self.inner.accessor.try_borrow() {
            Ok(accessor) => format!("{} {}", accessor.kind(), accessor.variable_name()),
            Err(_) => String::from("busy"),
        };
        let dropped = match self.inner.host.borrow().as_ref() {
            Some(host) if host.strong_count() == 0 => ", host dropped",
            _ => "",
        };
        format!("{label} ({member}{dropped})")
    }

    /// Whether both handles point at the same endpoint.
    #[must_use]
    pub fn ptr_eq(&self, other: &Endpoint) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Endpoint")
            .field("guid", &self.inner.guid)
            .field("role", &self.role())
            .field("on_join", &self.on_join())
            .field("describe", &self.describe())
            .field("bound", &(self.inner.group.borrow().strong_count() > 0))
            .finish()
    }
}

/// Holds an endpoint's write guard for the duration of a write and the group
/// notification it triggers.
struct WriteScope<'a> {
    endpoint: &'a Endpoint,
}

impl<'a> WriteScope<'a> {
    fn enter(endpoint: &'a Endpoint) -> Option<Self> {
        let entered = endpoint
            .inner
            .accessor
            .try_borrow_mut()
            .is_ok_and(|mut accessor| accessor.begin_write());
        if !entered {
            tracing::trace!(endpoint = %endpoint.describe(), "write already in progress");
        }
        entered.then_some(Self { endpoint })
    }
}

impl Drop for WriteScope<'_> {
    fn drop(&mut self) {
        if let Ok(mut accessor) = self.endpoint.inner.accessor.try_borrow_mut() {
            accessor.end_write();
        }
    }
}
