#![forbid(unsafe_code)]

//! Named member access on a host object.
//!
//! A [`ValueAccessor`] points at one field or property of a host object by
//! name. Resolution goes through the [`TypeRegistry`], so members declared on
//! a registered parent type and static members are found as well.
//!
//! # Invariants
//!
//! 1. `is_initialized()` implies a member handle is cached and a baseline was
//!    captured.
//! 2. Reconfiguring the target, name or kind drops the handle and baseline.
//! 3. A successful write updates the baseline, so the next poll does not
//!    report the value that was just written.
//! 4. While a write is in progress through this accessor, further writes are
//!    refused.
//! 5. Once a value was pushed through [`ValueAccessor::set_value`] in a frame,
//!    further `set_value` calls in that frame are refused until the
//!    [`FrameClock`] advances.
//!
//! # Failure Modes
//!
//! | Condition | Behavior |
//! |-----------|----------|
//! | No target / kind / name | `initialize` returns an [`AccessError`] |
//! | Host type not registered | [`AccessError::UnregisteredType`] |
//! | Host already borrowed | [`AccessError::HostBorrowed`], nothing written |
//! | Wrong value type | [`AccessError::TypeMismatch`], nothing written |

use std::any::Any;
use std::fmt;
use std::rc::Rc;

use crate::clock::FrameClock;
use crate::error::AccessError;
use crate::observer::{ObserverList, Subscription};
use crate::reflect::{HostRef, MemberInfo, MemberKind, TypeRegistry};
use crate::value::{Value, ValueType};

/// Typed get/set and change polling for one named member.
#[derive(Default)]
pub struct ValueAccessor {
    target: Option<HostRef>,
    variable_name: String,
    kind: MemberKind,
    member: Option<MemberInfo>,
    initialized: bool,
    last_value: Option<Value>,
    writing: bool,
    pushed_frame: Option<u64>,
    on_value_changed: ObserverList<Value>,
}

impl fmt::Debug for ValueAccessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValueAccessor")
            .field("has_target", &self.target.is_some())
            .field("variable_name", &self.variable_name)
            .field("kind", &self.kind)
            .field("initialized", &self.initialized)
            .field("last_value", &self.last_value)
            .finish()
    }
}

impl ValueAccessor {
    /// An unconfigured accessor.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Accessor for the field `name` on `target`.
    #[must_use]
    pub fn field(target: HostRef, name: impl Into<String>) -> Self {
        let mut accessor = Self::new();
        accessor.set_target(target);
        accessor.set_field(name);
        accessor
    }

    /// Accessor for the property `name` on `target`.
    #[must_use]
    pub fn property(target: HostRef, name: impl Into<String>) -> Self {
        let mut accessor = Self::new();
        accessor.set_target(target);
        accessor.set_property(name);
        accessor
    }

    pub fn set_target(&mut self, target: HostRef) {
        self.target = Some(target);
        self.reset();
    }

    pub fn set_field(&mut self, name: impl Into<String>) {
        self.variable_name = name.into();
        self.kind = MemberKind::Field;
        self.reset();
    }

    pub fn set_property(&mut self, name: impl Into<String>) {
        self.variable_name = name.into();
        self.kind = MemberKind::Property;
        self.reset();
    }

    fn reset(&mut self) {
        self.member = None;
        self.initialized = false;
        self.last_value = None;
        self.pushed_frame = None;
    }

    #[must_use]
    pub fn target(&self) -> Option<&HostRef> {
        self.target.as_ref()
    }

    #[must_use]
    pub fn variable_name(&self) -> &str {
        &self.variable_name
    }

    #[must_use]
    pub fn kind(&self) -> MemberKind {
        self.kind
    }

    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Whether the accessor is configured and its member resolves.
    ///
    /// Initializes lazily, so this may capture a new baseline.
    pub fn is_valid(&mut self) -> bool {
        self.initialized || self.initialize().is_ok()
    }

    /// Declared type of the resolved member.
    #[must_use]
    pub fn value_type(&self) -> Option<ValueType> {
        self.member.as_ref().map(MemberInfo::value_type)
    }

    /// The resolved member, if initialized.
    #[must_use]
    pub fn member(&self) -> Option<&MemberInfo> {
        self.member.as_ref()
    }

    /// Resolve the member and capture the current value as baseline.
    ///
    /// # Errors
    ///
    /// Any [`AccessError`] describing why the member cannot be resolved.
    pub fn initialize(&mut self) -> Result<(), AccessError> {
        self.reset();
        let target = self.target.as_ref().ok_or(AccessError::NoTarget)?;
        if self.kind == MemberKind::None {
            return Err(AccessError::NoMemberKind);
        }
        if self.variable_name.is_empty() {
            return Err(AccessError::EmptyName);
        }
        let host = target.try_borrow().map_err(|_| AccessError::HostBorrowed)?;
        let host: &dyn Any = &*host;
        let member = TypeRegistry::find_member(host.type_id(), &self.variable_name, self.kind)?;
        let baseline = member.get(host);
        self.last_value = baseline;
        self.member = Some(member);
        self.initialized = true;
        Ok(())
    }

    /// Initialize if needed, logging the failure instead of returning it.
    pub fn ensure_initialized(&mut self) -> bool {
        if self.initialized {
            return true;
        }
        match self.initialize() {
            Ok(()) => true,
            Err(err) => {
                tracing::warn!(
                    member = %self.variable_name,
                    kind = %self.kind,
                    error = %err,
                    "value accessor could not be initialized"
                );
                false
            }
        }
    }

    /// Current member value, or `None` (logged) when the accessor is invalid.
    pub fn get_value(&mut self) -> Option<Value> {
        if !self.ensure_initialized() {
            return None;
        }
        match self.read() {
            Ok(value) => Some(value),
            Err(err) => {
                tracing::warn!(member = %self.variable_name, error = %err, "read failed");
                None
            }
        }
    }

    /// Read the member without touching the baseline.
    ///
    /// # Errors
    ///
    /// [`AccessError::NotInitialized`], [`AccessError::NoTarget`],
    /// [`AccessError::HostBorrowed`] or [`AccessError::HostMismatch`].
    pub fn read(&self) -> Result<Value, AccessError> {
        let member = self.member.as_ref().ok_or(AccessError::NotInitialized)?;
        let target = self.target.as_ref().ok_or(AccessError::NoTarget)?;
        let host = target.try_borrow().map_err(|_| AccessError::HostBorrowed)?;
        member.get(&*host).ok_or(AccessError::HostMismatch {
            type_name: member.declaring_type(),
        })
    }

    /// Write `value` unless it equals the current value.
    ///
    /// Does not consult the write guard and does not notify observers.
    /// Returns whether anything was written.
    ///
    /// # Errors
    ///
    /// Any [`AccessError`] from resolving the member, checking the value type
    /// or running the setter.
    pub fn store(&mut self, value: Value) -> Result<bool, AccessError> {
        if !self.initialized {
            self.initialize()?;
        }
        let current = self.read()?;
        if current == value {
            return Ok(false);
        }
        let member = self.member.as_ref().ok_or(AccessError::NotInitialized)?;
        let declared = member.value_type();
        if !declared.is_assignable_from(value.value_type()) {
            return Err(AccessError::TypeMismatch {
                member: self.variable_name.clone(),
                expected: declared,
                found: value.value_type(),
            });
        }
        let target = self.target.as_ref().ok_or(AccessError::NoTarget)?;
        {
            let mut host = target
                .try_borrow_mut()
                .map_err(|_| AccessError::HostBorrowed)?;
            member.set(&mut *host, value.clone())?;
        }
        self.last_value = Some(value);
        Ok(true)
    }

    /// Guarded write that notifies value-changed observers on success.
    ///
    /// Returns `false` without writing if the value is unchanged, the
    /// accessor is invalid, a write through this accessor is in progress, or
    /// a value was already pushed through it this frame.
    pub fn set_value(&mut self, value: Value) -> bool {
        if !self.ensure_initialized() {
            return false;
        }
        if self.pushed_this_frame() {
            tracing::trace!(member = %self.variable_name, "second write this frame ignored");
            return false;
        }
        if !self.begin_write() {
            return false;
        }
        let result = self.store(value);
        self.end_write();
        match result {
            Ok(true) => {
                self.mark_pushed();
                if let Some(value) = &self.last_value {
                    self.on_value_changed.notify(value);
                }
                true
            }
            Ok(false) => false,
            Err(err) => {
                tracing::warn!(member = %self.variable_name, error = %err, "write failed");
                false
            }
        }
    }

    /// Enter the write guard. `false` if a write is already in progress.
    pub fn begin_write(&mut self) -> bool {
        if self.writing {
            tracing::trace!(member = %self.variable_name, "re-entrant write ignored");
            return false;
        }
        self.writing = true;
        true
    }

    pub fn end_write(&mut self) {
        self.writing = false;
    }

    #[must_use]
    pub fn write_in_progress(&self) -> bool {
        self.writing
    }

    /// Record that a value was pushed through this accessor in the current
    /// frame.
    pub fn mark_pushed(&mut self) {
        self.pushed_frame = Some(FrameClock::frame());
    }

    /// Whether a value was already pushed through this accessor in the
    /// current frame.
    #[must_use]
    pub fn pushed_this_frame(&self) -> bool {
        self.pushed_frame == Some(FrameClock::frame())
    }

    /// Re-read the member and compare it to the baseline.
    ///
    /// On change the baseline is replaced and the new value returned.
    /// Observers are not notified.
    pub fn detect_change(&mut self) -> Option<Value> {
        if !self.ensure_initialized() {
            return None;
        }
        let current = self.read().ok()?;
        if self.last_value.as_ref() == Some(&current) {
            return None;
        }
        self.last_value = Some(current.clone());
        Some(current)
    }

    /// Poll for an external change and notify observers if one happened.
    pub fn has_value_changed(&mut self) -> bool {
        match self.detect_change() {
            Some(value) => {
                self.on_value_changed.notify(&value);
                true
            }
            None => false,
        }
    }

    /// Baseline captured at initialization or by the last write/poll.
    #[must_use]
    pub fn last_value(&self) -> Option<&Value> {
        self.last_value.as_ref()
    }

    /// Value-changed observer list (shared handle).
    #[must_use]
    pub fn observers(&self) -> &ObserverList<Value> {
        &self.on_value_changed
    }

    pub fn subscribe(&self, callback: impl Fn(&Value) + 'static) -> Subscription {
        self.on_value_changed.subscribe(callback)
    }

    /// Shared host handle (clone), for diagnostics.
    #[must_use]
    pub fn target_rc(&self) -> Option<HostRef> {
        self.target.as_ref().map(Rc::clone)
    }
}
