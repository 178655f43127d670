//! Error types for member access and value conversion.
//!
//! Both error families describe *configuration gaps*: callers log them and
//! skip the affected endpoint rather than aborting propagation for a group.

use std::any::TypeId;

use thiserror::Error;

use crate::reflect::MemberKind;
use crate::value::ValueType;

/// Errors from resolving or using a [`ValueAccessor`](crate::accessor::ValueAccessor).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AccessError {
    /// No host object was set.
    #[error("accessor has no target")]
    NoTarget,
    /// Member kind is [`MemberKind::None`].
    #[error("accessor has no member kind")]
    NoMemberKind,
    /// The variable name is empty.
    #[error("accessor has no variable name")]
    EmptyName,
    /// The host's runtime type has no reflection table.
    #[error("type {type_id:?} is not registered for reflection")]
    UnregisteredType { type_id: TypeId },
    /// No member of that name and kind on the host type (or its parents).
    #[error("no {kind} named `{member}` on `{type_name}`")]
    MemberNotFound {
        type_name: &'static str,
        member: String,
        kind: MemberKind,
    },
    /// `get`/`set` called before a successful `initialize`.
    #[error("accessor is not initialized")]
    NotInitialized,
    /// The host object is borrowed elsewhere.
    #[error("host object is already borrowed")]
    HostBorrowed,
    /// The host is not an instance of the member's declaring type.
    #[error("host object does not match declaring type `{type_name}`")]
    HostMismatch { type_name: &'static str },
    /// The member has no setter.
    #[error("member `{member}` is read-only")]
    ReadOnly { member: String },
    /// The value's type is not assignable to the member's declared type.
    #[error("member `{member}` expects {expected}, got {found}")]
    TypeMismatch {
        member: String,
        expected: ValueType,
        found: ValueType,
    },
}

/// Errors from [`ValueConverter::convert`](crate::convert::ValueConverter::convert).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConvertError {
    /// No converter handles this pair.
    #[error("cannot convert {from} to {to}")]
    Unsupported { from: ValueType, to: ValueType },
    /// A string could not be parsed as the target type.
    #[error("cannot parse `{input}` as {to}")]
    Parse { input: String, to: ValueType },
}
