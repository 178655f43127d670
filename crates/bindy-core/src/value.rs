#![forbid(unsafe_code)]

//! Tagged value channel shared by accessors, converters and transformers.
//!
//! Every value that crosses an endpoint boundary is a [`Value`]: a small
//! tagged union carrying both the payload and its [`ValueType`]. Conversion
//! dispatch is therefore a pure function of two type tags.
//!
//! # Invariants
//!
//! 1. `value.value_type()` is always a concrete tag (never [`ValueType::Any`]).
//! 2. Float equality treats `NaN == NaN`, so polling a member that holds `NaN`
//!    does not report a change on every tick.
//! 3. Object payloads compare by identity (`Rc::ptr_eq`).

use std::any::{Any, TypeId};
use std::fmt;
use std::rc::Rc;

/// Type tag for host-defined object payloads.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ObjectType {
    id: TypeId,
    name: &'static str,
}

impl ObjectType {
    /// Tag for the Rust type `T`.
    #[must_use]
    pub fn of<T: Any>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }

    /// The `TypeId` of the tagged type.
    #[inline]
    #[must_use]
    pub const fn id(self) -> TypeId {
        self.id
    }

    /// Full Rust type name, for diagnostics.
    #[inline]
    #[must_use]
    pub const fn name(self) -> &'static str {
        self.name
    }
}

/// Declared or runtime type of a [`Value`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ValueType {
    /// The "void" sentinel. Transformers returning it assign nothing.
    Unit,
    Bool,
    Int,
    Long,
    Float,
    Double,
    String,
    Vector2,
    Vector3,
    /// A shared host-defined object.
    Object(ObjectType),
    /// Top type: members declared as [`Value`] accept anything but `Unit`.
    Any,
}

impl ValueType {
    /// Whether this is one of the numeric tags.
    #[must_use]
    pub const fn is_numeric(self) -> bool {
        matches!(self, Self::Int | Self::Long | Self::Float | Self::Double)
    }

    /// Whether a slot of this type can hold a value of `source` type without
    /// conversion.
    #[must_use]
    pub fn is_assignable_from(self, source: ValueType) -> bool {
        self == source || (self == Self::Any && source != Self::Unit)
    }

    /// Short human-readable name.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Unit => "unit",
            Self::Bool => "bool",
            Self::Int => "int",
            Self::Long => "long",
            Self::Float => "float",
            Self::Double => "double",
            Self::String => "string",
            Self::Vector2 => "vector2",
            Self::Vector3 => "vector3",
            Self::Object(ty) => ty.name(),
            Self::Any => "any",
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Shared, type-tagged object payload.
#[derive(Clone)]
pub struct ObjectValue {
    ty: ObjectType,
    data: Rc<dyn Any>,
}

impl ObjectValue {
    /// Wrap an owned value.
    #[must_use]
    pub fn new<T: Any>(value: T) -> Self {
        Self::from_rc(Rc::new(value))
    }

    /// Wrap an already shared value. Identity is preserved.
    #[must_use]
    pub fn from_rc<T: Any>(data: Rc<T>) -> Self {
        Self {
            ty: ObjectType::of::<T>(),
            data,
        }
    }

    /// Type tag of the payload.
    #[must_use]
    pub fn object_type(&self) -> ObjectType {
        self.ty
    }

    /// Recover the shared payload as `Rc<T>`.
    #[must_use]
    pub fn downcast<T: Any>(&self) -> Option<Rc<T>> {
        Rc::clone(&self.data).downcast::<T>().ok()
    }
}

impl PartialEq for ObjectValue {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.data, &other.data)
    }
}

impl fmt::Debug for ObjectValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectValue")
            .field("type", &self.ty.name())
            .finish_non_exhaustive()
    }
}

/// A bound value with its runtime type tag.
#[derive(Clone, Debug, Default)]
pub enum Value {
    #[default]
    Unit,
    Bool(bool),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    String(String),
    Vector2([f32; 2]),
    Vector3([f32; 3]),
    Object(ObjectValue),
}

impl Value {
    /// Runtime type tag of this value.
    #[must_use]
    pub fn value_type(&self) -> ValueType {
        match self {
            Self::Unit => ValueType::Unit,
            Self::Bool(_) => ValueType::Bool,
            Self::Int(_) => ValueType::Int,
            Self::Long(_) => ValueType::Long,
            Self::Float(_) => ValueType::Float,
            Self::Double(_) => ValueType::Double,
            Self::String(_) => ValueType::String,
            Self::Vector2(_) => ValueType::Vector2,
            Self::Vector3(_) => ValueType::Vector3,
            Self::Object(obj) => ValueType::Object(obj.object_type()),
        }
    }

    /// Whether this is the unit sentinel.
    #[must_use]
    pub const fn is_unit(&self) -> bool {
        matches!(self, Self::Unit)
    }

    /// Wrap a host object as an [`Value::Object`].
    #[must_use]
    pub fn object<T: Any>(value: T) -> Self {
        Self::Object(ObjectValue::new(value))
    }

    /// Numeric payload widened to `f64` (bools map to 0/1).
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            Self::Bool(b) => Some(if b { 1.0 } else { 0.0 }),
            Self::Int(v) => Some(f64::from(v)),
            Self::Long(v) => Some(v as f64),
            Self::Float(v) => Some(f64::from(v)),
            Self::Double(v) => Some(v),
            _ => None,
        }
    }

    /// String payload, if any.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }
}

fn float_eq32(a: f32, b: f32) -> bool {
    a == b || (a.is_nan() && b.is_nan())
}

fn float_eq64(a: f64, b: f64) -> bool {
    a == b || (a.is_nan() && b.is_nan())
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Unit, Self::Unit) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Long(a), Self::Long(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => float_eq32(*a, *b),
            (Self::Double(a), Self::Double(b)) => float_eq64(*a, *b),
            (Self::String(a), Self::String(b)) => a == b,
            (Self::Vector2(a), Self::Vector2(b)) => {
                a.iter().zip(b).all(|(x, y)| float_eq32(*x, *y))
            }
            (Self::Vector3(a), Self::Vector3(b)) => {
                a.iter().zip(b).all(|(x, y)| float_eq32(*x, *y))
            }
            (Self::Object(a), Self::Object(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unit => f.write_str("()"),
            Self::Bool(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Long(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Double(v) => write!(f, "{v}"),
            Self::String(v) => f.write_str(v),
            Self::Vector2([x, y]) => write!(f, "({x}, {y})"),
            Self::Vector3([x, y, z]) => write!(f, "({x}, {y}, {z})"),
            Self::Object(obj) => write!(f, "<{}>", obj.object_type().name()),
        }
    }
}

/// Rust types that can travel through the binding value channel.
///
/// `from_value` never converts: it only unwraps a value whose tag already
/// matches `value_type()`. Conversion is the converter registry's job.
pub trait BindValue: Sized + 'static {
    /// Declared type tag for members of this Rust type.
    fn value_type() -> ValueType;

    /// Wrap into a [`Value`].
    fn into_value(self) -> Value;

    /// Unwrap a [`Value`] of the matching tag.
    fn from_value(value: Value) -> Option<Self>;
}

macro_rules! bind_value_impl {
    ($ty:ty, $variant:ident) => {
        impl BindValue for $ty {
            fn value_type() -> ValueType {
                ValueType::$variant
            }

            fn into_value(self) -> Value {
                Value::$variant(self)
            }

            fn from_value(value: Value) -> Option<Self> {
                match value {
                    Value::$variant(v) => Some(v),
                    _ => None,
                }
            }
        }

        impl From<$ty> for Value {
            fn from(v: $ty) -> Self {
                Value::$variant(v)
            }
        }
    };
}

bind_value_impl!(bool, Bool);
bind_value_impl!(i32, Int);
bind_value_impl!(i64, Long);
bind_value_impl!(f32, Float);
bind_value_impl!(f64, Double);
bind_value_impl!(String, String);
bind_value_impl!([f32; 2], Vector2);
bind_value_impl!([f32; 3], Vector3);

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_owned())
    }
}

impl From<()> for Value {
    fn from((): ()) -> Self {
        Value::Unit
    }
}

impl BindValue for Value {
    fn value_type() -> ValueType {
        ValueType::Any
    }

    fn into_value(self) -> Value {
        self
    }

    fn from_value(value: Value) -> Option<Self> {
        Some(value)
    }
}

impl<T: Any> BindValue for Rc<T> {
    fn value_type() -> ValueType {
        ValueType::Object(ObjectType::of::<T>())
    }

    fn into_value(self) -> Value {
        Value::Object(ObjectValue::from_rc(self))
    }

    fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(obj) => obj.downcast::<T>(),
            _ => None,
        }
    }
}
