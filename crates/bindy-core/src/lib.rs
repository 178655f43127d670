#![forbid(unsafe_code)]

//! Core building blocks for Bindy data bindings.
//!
//! - [`Value`] / [`ValueType`]: the tagged value channel every binding uses.
//! - [`TypeBuilder`] / [`TypeRegistry`]: member reflection tables for host
//!   objects, with parent-type inheritance and a flattened member cache.
//! - [`ValueAccessor`]: typed get/set and change polling for one named member.
//! - [`ConverterRegistry`]: ordered converters and factories, plus a
//!   per-thread global registry with the built-ins.
//! - [`ValueTransformer`]: optional pre-processing applied before a value
//!   reaches a target.
//! - [`ObserverList`] / [`Subscription`]: weakly held callbacks with RAII
//!   unsubscription.
//! - [`FrameClock`]: the per-thread frame counter the write guard is keyed on.
//!
//! # Architecture
//!
//! Everything here is single-threaded. Host objects are
//! `Rc<RefCell<dyn Any>>`, callbacks are `Rc<dyn Fn>`, and process-wide tables
//! (type registry, member cache, converter registry, frame clock) are
//! thread-local, so each thread owns an independent binding world.

pub mod accessor;
pub mod clock;
pub mod convert;
pub mod error;
pub mod id;
pub mod observer;
pub mod reflect;
pub mod transform;
pub mod value;

pub use accessor::ValueAccessor;
pub use clock::{FrameClock, FrameTime};
pub use convert::{
    ConverterRegistry, NumericConverterFactory, StringParseConverterFactory,
    ToStringConverterFactory, ValueConverter, ValueConverterAdapter, ValueConverterFactory,
    VectorConverter,
};
pub use error::{AccessError, ConvertError};
pub use id::{BindId, DEFAULT_CATEGORY, DEFAULT_NAME, Guid};
pub use observer::{ObserverList, Subscription};
pub use reflect::{
    HostRef, MemberInfo, MemberKind, TypeBuilder, TypeDescriptor, TypeRegistry, WeakHostRef, host,
};
pub use transform::{
    Clamp, FnTransformer, FormatString, InvertBool, LogValue, ScaleOffset, TransformerInfo,
    ValueTransformer,
};
pub use value::{BindValue, ObjectType, ObjectValue, Value, ValueType};
