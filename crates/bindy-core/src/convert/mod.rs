#![forbid(unsafe_code)]

//! Value converters and the converter registry.
//!
//! A converter turns a [`Value`] of one [`ValueType`] into another. The
//! registry holds direct converters and factories; lookup tries converters
//! first, then factories, and the first match wins.
//!
//! # Invariants
//!
//! 1. At most one converter per identity. The identity is the concrete Rust
//!    type plus, for parametric adapters, the declared `(source, target)`
//!    pair. Re-adding an identity is a no-op.
//! 2. Factories are appended unconditionally.
//! 3. There is no removal API; registration order is lookup order.
//!
//! # Global registry
//!
//! Each thread has a registry reached through [`ConverterRegistry::with_global`].
//! It starts out with the built-in converters and can be restored with
//! [`ConverterRegistry::reset_global`].

mod builtin;

pub use builtin::{
    NumericConverterFactory, StringParseConverterFactory, ToStringConverterFactory,
    ValueConverterAdapter, VectorConverter,
};

use std::any::{Any, TypeId};
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::error::ConvertError;
use crate::value::{Value, ValueType};

/// Converts values between two type tags.
pub trait ValueConverter: Any {
    /// Whether this converter handles `source → target`.
    fn can_convert(&self, source: ValueType, target: ValueType) -> bool;

    /// Convert `value` to `target`.
    ///
    /// # Errors
    ///
    /// [`ConvertError`] when the value cannot be represented as `target`.
    fn convert(&self, value: &Value, target: ValueType) -> Result<Value, ConvertError>;

    /// Extra identity for parametric converters.
    fn discriminator(&self) -> Option<(ValueType, ValueType)> {
        None
    }
}

/// Creates converters on demand for the pairs it supports.
pub trait ValueConverterFactory: Any {
    fn can_create(&self, source: ValueType, target: ValueType) -> bool;

    fn create(&self, source: ValueType, target: ValueType) -> Rc<dyn ValueConverter>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct ConverterIdentity {
    type_id: TypeId,
    pair: Option<(ValueType, ValueType)>,
}

impl ConverterIdentity {
    fn of<C: ValueConverter>(converter: &C) -> Self {
        Self {
            type_id: TypeId::of::<C>(),
            pair: converter.discriminator(),
        }
    }
}

/// Ordered set of converters and factories.
#[derive(Default)]
pub struct ConverterRegistry {
    converters: Vec<(ConverterIdentity, Rc<dyn ValueConverter>)>,
    factories: Vec<Rc<dyn ValueConverterFactory>>,
}

impl fmt::Debug for ConverterRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConverterRegistry")
            .field("converters", &self.converters.len())
            .field("factories", &self.factories.len())
            .finish()
    }
}

impl ConverterRegistry {
    /// An empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding the built-in converters.
    #[must_use]
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register_defaults();
        registry
    }

    /// Add the built-in converters and factories.
    pub fn register_defaults(&mut self) {
        self.add_converter(VectorConverter);
        self.add_factory(NumericConverterFactory);
        self.add_factory(StringParseConverterFactory);
        self.add_factory(ToStringConverterFactory);
    }

    /// Append `converter` unless its identity is already present.
    ///
    /// Returns whether it was added.
    pub fn add_converter<C: ValueConverter>(&mut self, converter: C) -> bool {
        let identity = ConverterIdentity::of(&converter);
        if self.converters.iter().any(|(id, _)| *id == identity) {
            tracing::debug!(
                converter = std::any::type_name::<C>(),
                "converter already registered"
            );
            return false;
        }
        self.converters.push((identity, Rc::new(converter)));
        true
    }

    /// Append `factory`.
    pub fn add_factory<F: ValueConverterFactory>(&mut self, factory: F) {
        self.factories.push(Rc::new(factory));
    }

    /// Whether a converter of concrete type `C` was added.
    #[must_use]
    pub fn contains_converter<C: ValueConverter>(&self) -> bool {
        let type_id = TypeId::of::<C>();
        self.converters.iter().any(|(id, _)| id.type_id == type_id)
    }

    /// First converter handling `source → target`: direct ones, then
    /// factories.
    #[must_use]
    pub fn get_converter(
        &self,
        source: ValueType,
        target: ValueType,
    ) -> Option<Rc<dyn ValueConverter>> {
        if let Some((_, converter)) = self
            .converters
            .iter()
            .find(|(_, c)| c.can_convert(source, target))
        {
            return Some(Rc::clone(converter));
        }
        self.factories
            .iter()
            .find(|f| f.can_create(source, target))
            .map(|f| f.create(source, target))
    }

    /// [`get_converter`](Self::get_converter) with a typed miss.
    ///
    /// # Errors
    ///
    /// [`ConvertError::Unsupported`] when nothing handles the pair.
    pub fn try_get_converter(
        &self,
        source: ValueType,
        target: ValueType,
    ) -> Result<Rc<dyn ValueConverter>, ConvertError> {
        self.get_converter(source, target)
            .ok_or(ConvertError::Unsupported {
                from: source,
                to: target,
            })
    }

    /// Find a converter for the value's type and run it.
    ///
    /// # Errors
    ///
    /// [`ConvertError`] from lookup or conversion.
    pub fn convert(&self, value: &Value, target: ValueType) -> Result<Value, ConvertError> {
        self.try_get_converter(value.value_type(), target)?
            .convert(value, target)
    }

    #[must_use]
    pub fn converter_count(&self) -> usize {
        self.converters.len()
    }

    #[must_use]
    pub fn factory_count(&self) -> usize {
        self.factories.len()
    }

    pub fn clear(&mut self) {
        self.converters.clear();
        self.factories.clear();
    }

    /// Run `f` with this thread's global registry.
    pub fn with_global<R>(f: impl FnOnce(&mut ConverterRegistry) -> R) -> R {
        GLOBAL.with(|global| f(&mut global.borrow_mut()))
    }

    /// Replace the global registry with an empty one or the defaults.
    pub fn reset_global(with_defaults: bool) {
        let fresh = if with_defaults {
            Self::with_defaults()
        } else {
            Self::new()
        };
        GLOBAL.with(|global| *global.borrow_mut() = fresh);
    }
}

thread_local! {
    static GLOBAL: RefCell<ConverterRegistry> = RefCell::new(ConverterRegistry::with_defaults());
}
