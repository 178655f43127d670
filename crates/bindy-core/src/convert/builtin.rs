//! Built-in converters.

use std::fmt;
use std::rc::Rc;

use super::{ValueConverter, ValueConverterFactory};
use crate::error::ConvertError;
use crate::value::{Value, ValueType};

type ConvertFn = Rc<dyn Fn(&Value) -> Result<Value, ConvertError>>;

/// Wraps a closure as a converter for one declared `(source, target)` pair.
///
/// Adapters for different pairs are distinct registry entries; a second
/// adapter for a pair that is already registered is ignored.
#[derive(Clone)]
pub struct ValueConverterAdapter {
    source: ValueType,
    target: ValueType,
    convert: ConvertFn,
}

impl ValueConverterAdapter {
    pub fn new(
        source: ValueType,
        target: ValueType,
        convert: impl Fn(&Value) -> Result<Value, ConvertError> + 'static,
    ) -> Self {
        Self {
            source,
            target,
            convert: Rc::new(convert),
        }
    }
}

impl fmt::Debug for ValueConverterAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValueConverterAdapter")
            .field("source", &self.source)
            .field("target", &self.target)
            .finish_non_exhaustive()
    }
}

impl ValueConverter for ValueConverterAdapter {
    fn can_convert(&self, source: ValueType, target: ValueType) -> bool {
        source == self.source && target == self.target
    }

    fn convert(&self, value: &Value, _target: ValueType) -> Result<Value, ConvertError> {
        (self.convert)(value)
    }

    fn discriminator(&self) -> Option<(ValueType, ValueType)> {
        Some((self.source, self.target))
    }
}

fn is_scalar(ty: ValueType) -> bool {
    ty == ValueType::Bool || ty.is_numeric()
}

/// Casts between `bool`, `i32`, `i64`, `f32` and `f64`.
///
/// Floats round to the nearest integer and saturate at the integer bounds.
/// Narrowing integer casts clamp. `bool` maps to `0`/`1` and back as `!= 0`.
#[derive(Debug, Clone, Copy, Default)]
pub struct NumericConverterFactory;

#[derive(Debug, Clone, Copy)]
struct NumericConverter;

fn integral(value: &Value) -> Option<i64> {
    match *value {
        Value::Bool(b) => Some(i64::from(b)),
        Value::Int(v) => Some(i64::from(v)),
        Value::Long(v) => Some(v),
        _ => None,
    }
}

impl ValueConverter for NumericConverter {
    fn can_convert(&self, source: ValueType, target: ValueType) -> bool {
        source != target && is_scalar(source) && is_scalar(target)
    }

    fn convert(&self, value: &Value, target: ValueType) -> Result<Value, ConvertError> {
        let unsupported = || ConvertError::Unsupported {
            from: value.value_type(),
            to: target,
        };
        let wide = value.as_f64().ok_or_else(unsupported)?;
        let exact = integral(value);
        Ok(match target {
            ValueType::Bool => Value::Bool(wide != 0.0),
            ValueType::Int => Value::Int(match exact {
                Some(v) => v.clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32,
                None => wide.round() as i32,
            }),
            ValueType::Long => Value::Long(exact.unwrap_or_else(|| wide.round() as i64)),
            ValueType::Float => Value::Float(wide as f32),
            ValueType::Double => Value::Double(match *value {
                Value::Long(v) => v as f64,
                _ => wide,
            }),
            _ => return Err(unsupported()),
        })
    }
}

impl ValueConverterFactory for NumericConverterFactory {
    fn can_create(&self, source: ValueType, target: ValueType) -> bool {
        NumericConverter.can_convert(source, target)
    }

    fn create(&self, _source: ValueType, _target: ValueType) -> Rc<dyn ValueConverter> {
        Rc::new(NumericConverter)
    }
}

/// Any non-string value to its display string.
#[derive(Debug, Clone, Copy, Default)]
pub struct ToStringConverterFactory;

#[derive(Debug, Clone, Copy)]
struct ToStringConverter;

impl ValueConverter for ToStringConverter {
    fn can_convert(&self, source: ValueType, target: ValueType) -> bool {
        target == ValueType::String && !matches!(source, ValueType::String | ValueType::Unit)
    }

    fn convert(&self, value: &Value, _target: ValueType) -> Result<Value, ConvertError> {
        Ok(Value::String(value.to_string()))
    }
}

impl ValueConverterFactory for ToStringConverterFactory {
    fn can_create(&self, source: ValueType, target: ValueType) -> bool {
        ToStringConverter.can_convert(source, target)
    }

    fn create(&self, _source: ValueType, _target: ValueType) -> Rc<dyn ValueConverter> {
        Rc::new(ToStringConverter)
    }
}

/// Parses strings into `bool` or a number. Surrounding whitespace is ignored.
///
/// `bool` accepts `true`/`false` in any case and `1`/`0`.
#[derive(Debug, Clone, Copy, Default)]
pub struct StringParseConverterFactory;

#[derive(Debug, Clone, Copy)]
struct StringParseConverter;

impl ValueConverter for StringParseConverter {
    fn can_convert(&self, source: ValueType, target: ValueType) -> bool {
        source == ValueType::String && is_scalar(target)
    }

    fn convert(&self, value: &Value, target: ValueType) -> Result<Value, ConvertError> {
        let Some(input) = value.as_str() else {
            return Err(ConvertError::Unsupported {
                from: value.value_type(),
                to: target,
            });
        };
        let text = input.trim();
        let parse_error = || ConvertError::Parse {
            input: input.to_owned(),
            to: target,
        };
        match target {
            ValueType::Bool => {
                if text.eq_ignore_ascii_case("true") || text == "1" {
                    Ok(Value::Bool(true))
                } else if text.eq_ignore_ascii_case("false") || text == "0" {
                    Ok(Value::Bool(false))
                } else {
                    Err(parse_error())
                }
            }
            ValueType::Int => text.parse().map(Value::Int).map_err(|_| parse_error()),
            ValueType::Long => text.parse().map(Value::Long).map_err(|_| parse_error()),
            ValueType::Float => text.parse().map(Value::Float).map_err(|_| parse_error()),
            ValueType::Double => text.parse().map(Value::Double).map_err(|_| parse_error()),
            _ => Err(ConvertError::Unsupported {
                from: ValueType::String,
                to: target,
            }),
        }
    }
}

impl ValueConverterFactory for StringParseConverterFactory {
    fn can_create(&self, source: ValueType, target: ValueType) -> bool {
        StringParseConverter.can_convert(source, target)
    }

    fn create(&self, _source: ValueType, _target: ValueType) -> Rc<dyn ValueConverter> {
        Rc::new(StringParseConverter)
    }
}

/// `Vector2 ↔ Vector3`. Widening sets `z = 0`, narrowing drops `z`.
#[derive(Debug, Clone, Copy, Default)]
pub struct VectorConverter;

impl ValueConverter for VectorConverter {
    fn can_convert(&self, source: ValueType, target: ValueType) -> bool {
        matches!(
            (source, target),
            (ValueType::Vector2, ValueType::Vector3) | (ValueType::Vector3, ValueType::Vector2)
        )
    }

    fn convert(&self, value: &Value, target: ValueType) -> Result<Value, ConvertError> {
        match (value, target) {
            (Value::Vector2([x, y]), ValueType::Vector3) => Ok(Value::Vector3([*x, *y, 0.0])),
            (Value::Vector3([x, y, _]), ValueType::Vector2) => Ok(Value::Vector2([*x, *y])),
            _ => Err(ConvertError::Unsupported {
                from: value.value_type(),
                to: target,
            }),
        }
    }
}
