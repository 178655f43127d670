#![forbid(unsafe_code)]

//! Value transformers.
//!
//! A transformer rewrites a value on its way into a target endpoint. It runs
//! only when it is enabled and accepts the source type. Returning
//! [`Value::Unit`] tells the pipeline to assign nothing.
//!
//! # Invariants
//!
//! 1. `applies_to(ty)` is exactly `is_enabled() && can_transform_from(ty)`.
//! 2. An empty `from` set accepts every source type; the same holds for `to`.

use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

use crate::value::{Value, ValueType};

/// Shared metadata every transformer carries.
#[derive(Debug)]
pub struct TransformerInfo {
    enabled: Cell<bool>,
    description: String,
    from: Vec<ValueType>,
    to: Vec<ValueType>,
}

impl TransformerInfo {
    /// Enabled metadata accepting `from` and producing `to`.
    #[must_use]
    pub fn new(description: impl Into<String>, from: Vec<ValueType>, to: Vec<ValueType>) -> Self {
        Self {
            enabled: Cell::new(true),
            description: description.into(),
            from,
            to,
        }
    }
}

/// Pre-processing step applied before a value reaches a target.
pub trait ValueTransformer {
    fn info(&self) -> &TransformerInfo;

    /// Produce the value to assign. `target` is the target's current value.
    fn transform(&self, source: &Value, target: &Value) -> Value;

    fn is_enabled(&self) -> bool {
        self.info().enabled.get()
    }

    fn set_enabled(&self, enabled: bool) {
        self.info().enabled.set(enabled);
    }

    fn description(&self) -> &str {
        &self.info().description
    }

    fn from_types(&self) -> &[ValueType] {
        &self.info().from
    }

    fn to_types(&self) -> &[ValueType] {
        &self.info().to
    }

    fn can_transform_from(&self, ty: ValueType) -> bool {
        accepts(self.from_types(), ty)
    }

    fn can_transform_to(&self, ty: ValueType) -> bool {
        accepts(self.to_types(), ty)
    }

    /// Whether the pipeline should run this transformer for `source`.
    fn applies_to(&self, source: ValueType) -> bool {
        self.is_enabled() && self.can_transform_from(source)
    }
}

fn accepts(set: &[ValueType], ty: ValueType) -> bool {
    set.is_empty() || set.iter().any(|t| *t == ty || t.is_assignable_from(ty))
}

const NUMERIC: [ValueType; 4] = [
    ValueType::Int,
    ValueType::Long,
    ValueType::Float,
    ValueType::Double,
];

/// Closure-backed transformer.
pub struct FnTransformer {
    info: TransformerInfo,
    f: Rc<dyn Fn(&Value, &Value) -> Value>,
}

impl FnTransformer {
    pub fn new(
        description: impl Into<String>,
        from: Vec<ValueType>,
        to: Vec<ValueType>,
        f: impl Fn(&Value, &Value) -> Value + 'static,
    ) -> Self {
        Self {
            info: TransformerInfo::new(description, from, to),
            f: Rc::new(f),
        }
    }
}

impl fmt::Debug for FnTransformer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnTransformer")
            .field("info", &self.info)
            .finish_non_exhaustive()
    }
}

impl ValueTransformer for FnTransformer {
    fn info(&self) -> &TransformerInfo {
        &self.info
    }

    fn transform(&self, source: &Value, target: &Value) -> Value {
        (self.f)(source, target)
    }
}

/// Negates a `bool`.
#[derive(Debug)]
pub struct InvertBool {
    info: TransformerInfo,
}

impl Default for InvertBool {
    fn default() -> Self {
        Self {
            info: TransformerInfo::new(
                "Invert a boolean",
                vec![ValueType::Bool],
                vec![ValueType::Bool],
            ),
        }
    }
}

impl ValueTransformer for InvertBool {
    fn info(&self) -> &TransformerInfo {
        &self.info
    }

    fn transform(&self, source: &Value, _target: &Value) -> Value {
        match source {
            Value::Bool(b) => Value::Bool(!b),
            _ => Value::Unit,
        }
    }
}

/// `source * scale + offset`, keeping the source's numeric type.
#[derive(Debug)]
pub struct ScaleOffset {
    info: TransformerInfo,
    scale: f64,
    offset: f64,
}

impl ScaleOffset {
    #[must_use]
    pub fn new(scale: f64, offset: f64) -> Self {
        Self {
            info: TransformerInfo::new("Scale and offset", NUMERIC.to_vec(), NUMERIC.to_vec()),
            scale,
            offset,
        }
    }
}

impl ValueTransformer for ScaleOffset {
    fn info(&self) -> &TransformerInfo {
        &self.info
    }

    fn transform(&self, source: &Value, _target: &Value) -> Value {
        let apply = |v: f64| v * self.scale + self.offset;
        match *source {
            Value::Int(v) => Value::Int(apply(f64::from(v)).round() as i32),
            Value::Long(v) => Value::Long(apply(v as f64).round() as i64),
            Value::Float(v) => Value::Float(apply(f64::from(v)) as f32),
            Value::Double(v) => Value::Double(apply(v)),
            _ => Value::Unit,
        }
    }
}

/// Clamps a number into `[min, max]`, keeping its numeric type.
#[derive(Debug)]
pub struct Clamp {
    info: TransformerInfo,
    min: f64,
    max: f64,
}

impl Clamp {
    /// `min` and `max` are swapped if given in the wrong order.
    #[must_use]
    pub fn new(min: f64, max: f64) -> Self {
        let (min, max) = if min <= max { (min, max) } else { (max, min) };
        Self {
            info: TransformerInfo::new("Clamp to range", NUMERIC.to_vec(), NUMERIC.to_vec()),
            min,
            max,
        }
    }
}

impl ValueTransformer for Clamp {
    fn info(&self) -> &TransformerInfo {
        &self.info
    }

    fn transform(&self, source: &Value, _target: &Value) -> Value {
        let clamp = |v: f64| v.clamp(self.min, self.max);
        match *source {
            Value::Int(v) => Value::Int(clamp(f64::from(v)).round() as i32),
            Value::Long(v) => Value::Long(clamp(v as f64).round() as i64),
            Value::Float(v) => Value::Float(clamp(f64::from(v)) as f32),
            Value::Double(v) => Value::Double(clamp(v)),
            _ => Value::Unit,
        }
    }
}

/// Renders a template, replacing every `{value}` with the source.
#[derive(Debug)]
pub struct FormatString {
    info: TransformerInfo,
    template: String,
}

impl FormatString {
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            info: TransformerInfo::new("Format as string", Vec::new(), vec![ValueType::String]),
            template: template.into(),
        }
    }
}

impl ValueTransformer for FormatString {
    fn info(&self) -> &TransformerInfo {
        &self.info
    }

    fn transform(&self, source: &Value, _target: &Value) -> Value {
        if source.is_unit() {
            return Value::Unit;
        }
        Value::String(self.template.replace("{value}", &source.to_string()))
    }
}

/// Logs the value and assigns nothing.
#[derive(Debug)]
pub struct LogValue {
    info: TransformerInfo,
    label: String,
}

impl LogValue {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            info: TransformerInfo::new("Log value", Vec::new(), Vec::new()),
            label: label.into(),
        }
    }
}

impl ValueTransformer for LogValue {
    fn info(&self) -> &TransformerInfo {
        &self.info
    }

    fn transform(&self, source: &Value, target: &Value) -> Value {
        tracing::info!(
            label = %self.label,
            value = %source,
            value_type = %source.value_type(),
            target = %target,
            "bound value"
        );
        Value::Unit
    }
}
