#![forbid(unsafe_code)]

//! Value propagation from one endpoint into another.
//!
//! [`process_value`] decides how the source's value reaches a target:
//!
//! 1. If the target has an enabled transformer that accepts the source type,
//!    the transformer runs first. A [`Value::Unit`] result assigns nothing.
//!    A result of the target's type is assigned; otherwise a converter is
//!    looked up for `result -> target`. When none exists but the target is
//!    declared as [`ValueType::Any`], the result is assigned as-is (the
//!    covariant fallback) unless `strict_assignability` is configured.
//! 2. Without a transformer, a type mismatch is routed through a converter.
//!    A missing converter skips the target; there is no fallback here.
//! 3. Matching types are assigned directly. Types match when the value's
//!    type or the source's declared type equals the target's declared type,
//!    so two members declared as [`ValueType::Any`] bind directly.
//!
//! Every assignment uses [`Endpoint::set_value_without_notify`], so
//! propagation never re-enters the group.
//!
//! # Failure Modes
//!
//! | Condition | Outcome |
//! |-----------|---------|
//! | Source cannot be read | `Skipped(InvalidSource)` |
//! | Target cannot resolve | `Skipped(InvalidTarget)` |
//! | No converter (direct, or transformed and not assignable) | `Skipped(MissingConverter)`, warn naming both sides |
//! | Converter fails | `Skipped(ConversionFailed)`, warn |

use std::fmt;
use std::rc::Rc;

use bindy_core::{ConvertError, ConverterRegistry, Value, ValueConverter, ValueType};

use crate::config::BindyConfig;
use crate::endpoint::Endpoint;
use crate::group::BindGroup;

/// Path a value took into its target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Direct,
    Converted,
    Transformed,
    TransformedConverted,
    /// A transformer's result assigned into an `Any` target without
    /// conversion.
    Covariant,
}

/// Why a target was not updated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    InvalidSource,
    InvalidTarget,
    MissingConverter { from: ValueType, to: ValueType },
    ConversionFailed(ConvertError),
    StrictAssignability { from: ValueType, to: ValueType },
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidSource => f.write_str("source cannot be read"),
            Self::InvalidTarget => f.write_str("target cannot be resolved"),
            Self::MissingConverter { from, to } => write!(f, "no converter from {from} to {to}"),
            Self::ConversionFailed(err) => write!(f, "conversion failed: {err}"),
            Self::StrictAssignability { from, to } => {
                write!(f, "{from} is only assignable to {to} without conversion")
            }
        }
    }
}

/// Outcome of delivering one value to one target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Propagation {
    /// The target's member changed.
    Assigned(Route),
    /// The target already held the value, or a write to it was in progress.
    Unchanged(Route),
    /// The transformer returned [`Value::Unit`].
    Discarded,
    Skipped(SkipReason),
}

impl Propagation {
    #[must_use]
    pub fn is_assigned(&self) -> bool {
        matches!(self, Self::Assigned(_))
    }

    #[must_use]
    pub fn route(&self) -> Option<Route> {
        match self {
            Self::Assigned(route) | Self::Unchanged(route) => Some(*route),
            _ => None,
        }
    }
}

/// Push `source`'s current value into `target`.
pub fn process_value(group: &BindGroup, source: &Endpoint, target: &Endpoint) -> Propagation {
    let Some(value) = source.value() else {
        return skip(
            &source.describe(),
            target,
            SkipReason::InvalidSource,
            Some(group),
        );
    };
    let Some(source_type) = source.value_type() else {
        return skip(
            &source.describe(),
            target,
            SkipReason::InvalidSource,
            Some(group),
        );
    };
    let declared_type = source.declared_type().unwrap_or(source_type);
    deliver_typed(value, source_type, declared_type, &source.describe(), target)
}

/// Push `value` of `source_type` into `target`. `source` names the origin
/// in diagnostics.
pub fn deliver(value: Value, source_type: ValueType, source: &str, target: &Endpoint) -> Propagation {
    deliver_typed(value, source_type, source_type, source, target)
}

/// [`deliver`] for a value read from a member declared as `declared_type`.
pub(crate) fn deliver_typed(
    value: Value,
    source_type: ValueType,
    declared_type: ValueType,
    source: &str,
    target: &Endpoint,
) -> Propagation {
    let Some(target_type) = target.declared_type() else {
        return skip(source, target, SkipReason::InvalidTarget, None);
    };

    if let Some(transformer) = target
        .transformer()
        .filter(|t| t.applies_to(source_type))
    {
        let current = target.value().unwrap_or_default();
        let result = transformer.transform(&value, &current);
        if result.is_unit() {
            tracing::debug!(
                target = %target.describe(),
                transformer = transformer.description(),
                "transformer discarded value"
            );
            return Propagation::Discarded;
        }
        let result_type = result.value_type();
        if result_type == target_type {
            return assign(target, result, Route::Transformed);
        }
        return convert_or_fallback(result, target_type, source, target);
    }

    if source_type == target_type || declared_type == target_type {
        return assign(target, value, Route::Direct);
    }
    match find_converter(source_type, target_type) {
        Some(converter) => convert(converter, value, target_type, source, target, Route::Converted),
        None => skip(
            source,
            target,
            SkipReason::MissingConverter {
                from: source_type,
                to: target_type,
            },
            None,
        ),
    }
}

fn find_converter(from: ValueType, to: ValueType) -> Option<Rc<dyn ValueConverter>> {
    ConverterRegistry::with_global(|registry| registry.get_converter(from, to))
}

fn convert(
    converter: Rc<dyn ValueConverter>,
    value: Value,
    target_type: ValueType,
    source: &str,
    target: &Endpoint,
    route: Route,
) -> Propagation {
    match converter.convert(&value, target_type) {
        Ok(converted) => assign(target, converted, route),
        Err(err) => skip(source, target, SkipReason::ConversionFailed(err), None),
    }
}

/// Convert a transformer's result, falling back to a plain assignment when
/// the target's declared type accepts it.
fn convert_or_fallback(
    value: Value,
    target_type: ValueType,
    source: &str,
    target: &Endpoint,
) -> Propagation {
    let from = value.value_type();
    if let Some(converter) = find_converter(from, target_type) {
        return convert(
            converter,
            value,
            target_type,
            source,
            target,
            Route::TransformedConverted,
        );
    }
    if target_type.is_assignable_from(from) {
        if BindyConfig::current().strict_assignability {
            return skip(
                source,
                target,
                SkipReason::StrictAssignability {
                    from,
                    to: target_type,
                },
                None,
            );
        }
        return assign(target, value, Route::Covariant);
    }
    skip(
        source,
        target,
        SkipReason::MissingConverter {
            from,
            to: target_type,
        },
        None,
    )
}

fn assign(target: &Endpoint, value: Value, route: Route) -> Propagation {
    if target.set_value_without_notify(value) {
        Propagation::Assigned(route)
    } else {
        Propagation::Unchanged(route)
    }
}

fn skip(
    source: &str,
    target: &Endpoint,
    reason: SkipReason,
    group: Option<&BindGroup>,
) -> Propagation {
    match group {
        Some(group) => tracing::warn!(
            group = %group.id(),
            source,
            target = %target.describe(),
            %reason,
            "propagation skipped"
        ),
        None => tracing::warn!(
            source,
            target = %target.describe(),
            %reason,
            "propagation skipped"
        ),
    }
    Propagation::Skipped(reason)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bindy_core::{
        BindId, FnTransformer, FormatString, HostRef, LogValue, TypeBuilder,
        ValueConverterAdapter, host,
    };

    struct Panel {
        count: i32,
        ratio: f32,
        text: String,
        anything: Value,
        position: [f32; 2],
    }

    fn register() {
        TypeBuilder::<Panel>::new("Panel")
            .field("count", |p: &Panel| p.count, |p, v| p.count = v)
            .field("ratio", |p: &Panel| p.ratio, |p, v| p.ratio = v)
            .property("text", |p: &Panel| p.text.clone(), |p, v| p.text = v)
            .field("anything", |p: &Panel| p.anything.clone(), |p, v| p.anything = v)
            .field("position", |p: &Panel| p.position, |p, v| p.position = v)
            .register();
    }

    fn panel() -> HostRef {
        host(Panel {
            count: 0,
            ratio: 0.0,
            text: String::new(),
            anything: Value::Unit,
            position: [0.0, 0.0],
        })
    }

    fn field(name: &str) -> Endpoint {
        Endpoint::field(panel(), name)
    }

    fn group() -> BindGroup {
        BindGroup::new(BindId::new("pipeline", "test"))
    }

    #[test]
    fn same_type_is_direct() {
        register();
        let (src, dst) = (field("count"), field("count"));
        src.set_value_without_notify(3);
        assert_eq!(
            process_value(&group(), &src, &dst),
            Propagation::Assigned(Route::Direct)
        );
        assert_eq!(
            process_value(&group(), &src, &dst),
            Propagation::Unchanged(Route::Direct)
        );
    }

    #[test]
    fn mismatch_goes_through_converter() {
        register();
        let (src, dst) = (field("count"), Endpoint::property(panel(), "text"));
        src.set_value_without_notify(42);
        assert_eq!(
            process_value(&group(), &src, &dst),
            Propagation::Assigned(Route::Converted)
        );
        assert_eq!(dst.value(), Some(Value::from("42")));
    }

    #[test]
    fn missing_converter_skips() {
        register();
        let (src, dst) = (field("position"), field("count"));
        src.set_value_without_notify([1.0_f32, 2.0]);
        assert_eq!(
            process_value(&group(), &src, &dst),
            Propagation::Skipped(SkipReason::MissingConverter {
                from: ValueType::Vector2,
                to: ValueType::Int,
            })
        );
        assert_eq!(dst.value(), Some(Value::Int(0)));
    }

    #[test]
    fn failed_conversion_skips() {
        register();
        let (src, dst) = (Endpoint::property(panel(), "text"), field("count"));
        src.set_value_without_notify("not a number");
        assert!(matches!(
            process_value(&group(), &src, &dst),
            Propagation::Skipped(SkipReason::ConversionFailed(ConvertError::Parse { .. }))
        ));
    }

    #[test]
    fn transformer_result_of_target_type() {
        register();
        let src = field("count");
        let dst = field("count").with_transformer(FnTransformer::new(
            "double",
            vec![ValueType::Int],
            vec![ValueType::Int],
            |s, _| match s {
                Value::Int(v) => Value::Int(v * 2),
                _ => Value::Unit,
            },
        ));
        src.set_value_without_notify(4);
        assert_eq!(
            process_value(&group(), &src, &dst),
            Propagation::Assigned(Route::Transformed)
        );
        assert_eq!(dst.value(), Some(Value::Int(8)));
    }

    #[test]
    fn transformer_result_is_converted() {
        register();
        let src = field("count");
        let dst = field("ratio").with_transformer(FormatString::new("{value}.5"));
        src.set_value_without_notify(2);
        assert_eq!(
            process_value(&group(), &src, &dst),
            Propagation::Assigned(Route::TransformedConverted)
        );
        assert_eq!(dst.value(), Some(Value::Float(2.5)));
    }

    #[test]
    fn unit_result_discards() {
        register();
        let src = field("count");
        let dst = field("count").with_transformer(LogValue::new("meter"));
        src.set_value_without_notify(9);
        assert_eq!(process_value(&group(), &src, &dst), Propagation::Discarded);
        assert_eq!(dst.value(), Some(Value::Int(0)));
    }

    #[test]
    fn disabled_transformer_is_bypassed() {
        register();
        let src = field("count");
        let dst = field("count").with_transformer(LogValue::new("meter"));
        if let Some(t) = dst.transformer() {
            t.set_enabled(false);
        }
        src.set_value_without_notify(9);
        assert_eq!(
            process_value(&group(), &src, &dst),
            Propagation::Assigned(Route::Direct)
        );
    }

    fn as_is(name: &'static str) -> FnTransformer {
        FnTransformer::new(name, Vec::new(), Vec::new(), |s, _| s.clone())
    }

    #[test]
    fn direct_path_has_no_covariant_fallback() {
        register();
        let (src, dst) = (field("position"), field("anything"));
        src.set_value_without_notify([3.0_f32, 4.0]);
        assert_eq!(
            process_value(&group(), &src, &dst),
            Propagation::Skipped(SkipReason::MissingConverter {
                from: ValueType::Vector2,
                to: ValueType::Any,
            })
        );
        assert_eq!(dst.value(), Some(Value::Unit));
    }

    #[test]
    fn transformed_value_falls_back_to_any_target() {
        register();
        let src = field("position");
        let dst = field("anything").with_transformer(as_is("pass through"));
        src.set_value_without_notify([3.0_f32, 4.0]);
        assert_eq!(
            process_value(&group(), &src, &dst),
            Propagation::Assigned(Route::Covariant)
        );
        assert_eq!(dst.value(), Some(Value::Vector2([3.0, 4.0])));
    }

    #[test]
    fn any_members_bind_directly() {
        register();
        let (src, dst) = (field("anything"), field("anything"));
        src.set_value_without_notify([5.0_f32, 6.0]);
        assert_eq!(
            process_value(&group(), &src, &dst),
            Propagation::Assigned(Route::Direct)
        );
        assert_eq!(dst.value(), Some(Value::Vector2([5.0, 6.0])));
    }

    #[test]
    fn strict_mode_refuses_covariant_assignment() {
        register();
        BindyConfig {
            strict_assignability: true,
            ..BindyConfig::default()
        }
        .install();
        let src = field("position");
        let dst = field("anything").with_transformer(as_is("pass through"));
        src.set_value_without_notify([3.0_f32, 4.0]);
        assert_eq!(
            process_value(&group(), &src, &dst),
            Propagation::Skipped(SkipReason::StrictAssignability {
                from: ValueType::Vector2,
                to: ValueType::Any,
            })
        );
        BindyConfig::reset();
    }

    #[test]
    fn any_source_routes_by_runtime_type() {
        register();
        let (src, dst) = (field("anything"), Endpoint::property(panel(), "text"));
        src.set_value_without_notify(7);
        assert_eq!(src.value_type(), Some(ValueType::Int));
        assert_eq!(
            process_value(&group(), &src, &dst),
            Propagation::Assigned(Route::Converted)
        );
        assert_eq!(dst.value(), Some(Value::from("7")));
    }

    #[test]
    fn custom_converter_wins() {
        register();
        ConverterRegistry::with_global(|r| {
            r.add_converter(ValueConverterAdapter::new(
                ValueType::Int,
                ValueType::String,
                |v| Ok(Value::String(format!("#{v}"))),
            ))
        });
        let (src, dst) = (field("count"), Endpoint::property(panel(), "text"));
        src.set_value_without_notify(5);
        process_value(&group(), &src, &dst);
        assert_eq!(dst.value(), Some(Value::from("#5")));
    }

    #[test]
    fn deliver_from_cached_value() {
        register();
        let dst = field("ratio");
        assert_eq!(
            deliver(Value::Int(3), ValueType::Int, "cache", &dst),
            Propagation::Assigned(Route::Converted)
        );
        assert_eq!(dst.value(), Some(Value::Float(3.0)));
    }

    #[test]
    fn invalid_target_is_skipped() {
        register();
        let src = field("count");
        let dst = field("missing");
        assert_eq!(
            process_value(&group(), &src, &dst),
            Propagation::Skipped(SkipReason::InvalidTarget)
        );
    }
}
