//! Property tests for the built-in converters and registry dedup.

use bindy_core::{ConverterRegistry, Value, ValueConverterAdapter, ValueType, VectorConverter};
use proptest::prelude::*;

proptest! {
    #[test]
    fn int_survives_string_round_trip(v in any::<i32>()) {
        let registry = ConverterRegistry::with_defaults();
        let text = registry.convert(&Value::Int(v), ValueType::String).unwrap();
        let back = registry.convert(&text, ValueType::Int).unwrap();
        prop_assert_eq!(back, Value::Int(v));
    }

    #[test]
    fn int_survives_widening(v in any::<i32>()) {
        let registry = ConverterRegistry::with_defaults();
        for wide in [ValueType::Long, ValueType::Double] {
            let widened = registry.convert(&Value::Int(v), wide).unwrap();
            let back = registry.convert(&widened, ValueType::Int).unwrap();
            prop_assert_eq!(back, Value::Int(v));
        }
    }

    #[test]
    fn long_to_int_is_clamped(v in any::<i64>()) {
        let registry = ConverterRegistry::with_defaults();
        let out = registry.convert(&Value::Long(v), ValueType::Int).unwrap();
        let expected = v.clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32;
        prop_assert_eq!(out, Value::Int(expected));
    }

    #[test]
    fn conversion_is_deterministic(v in -1.0e6_f64..1.0e6) {
        let registry = ConverterRegistry::with_defaults();
        for target in [ValueType::Int, ValueType::Long, ValueType::Float, ValueType::Bool, ValueType::String] {
            let first = registry.convert(&Value::Double(v), target).unwrap();
            let second = registry.convert(&Value::Double(v), target).unwrap();
            prop_assert_eq!(first, second);
        }
    }

    #[test]
    fn repeated_registration_keeps_one_entry(times in 1_usize..8) {
        let mut registry = ConverterRegistry::new();
        for _ in 0..times {
            registry.add_converter(VectorConverter);
            registry.add_converter(ValueConverterAdapter::new(
                ValueType::Bool,
                ValueType::Vector2,
                |v| Ok(Value::Vector2(if *v == Value::Bool(true) { [1.0, 1.0] } else { [0.0, 0.0] })),
            ));
        }
        prop_assert_eq!(registry.converter_count(), 2);
        prop_assert!(registry.contains_converter::<VectorConverter>());
        prop_assert!(registry.contains_converter::<ValueConverterAdapter>());
    }
}
