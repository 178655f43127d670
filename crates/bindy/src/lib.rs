#![forbid(unsafe_code)]

//! Bindy: two-way data bindings between members of host objects.
//!
//! Host types declare their bindable fields and properties once; endpoints
//! then address members by name, poll them for changes, and propagate
//! changes to every other endpoint in the same group, converting and
//! transforming values on the way.
//!
//! # Example
//!
//! ```
//! use bindy::prelude::*;
//! use std::time::Duration;
//!
//! struct Slider { value: i32 }
//! struct Label { text: String }
//!
//! TypeBuilder::<Slider>::new("Slider")
//!     .field("value", |s: &Slider| s.value, |s, v| s.value = v)
//!     .register();
//! TypeBuilder::<Label>::new("Label")
//!     .property("text", |l: &Label| l.text.clone(), |l, v| l.text = v)
//!     .register();
//!
//! let slider = Endpoint::field(host(Slider { value: 0 }), "value").with_role(Role::Sender);
//! let label = Endpoint::property(host(Label { text: String::new() }), "text")
//!     .with_role(Role::Receiver);
//!
//! let registry = BindRegistry::global();
//! registry.add_bindables(BindId::new("Audio", "Master"), [&slider, &label]);
//!
//! slider.set_value(7);
//! assert_eq!(label.value(), Some(Value::from("7")));
//!
//! Scheduler::global().run_frame(Duration::from_millis(16));
//! ```
//!
//! # Crates
//!
//! - [`bindy_core`]: values, reflection tables, accessors, converters,
//!   transformers.
//! - [`bindy_runtime`]: endpoints, groups, tickers, scheduler, config.

pub use bindy_core as core;
pub use bindy_runtime as runtime;

#[cfg(feature = "logging")]
pub mod logging;

pub use bindy_core::{
    AccessError, BindId, BindValue, ConvertError, ConverterRegistry, Guid, HostRef, MemberKind,
    TypeBuilder, TypeRegistry, Value, ValueAccessor, ValueConverter, ValueConverterAdapter,
    ValueConverterFactory, ValueTransformer, ValueType, host,
};
pub use bindy_runtime::{
    BindGroup, BindRegistry, BindRegistryError, BindingScope, BindyConfig, Endpoint, OnJoin,
    Propagation, Role, Scheduler, Ticker, TickerSettings, process_value, reload,
};

/// Everything most hosts need.
pub mod prelude {
    pub use bindy_core::{
        BindId, BindValue, Clamp, ConverterRegistry, FnTransformer, FormatString, HostRef,
        InvertBool, LogValue, ScaleOffset, TypeBuilder, Value, ValueConverterAdapter,
        ValueTransformer, ValueType, host,
    };
    pub use bindy_runtime::{
        BindGroup, BindRegistry, BindingScope, BindyConfig, Endpoint, FrameInterval, OnJoin, Role,
        Scheduler, TickMode, TickerSettings, TimeInterval,
    };
}
