#![forbid(unsafe_code)]

//! Runtime half of Bindy: endpoints, bind groups and polling.
//!
//! - [`Endpoint`]: a member accessor with a role, transformer, on-join
//!   policy and ticker.
//! - [`BindGroup`]: propagates a change in one endpoint to its siblings
//!   through [`pipeline::process_value`].
//! - [`BindRegistry`]: groups keyed by [`BindId`](bindy_core::BindId).
//! - [`Ticker`] / [`Scheduler`]: cooperative, frame-driven polling.
//! - [`BindingScope`]: joins and leaves a host's endpoints together.
//! - [`lifecycle::reload`]: resets the thread's binding world.
//!
//! # Architecture
//!
//! Endpoints and groups are `Rc` handles. A group holds its endpoints
//! strongly; an endpoint holds its group weakly, and its ticker callback
//! holds the endpoint weakly, so dropping the last outside handle tears
//! everything down. Global state is thread-local.
//!
//! Time only moves when the host calls [`Scheduler::run_frame`], which makes
//! every test deterministic.

pub mod config;
pub mod endpoint;
pub mod group;
pub mod lifecycle;
pub mod pipeline;
pub mod registry;
pub mod scheduler;
pub mod scope;
pub mod ticker;

#[cfg(feature = "config")]
pub use config::ConfigError;
pub use config::BindyConfig;
pub use endpoint::{Endpoint, OnJoin, Role};
pub use group::BindGroup;
pub use lifecycle::{on_reload, reload};
pub use pipeline::{Propagation, Route, SkipReason, deliver, process_value};
pub use registry::{BindRegistry, BindRegistryError};
pub use scheduler::{Scheduler, TaskHandle, TaskPoll};
pub use scope::BindingScope;
pub use ticker::{
    CostClock, FrameInterval, TickMode, Ticker, TickerSettings, TimeInterval, remaining_wait,
};
