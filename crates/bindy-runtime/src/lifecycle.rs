#![forbid(unsafe_code)]

//! Reload hook.
//!
//! [`reload`] resets this thread's binding world, mirroring a host
//! environment reset: stale groups, tasks and cached member lists must not
//! survive it.
//!
//! Order: scheduler, bind registry (emptying every group), member cache,
//! converter registry, then the `on_reload` observers.

use bindy_core::{ConverterRegistry, ObserverList, Subscription, TypeRegistry};

use crate::config::BindyConfig;
use crate::registry::BindRegistry;
use crate::scheduler::Scheduler;

thread_local! {
    static ON_RELOAD: ObserverList<()> = ObserverList::new();
}

/// Reset the thread's global binding state.
pub fn reload() {
    let _span = tracing::info_span!("bindy_reload").entered();
    Scheduler::global().clear();
    BindRegistry::global().clear();
    TypeRegistry::clear_cache();
    ConverterRegistry::reset_global(BindyConfig::current().register_default_converters);
    tracing::info!("binding state reloaded");
    let observers = ON_RELOAD.with(Clone::clone);
    observers.notify(&());
}

/// Run `callback` after every [`reload`] on this thread.
pub fn on_reload(callback: impl Fn() + 'static) -> Subscription {
    ON_RELOAD.with(|observers| observers.subscribe(move |_: &()| callback()))
}
