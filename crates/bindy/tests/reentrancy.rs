#![forbid(unsafe_code)]

//! Write short-circuiting and same-frame re-entry.

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::Duration;

use bindy::ValueAccessor;
use bindy::prelude::*;

struct Knob {
    value: i32,
    writes: u32,
}

fn register() {
    TypeBuilder::<Knob>::new("Knob")
        .field(
            "value",
            |k: &Knob| k.value,
            |k, v| {
                k.writes += 1;
                k.value = v;
            },
        )
        .register();
}

fn knob(value: i32) -> HostRef {
    host(Knob { value, writes: 0 })
}

fn writes(h: &HostRef) -> u32 {
    h.borrow().downcast_ref::<Knob>().map_or(0, |k| k.writes)
}

fn set_knob(h: &HostRef, value: i32) {
    if let Some(k) = h.borrow_mut().downcast_mut::<Knob>() {
        k.value = value;
    }
}

// ============================================================================
// Equality short-circuit
// ============================================================================

#[test]
fn equal_write_skips_setter_and_observers() {
    register();
    let h = knob(3);
    let mut accessor = ValueAccessor::field(Rc::clone(&h), "value");
    let events = Rc::new(Cell::new(0_u32));
    let seen = Rc::clone(&events);
    let _sub = accessor.subscribe(move |_| seen.set(seen.get() + 1));

    assert!(!accessor.set_value(Value::Int(3)));
    assert_eq!(writes(&h), 0);
    assert_eq!(events.get(), 0);

    assert!(accessor.set_value(Value::Int(4)));
    assert_eq!(writes(&h), 1);
    assert_eq!(events.get(), 1);

    assert!(!accessor.set_value(Value::Int(4)));
    assert_eq!(writes(&h), 1);
    assert_eq!(events.get(), 1);
}

#[test]
fn equal_endpoint_write_does_not_notify_group() {
    register();
    let ha = knob(3);
    let hb = knob(0);
    let a = Endpoint::field(Rc::clone(&ha), "value");
    let b = Endpoint::field(Rc::clone(&hb), "value");
    let group = BindGroup::new(BindId::new("Panel", "Knob"));
    group.add_bindables([&a, &b]);
    let updates = Rc::new(Cell::new(0_u32));
    let seen = Rc::clone(&updates);
    let _sub = group.subscribe(move |_| seen.set(seen.get() + 1));

    assert!(!a.set_value(3));
    assert_eq!(updates.get(), 0);
    assert_eq!(writes(&hb), 0);
}

// ============================================================================
// Same-frame re-entry
// ============================================================================

#[test]
fn transformer_writing_back_to_source_is_ignored() {
    register();
    let ha = knob(0);
    let hb = knob(0);
    let a = Endpoint::field(Rc::clone(&ha), "value").with_label("a");
    let slot: Rc<RefCell<Option<Endpoint>>> = Rc::new(RefCell::new(None));
    let back = Rc::clone(&slot);
    let attempts = Rc::new(Cell::new(0_u32));
    let tried = Rc::clone(&attempts);
    let b = Endpoint::field(Rc::clone(&hb), "value")
        .with_label("b")
        .with_transformer(FnTransformer::new(
            "echo into source",
            vec![ValueType::Int],
            vec![ValueType::Int],
            move |source, _| {
                tried.set(tried.get() + 1);
                if let Some(a) = back.borrow().as_ref() {
                    let written = a.set_value(source.as_f64().map_or(0, |v| v as i32) + 100);
                    assert!(!written);
                }
                source.clone()
            },
        ));
    *slot.borrow_mut() = Some(a.clone());

    let group = BindGroup::new(BindId::new("Panel", "Echo"));
    group.add_bindables([&a, &b]);

    assert!(a.set_value(5));
    assert_eq!(attempts.get(), 1);
    assert_eq!(a.value(), Some(Value::Int(5)));
    assert_eq!(b.value(), Some(Value::Int(5)));
    assert_eq!(writes(&ha), 1);

    slot.borrow_mut().take();
}

#[test]
fn observer_writing_back_to_source_is_ignored() {
    register();
    let a = Endpoint::field(knob(0), "value");
    let b = Endpoint::field(knob(0), "value");
    let group = BindGroup::new(BindId::new("Panel", "Observer"));
    group.add_bindables([&a, &b]);

    let writer = a.clone();
    let refused = Rc::new(Cell::new(0_u32));
    let count = Rc::clone(&refused);
    let _sub = b.subscribe(move |value| {
        if !writer.set_value(value.as_f64().map_or(0, |v| v as i32) * 2) {
            count.set(count.get() + 1);
        }
    });

    assert!(a.set_value(2));
    assert_eq!(refused.get(), 1);
    assert_eq!(a.value(), Some(Value::Int(2)));
    assert_eq!(b.value(), Some(Value::Int(2)));
}

#[test]
fn second_write_in_a_frame_is_refused() {
    register();
    let ha = knob(0);
    let hb = knob(0);
    let a = Endpoint::field(Rc::clone(&ha), "value");
    let b = Endpoint::field(Rc::clone(&hb), "value");
    let group = BindGroup::new(BindId::new("Panel", "Frame"));
    group.add_bindables([&a, &b]);

    assert!(a.set_value(1));
    assert!(!a.set_value(2));
    assert_eq!(a.value(), Some(Value::Int(1)));
    assert_eq!(b.value(), Some(Value::Int(1)));
    assert_eq!(writes(&ha), 1);

    // Another member may still write this frame, and the refused endpoint
    // still receives it.
    assert!(b.set_value(3));
    assert_eq!(a.value(), Some(Value::Int(3)));

    Scheduler::global().run_frame(Duration::from_millis(16));
    assert!(a.set_value(2));
    assert_eq!(b.value(), Some(Value::Int(2)));
    assert_eq!(group.last_value(), Some(Value::Int(2)));
}

#[test]
fn mirrored_groups_settle() {
    register();
    let h1 = knob(0);
    let h2 = knob(0);
    let every_frame = TickerSettings::frame_based(FrameInterval::EveryFrame);

    // Two groups wire the same pair of members in opposite directions.
    let a = Endpoint::field(Rc::clone(&h1), "value").with_ticker(every_frame);
    let b = Endpoint::field(Rc::clone(&h2), "value").with_ticker(every_frame);
    let c = Endpoint::field(Rc::clone(&h2), "value").with_ticker(every_frame);
    let d = Endpoint::field(Rc::clone(&h1), "value").with_ticker(every_frame);
    let forward = BindGroup::new(BindId::new("Loop", "Forward"));
    forward.add_bindables([&a, &b]);
    let back = BindGroup::new(BindId::new("Loop", "Back"));
    back.add_bindables([&c, &d]);
    for ep in [&a, &b, &c, &d] {
        assert!(ep.initialize());
        ep.start_ticking();
    }

    set_knob(&h1, 8);
    let scheduler = Scheduler::global();
    scheduler.run_frames(10, Duration::from_millis(16));

    assert_eq!(a.value(), Some(Value::Int(8)));
    assert_eq!(c.value(), Some(Value::Int(8)));
    let settled = writes(&h1) + writes(&h2);
    scheduler.run_frames(10, Duration::from_millis(16));
    assert_eq!(writes(&h1) + writes(&h2), settled);
    assert_eq!(forward.last_value(), Some(Value::Int(8)));
    assert_eq!(back.last_value(), Some(Value::Int(8)));
}
