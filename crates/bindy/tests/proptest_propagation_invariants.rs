//! Property tests for group propagation.

use std::cell::Cell;
use std::rc::Rc;

use bindy::prelude::*;
use proptest::prelude::*;

struct Knob {
    value: i32,
    writes: u32,
}

struct Readout {
    text: String,
    level: f64,
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
    TypeBuilder::<Readout>::new("Readout")
        .property("text", |r: &Readout| r.text.clone(), |r, v| r.text = v)
        .field("level", |r: &Readout| r.level, |r, v| r.level = v)
        .register();
}

fn knob(value: i32) -> (HostRef, Endpoint) {
    let h = host(Knob { value, writes: 0 });
    let ep = Endpoint::field(Rc::clone(&h), "value");
    (h, ep)
}

fn writes(h: &HostRef) -> u32 {
    h.borrow().downcast_ref::<Knob>().map_or(0, |k| k.writes)
}

fn role_strategy() -> impl Strategy<Value = Role> {
    prop_oneof![
        Just(Role::Sender),
        Just(Role::Receiver),
        Just(Role::Bidirectional),
    ]
}

proptest! {
    #[test]
    fn source_setter_runs_once_per_own_change(v in any::<i32>(), others in 1_usize..6) {
        register();
        let (ha, a) = knob(v.wrapping_add(1));
        let group = BindGroup::new(BindId::new("Prop", "Echo"));
        group.add_bindable(&a);
        let mut peers = Vec::new();
        for i in 0..others {
            let (h, ep) = knob(v.wrapping_sub(i as i32 + 1));
            group.add_bindable(&ep);
            peers.push((h, ep));
        }

        prop_assert!(a.set_value(v));
        prop_assert_eq!(writes(&ha), 1);
        for (h, ep) in &peers {
            prop_assert_eq!(ep.value(), Some(Value::Int(v)));
            prop_assert_eq!(writes(h), 1);
        }
    }

    #[test]
    fn sender_is_never_overwritten(
        roles in prop::collection::vec(role_strategy(), 1..5),
        writes_seq in prop::collection::vec((0_usize..5, any::<i32>()), 1..12),
    ) {
        register();
        let (hs, sender) = knob(i32::MIN);
        let sender = sender.with_role(Role::Sender);
        let group = BindGroup::new(BindId::new("Prop", "Sender"));
        group.add_bindable(&sender);
        let members: Vec<Endpoint> = roles
            .iter()
            .map(|role| {
                let (_, ep) = knob(0);
                let ep = ep.with_role(*role);
                group.add_bindable(&ep);
                ep
            })
            .collect();

        for (index, value) in writes_seq {
            members[index % members.len()].set_value(value);
        }
        prop_assert_eq!(sender.value(), Some(Value::Int(i32::MIN)));
        prop_assert_eq!(writes(&hs), 0);
    }

    #[test]
    fn receiver_writes_never_notify(values in prop::collection::vec(any::<i32>(), 1..10)) {
        register();
        let (_, a) = knob(0);
        let (_, r) = knob(0);
        let r = r.with_role(Role::Receiver);
        let group = BindGroup::new(BindId::new("Prop", "Receiver"));
        group.add_bindables([&a, &r]);
        let notified = Rc::new(Cell::new(0_u32));
        let seen = Rc::clone(&notified);
        let _sub = group.subscribe(move |_| seen.set(seen.get() + 1));

        for value in values {
            r.set_value(value);
        }
        prop_assert_eq!(notified.get(), 0);
        prop_assert_eq!(a.value(), Some(Value::Int(0)));
        prop_assert!(group.last_changed_guid().is_none());
    }

    #[test]
    fn converted_value_ignores_unrelated_members(v in any::<i32>(), unrelated in 0_usize..6) {
        register();
        let (_, a) = knob(v.wrapping_add(1));
        let readout = host(Readout { text: String::new(), level: f64::NAN });
        let text = Endpoint::property(Rc::clone(&readout), "text");
        let level = Endpoint::field(Rc::clone(&readout), "level");
        let group = BindGroup::new(BindId::new("Prop", "Convert"));
        group.add_bindables([&a, &text, &level]);
        let mut extras = Vec::new();
        for i in 0..unrelated {
            let (_, ep) = knob(i as i32);
            let ep = ep.with_role(if i % 2 == 0 { Role::Sender } else { Role::Bidirectional });
            group.add_bindable(&ep);
            extras.push(ep);
        }

        prop_assert!(a.set_value(v));
        let registry = ConverterRegistry::with_defaults();
        let expected_text = registry.convert(&Value::Int(v), ValueType::String).unwrap();
        let expected_level = registry.convert(&Value::Int(v), ValueType::Double).unwrap();
        prop_assert_eq!(text.value(), Some(expected_text));
        prop_assert_eq!(level.value(), Some(expected_level));
    }
}
