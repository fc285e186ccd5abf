//! Integration Tests for the Tracking Kernel
//!
//! These tests drive effects, proxies, refs and computed values together
//! through the public API only.

use std::cell::{Cell, RefCell};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::rc::Rc;

use tether_core::config::{self, TrackingConfig};
use tether_core::diagnostics;
use tether_core::reactive::{
    effect, reactive, readonly, should_track, stop, Computed, DebuggerEvent, DebuggerEventKind,
    EffectOptions, Proxy, ReactiveContext, ReactiveEffect, Ref, TrackOpType, TriggerOpType,
};
use tether_core::{Target, TargetKind, Value};

fn proxy_of(target: Target) -> Proxy {
    reactive(target).into_proxy().expect("objects are always wrapped")
}

fn counter() -> (Rc<Cell<u32>>, Rc<Cell<u32>>) {
    let runs = Rc::new(Cell::new(0));
    (runs.clone(), runs)
}

fn capture_warnings() -> Rc<RefCell<Vec<String>>> {
    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = seen.clone();
    diagnostics::set_warn_handler(Some(Rc::new(move |msg: &str| {
        sink.borrow_mut().push(msg.to_owned());
    })));
    seen
}

/// Writing a property then reading it returns the written value.
#[test]
fn write_then_read_round_trips() {
    let state = proxy_of(Target::record([("a", 1)]));
    state.set("a", 5);
    assert_eq!(state.get("a"), Value::from(5));

    // Refs stored in records are unwrapped on read.
    let count = Ref::new(3);
    state.set("count", count.clone());
    assert_eq!(state.get("count"), Value::from(3));

    // Refs stored in sequence slots keep their identity.
    let list = proxy_of(Target::sequence([count.to_value()]));
    assert_eq!(list.get(0usize), count.to_value());
}

/// An effect re-runs only for the keys it read, and only on real changes.
#[test]
fn effects_depend_on_exactly_what_they_read() {
    let state = proxy_of(Target::record([("a", 1), ("b", 1)]));
    let (runs, runs_clone) = counter();
    let reader = state.clone();
    let _runner = effect(
        move || {
            runs_clone.set(runs_clone.get() + 1);
            reader.get("a");
        },
        EffectOptions::default(),
    );
    assert_eq!(runs.get(), 1);

    state.set("b", 2);
    assert_eq!(runs.get(), 1);

    state.set("a", 2);
    assert_eq!(runs.get(), 2);
    state.set("a", 2);
    assert_eq!(runs.get(), 2);

    state.set("a", f64::NAN);
    assert_eq!(runs.get(), 3);
    state.set("a", f64::NAN);
    assert_eq!(runs.get(), 3);
}

/// Enumerating keys subscribes to membership changes, not value changes.
#[test]
fn key_enumeration_tracks_membership() {
    let state = proxy_of(Target::record([("a", 1)]));
    let (runs, runs_clone) = counter();
    let reader = state.clone();
    let _runner = effect(
        move || {
            runs_clone.set(runs_clone.get() + 1);
            reader.own_keys();
        },
        EffectOptions::default(),
    );

    state.set("a", 2);
    assert_eq!(runs.get(), 1);

    state.set("c", 3);
    assert_eq!(runs.get(), 2);

    state.delete_property("a");
    assert_eq!(runs.get(), 3);

    // Deleting a missing key changes nothing.
    state.delete_property("a");
    assert_eq!(runs.get(), 3);
}

/// Truncating a sequence re-runs readers of the dropped indices once.
#[test]
fn truncating_a_sequence_notifies_dropped_indices() {
    let list = proxy_of(Target::sequence([1, 2, 3]));
    let seen = Rc::new(RefCell::new(Vec::new()));
    let (reader, seen_clone) = (list.clone(), seen.clone());
    let _runner = effect(
        move || seen_clone.borrow_mut().push(reader.get(2usize)),
        EffectOptions::default(),
    );

    list.set_len(1);
    assert_eq!(*seen.borrow(), vec![Value::from(3), Value::Undefined]);
}

/// Deleting a slot leaves a hole that is neither a key nor deletable twice.
#[test]
fn deleting_a_slot_leaves_a_hole() {
    let list = proxy_of(Target::sequence([1, 2, 3]));
    let (runs, runs_clone) = counter();
    let reader = list.clone();
    let _runner = effect(
        move || {
            runs_clone.set(runs_clone.get() + 1);
            reader.get(1usize);
            reader.has(1usize);
            reader.own_keys();
        },
        EffectOptions::default(),
    );
    assert_eq!(runs.get(), 1);

    assert!(list.delete_property(1usize));
    assert_eq!(runs.get(), 2);
    assert!(!list.has(1usize));
    assert_eq!(list.len(), 3);
    let keys: Vec<String> = list.own_keys().iter().map(|k| k.to_string()).collect();
    assert_eq!(keys, ["0", "2", "length"]);

    // The hole is already gone; a second delete changes nothing.
    assert!(list.delete_property(1usize));
    assert_eq!(runs.get(), 2);

    // Moving slots carries the hole along.
    assert_eq!(list.shift(), Value::from(1));
    assert!(!list.has(0usize));
    assert_eq!(list.get(1usize), Value::from(3));
    assert!(!list.includes(2));
    assert!(list.includes(Value::Undefined));
}

/// Writes past the representable range are refused without growing.
#[test]
fn out_of_range_sequence_writes_are_refused() {
    let warnings = capture_warnings();
    let list = proxy_of(Target::sequence([1]));
    let (runs, runs_clone) = counter();
    let reader = list.clone();
    let _runner = effect(
        move || {
            runs_clone.set(runs_clone.get() + 1);
            reader.len();
        },
        EffectOptions::default(),
    );

    assert!(!list.set(usize::MAX, 2));
    assert!(!list.set_len(usize::MAX));
    assert_eq!(list.len(), 1);
    assert_eq!(runs.get(), 1);
    assert!(warnings.borrow().iter().any(|w| w.contains("Invalid array length")));
    diagnostics::set_warn_handler(None);
}

/// A panicking body still restores the tracking context.
#[test]
fn panicking_effects_restore_the_context() {
    let state = proxy_of(Target::record([("a", 1)]));
    let reader = state.clone();
    let failing = ReactiveEffect::new(move || {
        reader.get("a");
        panic!("effect body failed");
    });
    let outcome = catch_unwind(AssertUnwindSafe(|| failing.run()));
    assert!(outcome.is_err());
    failing.stop();

    assert!(!ReactiveContext::is_active());
    assert!(should_track());

    let (runs, runs_clone) = counter();
    let reader = state.clone();
    let runner = effect(
        move || {
            runs_clone.set(runs_clone.get() + 1);
            reader.get("a");
        },
        EffectOptions::default(),
    );
    assert_eq!(runner.effect().dependency_count(), 1);
    state.set("a", 2);
    assert_eq!(runs.get(), 2);
}

/// Pushing from inside an effect does not make the effect depend on length.
#[test]
fn push_inside_an_effect_does_not_loop() {
    let list = proxy_of(Target::sequence(Vec::<i32>::new()));
    let (runs, runs_clone) = counter();
    let writer = list.clone();
    let runner = effect(
        move || {
            runs_clone.set(runs_clone.get() + 1);
            writer.push([1]);
        },
        EffectOptions::default(),
    );

    assert_eq!(runs.get(), 1);
    assert_eq!(runner.effect().dependency_count(), 0);
    list.push([2]);
    assert_eq!(runs.get(), 1);
    assert_eq!(list.len(), 2);
}

/// A self-writing effect runs once per external trigger.
#[test]
fn self_writes_do_not_recurse() {
    let state = proxy_of(Target::record([("count", 0)]));
    let (runs, runs_clone) = counter();
    let rw = state.clone();
    let _runner = effect(
        move || {
            runs_clone.set(runs_clone.get() + 1);
            let current = rw.get("count").as_number().unwrap_or(0.0);
            rw.set("count", current + 1.0);
        },
        EffectOptions::default(),
    );
    assert_eq!(runs.get(), 1);
    assert_eq!(state.get("count"), Value::from(1));

    state.set("count", 10);
    assert_eq!(runs.get(), 2);
    assert_eq!(state.get("count"), Value::from(11));
}

/// With `allow_recurse`, a self-write reaches the effect's scheduler.
#[test]
fn allow_recurse_lets_an_effect_schedule_itself() {
    for allow_recurse in [false, true] {
        let state = proxy_of(Target::record([("count", 0)]));
        let (scheduled, scheduled_clone) = counter();
        let rw = state.clone();
        let _runner = effect(
            move || {
                let current = rw.get("count").as_number().unwrap_or(0.0);
                rw.set("count", current + 1.0);
            },
            EffectOptions {
                allow_recurse,
                scheduler: Some(Rc::new(move || scheduled_clone.set(scheduled_clone.get() + 1))),
                ..EffectOptions::default()
            },
        );
        assert_eq!(scheduled.get(), u32::from(allow_recurse));
    }
}

/// Stopped effects never re-run, and `on_stop` fires once.
#[test]
fn stopped_effects_stay_stopped() {
    let state = proxy_of(Target::record([("a", 1)]));
    let (runs, runs_clone) = counter();
    let (stops, stops_clone) = counter();
    let reader = state.clone();
    let runner = effect(
        move || {
            runs_clone.set(runs_clone.get() + 1);
            reader.get("a");
        },
        EffectOptions {
            on_stop: Some(Box::new(move || stops_clone.set(stops_clone.get() + 1))),
            ..EffectOptions::default()
        },
    );

    stop(&runner);
    stop(&runner);
    assert_eq!(stops.get(), 1);
    assert!(!runner.effect().is_active());

    state.set("a", 2);
    assert_eq!(runs.get(), 1);

    // A stopped effect still works as a plain function.
    runner.run();
    assert_eq!(runs.get(), 2);
    state.set("a", 3);
    assert_eq!(runs.get(), 2);
}

#[test]
fn counter_scenario() {
    let obj = proxy_of(Target::record([("count", 0)]));
    let printed = Rc::new(RefCell::new(Vec::new()));
    let (reader, out) = (obj.clone(), printed.clone());
    let c = effect(
        move || out.borrow_mut().push(reader.get("count")),
        EffectOptions::default(),
    );

    obj.set("count", 1);
    stop(&c);
    obj.set("count", 2);

    assert_eq!(*printed.borrow(), vec![Value::from(0), Value::from(1)]);
}

#[test]
fn map_entries_scenario() {
    let m = proxy_of(Target::empty(TargetKind::Map));
    let (runs, runs_clone) = counter();
    let reader = m.clone();
    let _runner = effect(
        move || {
            runs_clone.set(runs_clone.get() + 1);
            reader.entries().count();
        },
        EffectOptions::default(),
    );

    m.insert("k", "v");
    assert_eq!(runs.get(), 2);
    m.insert("k", "v");
    assert_eq!(runs.get(), 2);

    // A value change is still an iteration change for entries().
    m.insert("k", "w");
    assert_eq!(runs.get(), 3);
}

#[test]
fn map_key_iteration_ignores_value_changes() {
    let m = proxy_of(Target::map([("k", 1)]));
    let (runs, runs_clone) = counter();
    let reader = m.clone();
    let _runner = effect(
        move || {
            runs_clone.set(runs_clone.get() + 1);
            reader.keys().count();
        },
        EffectOptions::default(),
    );

    m.insert("k", 2);
    assert_eq!(runs.get(), 1);
    m.insert("j", 1);
    assert_eq!(runs.get(), 2);
    m.remove("k");
    assert_eq!(runs.get(), 3);
}

#[test]
fn set_membership_and_size() {
    let s = proxy_of(Target::set(["a"]));
    let (has_runs, has_clone) = counter();
    let (size_runs, size_clone) = counter();
    let (has_reader, size_reader) = (s.clone(), s.clone());
    let _has = effect(
        move || {
            has_clone.set(has_clone.get() + 1);
            has_reader.contains("b");
        },
        EffectOptions::default(),
    );
    let _size = effect(
        move || {
            size_clone.set(size_clone.get() + 1);
            size_reader.size();
        },
        EffectOptions::default(),
    );

    s.add("a");
    assert_eq!((has_runs.get(), size_runs.get()), (1, 1));

    s.add("c");
    assert_eq!((has_runs.get(), size_runs.get()), (1, 2));

    s.add("b");
    assert_eq!((has_runs.get(), size_runs.get()), (2, 3));

    s.clear();
    assert_eq!((has_runs.get(), size_runs.get()), (3, 4));

    // Clearing an empty set triggers nothing.
    s.clear();
    assert_eq!((has_runs.get(), size_runs.get()), (3, 4));
}

#[test]
fn nested_collection_values_are_reactive() {
    let inner = Target::record([("n", 1)]);
    let m = proxy_of(Target::map([("inner", Value::Object(inner))]));
    let seen = Rc::new(RefCell::new(Vec::new()));
    let (reader, seen_clone) = (m.clone(), seen.clone());
    let _runner = effect(
        move || {
            let nested = reader.lookup("inner").into_proxy();
            seen_clone.borrow_mut().push(nested.map(|p| p.get("n")));
        },
        EffectOptions::default(),
    );

    let nested = m.lookup("inner").into_proxy().expect("wrapped on read");
    nested.set("n", 2);
    assert_eq!(seen.borrow().last(), Some(&Some(Value::from(2))));
}

/// Writes to a readonly view warn, report success and change nothing.
#[test]
fn readonly_writes_are_refused() {
    let seen = capture_warnings();
    let r = readonly(Target::record([("a", 1)]))
        .into_proxy()
        .expect("objects are always wrapped");

    assert!(r.set("a", 2));
    assert!(r.delete_property("a"));
    diagnostics::set_warn_handler(None);

    assert_eq!(r.get("a"), Value::from(1));
    assert_eq!(
        *seen.borrow(),
        vec![
            "Set operation on key \"a\" failed: target is readonly.".to_owned(),
            "Delete operation on key \"a\" failed: target is readonly.".to_owned(),
        ]
    );
}

/// A readonly view over a reactive proxy still tracks through it.
#[test]
fn readonly_view_tracks_the_reactive_source() {
    let source = proxy_of(Target::record([("a", 1)]));
    let view = readonly(source.to_value()).into_proxy().expect("proxies wrap");
    let seen = Rc::new(RefCell::new(Vec::new()));
    let (reader, seen_clone) = (view.clone(), seen.clone());
    let _runner = effect(
        move || seen_clone.borrow_mut().push(reader.get("a")),
        EffectOptions::default(),
    );

    source.set("a", 2);
    assert_eq!(*seen.borrow(), vec![Value::from(1), Value::from(2)]);
}

/// Triggers call the scheduler instead of running the effect.
#[test]
fn schedulers_defer_runs() {
    let state = proxy_of(Target::record([("a", 1)]));
    let queue: Rc<RefCell<Vec<u32>>> = Rc::new(RefCell::new(Vec::new()));
    let (runs, runs_clone) = counter();
    let reader = state.clone();
    let queue_clone = queue.clone();
    let runner = effect(
        move || {
            runs_clone.set(runs_clone.get() + 1);
            reader.get("a");
        },
        EffectOptions {
            scheduler: Some(Rc::new(move || queue_clone.borrow_mut().push(1))),
            ..EffectOptions::default()
        },
    );

    state.set("a", 2);
    state.set("a", 3);
    assert_eq!(runs.get(), 1);
    assert_eq!(queue.borrow().len(), 2);

    // The host flushes its queue.
    queue.borrow_mut().clear();
    runner.run();
    assert_eq!(runs.get(), 2);
}

/// The parent effect keeps tracking after a nested effect finishes.
#[test]
fn nested_effects_restore_the_parent() {
    let state = proxy_of(Target::record([("inner", 1), ("outer", 1)]));
    let (inner_runs, inner_clone) = counter();
    let (outer_runs, outer_clone) = counter();

    let inner_reader = state.clone();
    let inner = ReactiveEffect::new(move || {
        inner_clone.set(inner_clone.get() + 1);
        inner_reader.get("inner");
    });

    let outer_reader = state.clone();
    let nested = inner.clone();
    let _outer = effect(
        move || {
            outer_clone.set(outer_clone.get() + 1);
            nested.run();
            outer_reader.get("outer");
        },
        EffectOptions::default(),
    );
    assert_eq!((outer_runs.get(), inner_runs.get()), (1, 1));

    state.set("inner", 2);
    assert_eq!((outer_runs.get(), inner_runs.get()), (1, 2));

    state.set("outer", 2);
    assert_eq!((outer_runs.get(), inner_runs.get()), (2, 3));
}

/// Runs nested past the marker ceiling fall back to a full cleanup and
/// still end up with exactly the deps of their latest run.
#[test]
fn deep_nesting_falls_back_to_full_cleanup() {
    let previous = config::configure(TrackingConfig {
        max_marker_bits: 1,
        ..TrackingConfig::default()
    })
    .expect("valid configuration");

    let state = proxy_of(Target::record([
        ("use_a", Value::Bool(true)),
        ("a", Value::from(1)),
        ("b", Value::from(1)),
    ]));
    let seen = Rc::new(RefCell::new(Vec::new()));
    let (reader, seen_clone) = (state.clone(), seen.clone());
    let inner = ReactiveEffect::new(move || {
        let value = if reader.get("use_a").as_bool().unwrap_or(false) {
            reader.get("a")
        } else {
            reader.get("b")
        };
        seen_clone.borrow_mut().push(value);
    });

    let nested = inner.clone();
    let outer = effect(move || nested.run(), EffectOptions::default());
    assert_eq!(inner.dependency_count(), 2);

    state.set("use_a", false);
    state.set("b", 5);
    let before = seen.borrow().len();
    state.set("a", 9);
    assert_eq!(seen.borrow().len(), before);
    assert_eq!(seen.borrow().last(), Some(&Value::from(5)));

    // Re-run nested again, past the ceiling.
    outer.run();
    assert_eq!(inner.dependency_count(), 2);
    assert_eq!(seen.borrow().len(), before + 1);
    state.set("a", 10);
    assert_eq!(seen.borrow().len(), before + 1);

    config::configure(previous).expect("restoring a valid configuration");
}

#[test]
fn debugger_hooks_see_tracks_and_triggers() {
    let state = proxy_of(Target::record([("a", 1)]));
    let events: Rc<RefCell<Vec<DebuggerEvent>>> = Rc::new(RefCell::new(Vec::new()));
    let (on_track, on_trigger) = (events.clone(), events.clone());
    let reader = state.clone();
    let _runner = effect(
        move || {
            reader.get("a");
        },
        EffectOptions {
            on_track: Some(Rc::new(move |e: &DebuggerEvent| on_track.borrow_mut().push(e.clone()))),
            on_trigger: Some(Rc::new(move |e: &DebuggerEvent| {
                on_trigger.borrow_mut().push(e.clone())
            })),
            ..EffectOptions::default()
        },
    );

    state.set("a", 2);
    let kinds: Vec<DebuggerEventKind> = events.borrow().iter().map(|e| e.kind).collect();
    assert_eq!(
        kinds,
        vec![
            DebuggerEventKind::Track(TrackOpType::Get),
            DebuggerEventKind::Trigger(TriggerOpType::Set),
        ]
    );
    let trigger = &events.borrow()[1];
    assert_eq!(trigger.new_value, Some(Value::from(2)));
    assert_eq!(trigger.old_value, Some(Value::from(1)));
}

#[test]
fn computed_values_in_containers() {
    let count = Ref::new(1);
    let source = count.clone();
    let doubled = Computed::new(move || {
        Value::from(source.get().as_number().unwrap_or(0.0) * 2.0)
    });

    let state = proxy_of(Target::empty(TargetKind::Record));
    state.set("doubled", doubled.clone());
    assert_eq!(state.get("doubled"), Value::from(2));

    let seen = Rc::new(RefCell::new(Vec::new()));
    let (reader, seen_clone) = (state.clone(), seen.clone());
    let _runner = effect(
        move || seen_clone.borrow_mut().push(reader.get("doubled")),
        EffectOptions::default(),
    );

    count.set(4);
    assert_eq!(seen.borrow().last(), Some(&Value::from(8)));

    // A getter-only computed cannot be overwritten through the container.
    assert!(!state.set("doubled", 1));
    assert_eq!(state.get("doubled"), Value::from(8));
}
