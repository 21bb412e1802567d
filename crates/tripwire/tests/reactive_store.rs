//! End-to-end behaviour of the engine plugged into the reference store.
//!
//! Covers watch, batch, effect, computed, tracking queries and plugin
//! instance isolation against real store objects: nested records, lists,
//! deletions and cyclic references.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use tripwire::prelude::*;

// ── Helpers ──────────────────────────────────────────────────────────

fn setup() -> (Reactive, Store) {
    let reactive = Reactive::new();
    let store = Store::new();
    store
        .use_plugin(Rc::new(reactive.clone()))
        .expect("live store");
    (reactive, store)
}

type Log = Rc<RefCell<Vec<Value>>>;

fn log() -> Log {
    Rc::new(RefCell::new(Vec::new()))
}

fn ints(log: &Log) -> Vec<i64> {
    log.borrow().iter().filter_map(Value::as_int).collect()
}

fn counter() -> Rc<Cell<u32>> {
    Rc::new(Cell::new(0))
}

fn bump(counter: &Rc<Cell<u32>>) {
    counter.set(counter.get() + 1);
}

fn increment(object: &Object, key: &str) {
    let next = object.peek(key).as_int().unwrap_or(0) + 1;
    object.set(key, next);
}

// ═════════════════════════════════════════════════════════════════════
// watch
// ═════════════════════════════════════════════════════════════════════

#[test]
fn runs_function_initially() {
    let (reactive, _store) = setup();
    let runs = counter();
    let r = Rc::clone(&runs);
    let watcher = reactive.watch(move || bump(&r));
    assert_eq!(runs.get(), 1);
    watcher.dispose();
}

#[test]
fn reruns_on_change_until_disposed() {
    let (reactive, store) = setup();
    let state = store.record_from([("count", 0)]).expect("live store");
    let data = log();
    let (s, d) = (state.clone(), Rc::clone(&data));
    let watcher = reactive.watch(move || d.borrow_mut().push(s.get("count")));
    assert_eq!(ints(&data), vec![0]);

    increment(&state, "count");
    assert_eq!(ints(&data), vec![0, 1]);
    increment(&state, "count");
    assert_eq!(ints(&data), vec![0, 1, 2]);

    watcher.dispose();
    increment(&state, "count");
    assert_eq!(ints(&data), vec![0, 1, 2]);
}

#[test]
fn nested_object_reads_ignore_siblings() {
    let (reactive, store) = setup();
    let another = store.record_from([("count2", 0)]).expect("live store");
    let nested = store
        .record_from([
            ("count", Value::Int(0)),
            ("anotherCount", Value::Int(0)),
            ("anotherObject", another.to_value()),
        ])
        .expect("live store");
    let state = store
        .record_from([("count", Value::Int(0)), ("nested", nested.to_value())])
        .expect("live store");

    let data = log();
    let (s, d) = (state.clone(), Rc::clone(&data));
    let _watcher = reactive.watch(move || {
        if let Some(nested) = s.child("nested") {
            d.borrow_mut().push(nested.get("count"));
        }
    });
    assert_eq!(ints(&data), vec![0]);

    increment(&nested, "count");
    assert_eq!(ints(&data), vec![0, 1]);
    increment(&state, "count");
    assert_eq!(ints(&data), vec![0, 1]);
    increment(&nested, "anotherCount");
    assert_eq!(ints(&data), vec![0, 1]);
    increment(&another, "count2");
    assert_eq!(ints(&data), vec![0, 1]);
}

#[test]
fn list_length_is_tracked() {
    let (reactive, store) = setup();
    let items = store.list().expect("live store");
    let state = store.record_from([("items", &items)]).expect("live store");
    let lengths = Rc::new(RefCell::new(Vec::new()));
    let (s, l) = (state.clone(), Rc::clone(&lengths));
    let _watcher = reactive.watch(move || {
        if let Some(items) = s.child("items") {
            l.borrow_mut().push(items.len());
        }
    });
    assert_eq!(lengths.borrow().as_slice(), &[0]);
    items.push(1).expect("list");
    assert_eq!(lengths.borrow().as_slice(), &[0, 1]);
    items.push(2).expect("list");
    assert_eq!(lengths.borrow().as_slice(), &[0, 1, 2]);
}

#[test]
fn container_reference_sees_structural_changes() {
    let (reactive, store) = setup();
    let todos = store.record().expect("live store");
    let list = store.record_from([("todos", &todos)]).expect("live store");
    let calls = Rc::new(RefCell::new(Vec::<Vec<Key>>::new()));
    let (l, c) = (list.clone(), Rc::clone(&calls));
    let s = store.clone();
    let _watcher = reactive.watch(move || {
        // Only the reference is read; contents are inspected untracked.
        let todos = l.get("todos");
        if let Some(todos) = s.resolve(&todos) {
            c.borrow_mut().push(todos.keys());
        }
    });
    calls.borrow_mut().clear();

    let milk = store.record_from([("title", "Buy milk")]).expect("live store");
    todos.set("1", &milk);
    assert_eq!(calls.borrow().len(), 1);
    assert_eq!(calls.borrow()[0], vec![Key::from("1")]);

    calls.borrow_mut().clear();
    let coffee = store.record_from([("title", "Buy coffee")]).expect("live store");
    todos.set("2", &coffee);
    assert_eq!(calls.borrow().len(), 1);
    assert_eq!(calls.borrow()[0], vec![Key::from("1"), Key::from("2")]);

    calls.borrow_mut().clear();
    assert!(todos.delete("1"));
    assert_eq!(calls.borrow().len(), 1);
    assert_eq!(calls.borrow()[0], vec![Key::from("2")]);
}

#[test]
fn list_structure_changes_rerun() {
    let (reactive, store) = setup();
    let items = store.list().expect("live store");
    let state = store.record_from([("items", &items)]).expect("live store");
    let snapshots = Rc::new(RefCell::new(Vec::<Vec<Value>>::new()));
    let (s, snaps, st) = (state.clone(), Rc::clone(&snapshots), store.clone());
    let _watcher = reactive.watch(move || {
        if let Some(items) = st.resolve(&s.get("items")) {
            snaps.borrow_mut().push(items.values());
        }
    });
    snapshots.borrow_mut().clear();

    items.push(1).expect("list");
    assert_eq!(snapshots.borrow().as_slice(), &[vec![Value::Int(1)]]);
    items.push(2).expect("list");
    assert_eq!(snapshots.borrow().len(), 2);
    assert_eq!(items.shift().expect("list"), Some(Value::Int(1)));
    assert_eq!(snapshots.borrow().last(), Some(&vec![Value::Int(2)]));
}

#[test]
fn parent_primitive_and_child_both_tracked() {
    let (reactive, store) = setup();
    let nested = store.record_from([("text", "hello")]).expect("live store");
    let state = store
        .record_from([("count", Value::Int(0)), ("nested", nested.to_value())])
        .expect("live store");
    let runs = counter();
    let (s, r) = (state.clone(), Rc::clone(&runs));
    let _watcher = reactive.watch(move || {
        let _ = s.get("count");
        if let Some(nested) = s.child("nested") {
            let _ = nested.get("text");
        }
        bump(&r);
    });
    assert_eq!(runs.get(), 1);
    increment(&state, "count");
    assert_eq!(runs.get(), 2);
    nested.set("text", "world");
    assert_eq!(runs.get(), 3);
}

#[test]
fn replaced_nested_object_reruns() {
    let (reactive, store) = setup();
    let first = store.record_from([("text", "initial")]).expect("live store");
    let state = store.record_from([("nested", &first)]).expect("live store");
    let data = log();
    let (s, d) = (state.clone(), Rc::clone(&data));
    let _watcher = reactive.watch(move || {
        if let Some(nested) = s.child("nested") {
            d.borrow_mut().push(nested.get("text"));
        }
    });
    let replacement = store.record_from([("text", "replaced")]).expect("live store");
    state.set("nested", &replacement);
    assert_eq!(
        data.borrow().as_slice(),
        &[Value::from("initial"), Value::from("replaced")]
    );

    // The old object is no longer a dependency.
    first.set("text", "stale");
    assert_eq!(data.borrow().len(), 2);
}

#[test]
fn multiple_watchers_on_same_state() {
    let (reactive, store) = setup();
    let state = store.record_from([("count", 0)]).expect("live store");
    let (first, second) = (counter(), counter());
    let (s1, c1) = (state.clone(), Rc::clone(&first));
    let (s2, c2) = (state.clone(), Rc::clone(&second));
    let w1 = reactive.watch(move || {
        let _ = s1.get("count");
        bump(&c1);
    });
    let _w2 = reactive.watch(move || {
        let _ = s2.get("count");
        bump(&c2);
    });
    increment(&state, "count");
    assert_eq!((first.get(), second.get()), (2, 2));

    drop(w1);
    increment(&state, "count");
    assert_eq!((first.get(), second.get()), (2, 3));
}

#[test]
fn conditional_access_switches_dependencies() {
    let (reactive, store) = setup();
    let state = store
        .record_from([
            ("flag", Value::Bool(true)),
            ("a", Value::Int(1)),
            ("b", Value::Int(2)),
        ])
        .expect("live store");
    let data = log();
    let (s, d) = (state.clone(), Rc::clone(&data));
    let watcher = reactive.watch(move || {
        let value = if s.get("flag").as_bool() == Some(true) {
            s.get("a")
        } else {
            s.get("b")
        };
        d.borrow_mut().push(value);
    });
    assert_eq!(watcher.dependency_count(), 2);

    state.set("b", 20);
    assert_eq!(ints(&data), vec![1]);
    state.set("flag", false);
    assert_eq!(ints(&data), vec![1, 20]);
    state.set("a", 100);
    assert_eq!(ints(&data), vec![1, 20]);
    state.set("b", 30);
    assert_eq!(ints(&data), vec![1, 20, 30]);
}

// ═════════════════════════════════════════════════════════════════════
// watch with batch
// ═════════════════════════════════════════════════════════════════════

#[test]
fn batch_coalesces_reruns() {
    let (reactive, store) = setup();
    let state = store.record_from([("count", 0)]).expect("live store");
    let data = log();
    let (s, d) = (state.clone(), Rc::clone(&data));
    let _watcher = reactive.watch(move || d.borrow_mut().push(s.get("count")));

    reactive.batch(|| {
        increment(&state, "count");
        increment(&state, "count");
    });
    assert_eq!(ints(&data), vec![0, 2]);
}

#[test]
fn batch_of_several_properties_reruns_once() {
    let (reactive, store) = setup();
    let state = store
        .record_from([("a", 0), ("b", 0), ("c", 0)])
        .expect("live store");
    let runs = counter();
    let (s, r) = (state.clone(), Rc::clone(&runs));
    let _watcher = reactive.watch(move || {
        let _ = (s.get("a"), s.get("b"), s.get("c"));
        bump(&r);
    });
    let out = batch(|| {
        state.set("a", 1);
        state.set("b", 2);
        state.set("c", 3);
        "done"
    });
    assert_eq!(out, "done");
    assert_eq!(runs.get(), 2);
}

#[test]
fn nested_batches_flush_at_outermost() {
    let (reactive, store) = setup();
    let state = store.record_from([("count", 0)]).expect("live store");
    let data = log();
    let (s, d) = (state.clone(), Rc::clone(&data));
    let _watcher = reactive.watch(move || d.borrow_mut().push(s.get("count")));

    batch(|| {
        increment(&state, "count");
        batch(|| {
            increment(&state, "count");
            increment(&state, "count");
        });
        assert_eq!(ints(&data), vec![0]);
        increment(&state, "count");
    });
    assert_eq!(ints(&data), vec![0, 4]);
}

#[test]
fn three_writes_in_batch_rerun_once() {
    let (reactive, store) = setup();
    let state = store.record_from([("count", 0)]).expect("live store");
    let runs = counter();
    let (s, r) = (state.clone(), Rc::clone(&runs));
    let _watcher = reactive.watch(move || {
        let _ = s.get("count");
        bump(&r);
    });
    batch(|| {
        state.set("count", 1);
        state.set("count", 2);
        state.set("count", 3);
    });
    assert_eq!(runs.get(), 2);
}

// ═════════════════════════════════════════════════════════════════════
// effect
// ═════════════════════════════════════════════════════════════════════

#[test]
fn effect_reruns_and_cleans_up_once() {
    let (reactive, store) = setup();
    let state = store.record_from([("count", 0)]).expect("live store");
    let (runs, cleanups) = (counter(), counter());
    let (s, r, c) = (state.clone(), Rc::clone(&runs), Rc::clone(&cleanups));
    let watcher = reactive.effect(
        move || {
            let _ = s.get("count");
            bump(&r);
        },
        move || bump(&c),
    );
    assert_eq!(runs.get(), 1);
    increment(&state, "count");
    assert_eq!(runs.get(), 2);
    assert_eq!(cleanups.get(), 0);

    watcher.dispose();
    watcher.dispose();
    assert_eq!(cleanups.get(), 1);
    increment(&state, "count");
    assert_eq!(runs.get(), 2);
}

#[test]
fn effect_without_meaningful_cleanup() {
    let (_reactive, store) = setup();
    let state = store.record_from([("count", 0)]).expect("live store");
    let runs = counter();
    let (s, r) = (state.clone(), Rc::clone(&runs));
    let watcher = effect(
        move || {
            let _ = s.get("count");
            bump(&r);
        },
        || {},
    );
    watcher.dispose();
    assert_eq!(runs.get(), 1);
}

// ═════════════════════════════════════════════════════════════════════
// is_tracking
// ═════════════════════════════════════════════════════════════════════

#[test]
fn tracking_only_inside_watch() {
    let (reactive, _store) = setup();
    assert!(!reactive.is_tracking());
    let seen = Rc::new(Cell::new(false));
    let s = Rc::clone(&seen);
    let _watcher = watch(move || s.set(is_tracking()));
    assert!(seen.get());
    assert!(!is_tracking());

    let inside_untracked = Rc::new(Cell::new(true));
    let u = Rc::clone(&inside_untracked);
    let _watcher = watch(move || untracked(|| u.set(is_tracking())));
    assert!(!inside_untracked.get());
}

// ═════════════════════════════════════════════════════════════════════
// instance-scoped plugins
// ═════════════════════════════════════════════════════════════════════

#[test]
fn factory_instance_plugin_tracks() {
    let reactive = Reactive::new();
    let factory = Store::new();
    factory
        .use_plugin(Rc::new(reactive.clone()))
        .expect("live store");
    let state = factory.record_from([("count", 0)]).expect("live store");
    let data = log();
    let (s, d) = (state.clone(), Rc::clone(&data));
    let watcher = reactive.watch(move || d.borrow_mut().push(s.get("count")));
    increment(&state, "count");
    assert_eq!(ints(&data), vec![0, 1]);
    watcher.dispose();
    factory.dispose();
}

#[test]
fn instances_isolate_tracking() {
    let (reactive1, factory1) = setup();
    let (reactive2, factory2) = setup();
    let state1 = factory1.record_from([("count", 0)]).expect("live store");
    let state2 = factory2.record_from([("count", 0)]).expect("live store");
    let (first, second) = (counter(), counter());
    let (s1, c1) = (state1.clone(), Rc::clone(&first));
    let (s2, c2) = (state2.clone(), Rc::clone(&second));
    let _w1 = reactive1.watch(move || {
        let _ = s1.get("count");
        bump(&c1);
    });
    let _w2 = reactive2.watch(move || {
        let _ = s2.get("count");
        bump(&c2);
    });
    first.set(0);
    second.set(0);

    increment(&state1, "count");
    assert_eq!((first.get(), second.get()), (1, 0));
    increment(&state2, "count");
    assert_eq!((first.get(), second.get()), (1, 1));

    factory1.dispose();
    factory2.dispose();
}

#[test]
fn store_without_plugin_is_not_tracked() {
    let (reactive, _store) = setup();
    let plain = Store::new();
    let state = plain.record_from([("count", 0)]).expect("live store");
    let runs = counter();
    let (s, r) = (state.clone(), Rc::clone(&runs));
    let watcher = reactive.watch(move || {
        let _ = s.get("count");
        bump(&r);
    });
    assert_eq!(watcher.dependency_count(), 0);
    increment(&state, "count");
    assert_eq!(runs.get(), 1);
}

#[test]
fn cleared_plugins_stop_tracking() {
    let (reactive, store) = setup();
    store.clear_plugins();
    let state = store.record_from([("count", 0)]).expect("live store");
    let runs = counter();
    let (s, r) = (state.clone(), Rc::clone(&runs));
    let _watcher = reactive.watch(move || {
        let _ = s.get("count");
        bump(&r);
    });
    increment(&state, "count");
    assert_eq!(runs.get(), 1);
}

// ═════════════════════════════════════════════════════════════════════
// edge cases
// ═════════════════════════════════════════════════════════════════════

#[test]
fn undefined_properties_are_tracked() {
    let (reactive, store) = setup();
    let state = store.record().expect("live store");
    let data = log();
    let (s, d) = (state.clone(), Rc::clone(&data));
    let _watcher = reactive.watch(move || d.borrow_mut().push(s.get("value")));
    assert_eq!(data.borrow().last(), Some(&Value::Undefined));

    state.set("value", 42);
    assert_eq!(data.borrow().last(), Some(&Value::Int(42)));
    assert!(state.delete("value"));
    assert_eq!(data.borrow().last(), Some(&Value::Undefined));
    assert_eq!(data.borrow().len(), 3);
}

#[test]
fn rapid_successive_changes_each_rerun() {
    let (reactive, store) = setup();
    let state = store.record_from([("count", 0)]).expect("live store");
    let data = log();
    let (s, d) = (state.clone(), Rc::clone(&data));
    let _watcher = reactive.watch(move || d.borrow_mut().push(s.get("count")));
    data.borrow_mut().clear();
    for _ in 0..10 {
        increment(&state, "count");
    }
    assert_eq!(ints(&data), (1..=10).collect::<Vec<_>>());
}

#[test]
fn circular_references() {
    let (reactive, store) = setup();
    let state = store.record_from([("count", 0)]).expect("live store");
    state.set("self", &state);
    let runs = counter();
    let (s, r) = (state.clone(), Rc::clone(&runs));
    let _watcher = reactive.watch(move || {
        let _ = s.get("count");
        let _ = s.child("self").map(|me| me.get("self"));
        bump(&r);
    });
    assert_eq!(runs.get(), 1);
    increment(&state, "count");
    assert_eq!(runs.get(), 2);
    assert!(state.delete("self"));
}

#[test]
fn repeated_dispose_is_safe() {
    let (reactive, store) = setup();
    let state = store.record_from([("count", 0)]).expect("live store");
    let runs = counter();
    let (s, r) = (state.clone(), Rc::clone(&runs));
    let watcher = reactive.watch(move || {
        let _ = s.get("count");
        bump(&r);
    });
    watcher.dispose();
    watcher.dispose();
    watcher.dispose();
    increment(&state, "count");
    assert_eq!(runs.get(), 1);
    assert_eq!(state.listener_count(), 0);
}

#[test]
fn equal_value_write_does_not_rerun() {
    let (reactive, store) = setup();
    let state = store.record_from([("count", 5)]).expect("live store");
    let runs = counter();
    let (s, r) = (state.clone(), Rc::clone(&runs));
    let _watcher = reactive.watch(move || {
        let _ = s.get("count");
        bump(&r);
    });
    state.set("count", 5);
    assert_eq!(runs.get(), 1);
}

#[test]
fn panicking_watcher_leaves_engine_usable() {
    let (reactive, store) = setup();
    let state = store
        .record_from([("count", Value::Int(0)), ("fail", Value::Bool(false))])
        .expect("live store");
    let runs = counter();
    let (s, r) = (state.clone(), Rc::clone(&runs));
    let _watcher = reactive.watch(move || {
        bump(&r);
        let _ = s.get("count");
        assert!(s.get("fail").as_bool() != Some(true), "watched function failed");
    });

    let result: std::thread::Result<()> =
        std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| state.set("fail", true)));
    assert!(result.is_err());
    assert!(!is_tracking());
    assert!(!in_batch());

    state.set("fail", false);
    increment(&state, "count");
    assert_eq!(runs.get(), 4);
}

#[test]
fn global_notify_mode_matches_per_owner() {
    let reactive =
        Reactive::with_config(ReactiveConfig::default().with_notify(NotifyMode::Global));
    let store = Store::new();
    store
        .use_plugin(Rc::new(reactive.clone()))
        .expect("live store");
    let state = store
        .record_from([("count", 0), ("other", 0)])
        .expect("live store");
    let data = log();
    let (s, d) = (state.clone(), Rc::clone(&data));
    let watcher = reactive.watch(move || d.borrow_mut().push(s.get("count")));
    assert!(watcher.is_fan_out());
    assert_eq!(watcher.subscription_count(), 0);

    increment(&state, "count");
    state.set("other", 1);
    batch(|| {
        increment(&state, "count");
        increment(&state, "count");
    });
    assert_eq!(ints(&data), vec![0, 1, 3]);
}

// ═════════════════════════════════════════════════════════════════════
// reentrant writes
// ═════════════════════════════════════════════════════════════════════

fn self_correcting(reactive: &Reactive, state: &Object) -> (Watcher, Log) {
    let data = log();
    let (s, d) = (state.clone(), Rc::clone(&data));
    let watcher = reactive.watch(move || {
        let a = s.get("a");
        d.borrow_mut().push(a.clone());
        if a == Value::Int(0) {
            s.set("a", 1);
        }
    });
    (watcher, data)
}

#[test]
fn writing_own_dependency_converges() {
    let (reactive, store) = setup();
    let state = store.record_from([("a", 0), ("b", 0)]).expect("live store");
    let (watcher, data) = self_correcting(&reactive, &state);
    assert_eq!(state.peek("a"), Value::Int(1));
    assert_eq!(ints(&data), vec![0, 1]);
    assert!(!watcher.is_changed());

    state.set("b", 5);
    assert_eq!(ints(&data), vec![0, 1]);
    state.set("a", 0);
    assert_eq!(ints(&data), vec![0, 1, 0, 1]);
}

#[test]
fn writing_own_dependency_converges_in_global_mode() {
    let reactive =
        Reactive::with_config(ReactiveConfig::default().with_notify(NotifyMode::Global));
    let store = Store::new();
    store
        .use_plugin(Rc::new(reactive.clone()))
        .expect("live store");
    let state = store.record_from([("a", 0)]).expect("live store");
    let other = store.record_from([("z", 0)]).expect("live store");
    let (_watcher, data) = self_correcting(&reactive, &state);
    assert_eq!(ints(&data), vec![0, 1]);

    other.set("z", 1);
    assert_eq!(ints(&data), vec![0, 1]);
}

#[test]
fn watcher_feeds_another_watcher() {
    let (reactive, store) = setup();
    let input = store.record_from([("x", 0)]).expect("live store");
    let output = store.record_from([("y", 0)]).expect("live store");
    let (i, o) = (input.clone(), output.clone());
    let _writer = reactive.watch(move || {
        let x = i.get("x").as_int().unwrap_or(0);
        o.set("y", x * 10);
    });
    let data = log();
    let (o, d) = (output.clone(), Rc::clone(&data));
    let _reader = reactive.watch(move || d.borrow_mut().push(o.get("y")));
    assert_eq!(ints(&data), vec![0]);

    input.set("x", 1);
    assert_eq!(ints(&data), vec![0, 10]);

    batch(|| {
        input.set("x", 2);
        input.set("x", 3);
        assert_eq!(ints(&data), vec![0, 10]);
    });
    assert_eq!(ints(&data), vec![0, 10, 30]);
    assert_eq!(output.peek("y"), Value::Int(30));
}

#[test]
fn watcher_feeds_another_watcher_on_the_same_object() {
    let (reactive, store) = setup();
    let state = store.record_from([("x", 0), ("y", 0)]).expect("live store");
    let s = state.clone();
    let _writer = reactive.watch(move || {
        let x = s.get("x").as_int().unwrap_or(0);
        s.set("y", x + 100);
    });
    let data = log();
    let (s, d) = (state.clone(), Rc::clone(&data));
    let _reader = reactive.watch(move || d.borrow_mut().push(s.get("y")));
    assert_eq!(ints(&data), vec![100]);

    batch(|| state.set("x", 1));
    assert_eq!(ints(&data), vec![100, 101]);
    state.set("x", 2);
    assert_eq!(ints(&data), vec![100, 101, 102]);
}

// ═════════════════════════════════════════════════════════════════════
// computed
// ═════════════════════════════════════════════════════════════════════

fn doubled(state: &Object) -> Getters {
    let s = state.clone();
    Getters::new().with("doubled", move || s.get("count").as_int().unwrap_or(0) * 2)
}

#[test]
fn computed_requires_attached_factory() {
    let reactive = Reactive::new();
    let err = reactive.computed(Getters::new().with("x", || 1)).err();
    assert_eq!(err, Some(ReactiveError::Unbound));
}

#[test]
fn computed_tracks_and_freezes() {
    let (reactive, store) = setup();
    let state = store.record_from([("count", 2)]).expect("live store");
    let computed = reactive.computed(doubled(&state)).expect("attached");
    assert_eq!(computed.get("doubled"), Value::Int(4));

    state.set("count", 5);
    assert_eq!(computed.get("doubled"), Value::Int(10));

    computed.dispose();
    state.set("count", 10);
    assert_eq!(computed.get("doubled"), Value::Int(10));
}

#[test]
fn computed_with_multiple_dependencies() {
    let (reactive, store) = setup();
    let state = store
        .record_from([
            ("first", Value::from("John")),
            ("last", Value::from("Doe")),
            ("age", Value::Int(20)),
        ])
        .expect("live store");
    let (s1, s2) = (state.clone(), state.clone());
    let computed = reactive
        .computed(
            Getters::new()
                .with("full", move || {
                    let first = s1.get("first");
                    let last = s1.get("last");
                    format!(
                        "{} {}",
                        first.as_str().unwrap_or_default(),
                        last.as_str().unwrap_or_default()
                    )
                })
                .with("canDrink", move || s2.get("age").as_int().unwrap_or(0) >= 21),
        )
        .expect("attached");
    assert_eq!(computed.get("full"), Value::from("John Doe"));
    assert_eq!(computed.get("canDrink"), Value::Bool(false));

    state.set("last", "Smith");
    assert_eq!(computed.get("full"), Value::from("John Smith"));
    state.set("age", 21);
    assert_eq!(computed.get("canDrink"), Value::Bool(true));
}

#[test]
fn computed_over_nested_state() {
    let (reactive, store) = setup();
    let user = store.record_from([("age", 18)]).expect("live store");
    let state = store.record_from([("user", &user)]).expect("live store");
    let s = state.clone();
    let computed = reactive
        .computed(Getters::new().with("canDrink", move || {
            s.child("user")
                .and_then(|user| user.get("age").as_int())
                .is_some_and(|age| age >= 21)
        }))
        .expect("attached");
    assert_eq!(computed.get("canDrink"), Value::Bool(false));
    user.set("age", 21);
    assert_eq!(computed.get("canDrink"), Value::Bool(true));
}

#[test]
fn computed_on_instance_scoped_plugin() {
    let reactive = Reactive::new();
    let factory = Store::new();
    factory
        .use_plugin(Rc::new(reactive.clone()))
        .expect("live store");
    let state = factory.record_from([("count", 5)]).expect("live store");
    let s = state.clone();
    let computed = reactive
        .computed(Getters::new().with("squared", move || {
            let n = s.get("count").as_int().unwrap_or(0);
            n * n
        }))
        .expect("attached");
    assert_eq!(computed.get("squared"), Value::Int(25));
    state.set("count", 4);
    assert_eq!(computed.get("squared"), Value::Int(16));
    computed.dispose();
    factory.dispose();
}

#[test]
fn computed_depends_on_computed() {
    let (reactive, store) = setup();
    let state = store.record_from([("count", 2)]).expect("live store");
    let first = Rc::new(reactive.computed(doubled(&state)).expect("attached"));
    let upstream = Rc::clone(&first);
    let second = reactive
        .computed(Getters::new().with("quadrupled", move || {
            upstream.get("doubled").as_int().unwrap_or(0) * 2
        }))
        .expect("attached");
    assert_eq!(first.get("doubled"), Value::Int(4));
    assert_eq!(second.get("quadrupled"), Value::Int(8));

    state.set("count", 3);
    assert_eq!(first.get("doubled"), Value::Int(6));
    assert_eq!(second.get("quadrupled"), Value::Int(12));

    second.dispose();
    first.dispose();
}

#[test]
fn computed_dispose_many_times() {
    let (reactive, store) = setup();
    let state = store.record_from([("count", 1)]).expect("live store");
    let computed = reactive.computed(doubled(&state)).expect("attached");
    computed.dispose();
    computed.dispose();
    computed.dispose();
    assert!(computed.is_disposed());
    assert_eq!(computed.get("doubled"), Value::Int(2));
}

#[test]
fn computed_keys_are_watchable() {
    let (reactive, store) = setup();
    let state = store.record_from([("count", 1)]).expect("live store");
    let computed = Rc::new(reactive.computed(doubled(&state)).expect("attached"));
    let data = log();
    let (c, d) = (Rc::clone(&computed), Rc::clone(&data));
    let _watcher = reactive.watch(move || d.borrow_mut().push(c.get("doubled")));
    state.set("count", 2);
    assert_eq!(ints(&data), vec![2, 4]);
}
