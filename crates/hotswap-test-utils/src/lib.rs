//! Testing utilities for the hotswap workspace
//!
//! Shared fixtures and a recording observer.

#![allow(missing_docs)]

use hotswap_core::{MutationError, Rewrite, SweepObserver};
use hotswap_heap::{DynRecord, Heap, ObjRef, ObjectId, Runtime, Value};
use parking_lot::Mutex;

/// The canonical example graph
#[derive(Debug)]
pub struct Scenario {
    pub runtime: Runtime,
    pub target: ObjRef,
    pub substitute: ObjRef,
    /// `["shared_item", target]`
    pub shared: ObjRef,
    /// `{"nested": target}`
    pub nested: ObjRef,
}

impl Scenario {
    pub fn target_value(&self) -> Value {
        Value::from(&self.target)
    }

    pub fn substitute_value(&self) -> Value {
        Value::from(&self.substitute)
    }
}

pub fn example_scenario() -> Scenario {
    let runtime = Runtime::new();
    let heap = runtime.heap();
    let target = heap.mapping([(Value::str("old"), Value::str("example"))]);
    let substitute = heap.mapping([(Value::str("new_key"), Value::str("new_value"))]);
    let shared = heap.sequence([Value::str("shared_item"), Value::from(&target)]);
    let nested = heap.mapping([(Value::str("nested"), Value::from(&target))]);
    Scenario {
        runtime,
        target,
        substitute,
        shared,
        nested,
    }
}

/// `a` and `b` referencing each other; returns `(a, b)`
pub fn two_cycle(heap: &Heap) -> (ObjRef, ObjRef) {
    let a = heap.sequence([Value::str("a")]);
    let b = heap.sequence([Value::str("b"), Value::from(&a)]);
    a.push(Value::from(&b)).unwrap();
    (a, b)
}

/// Nested sequences, outermost first; only the innermost holds `target`
pub fn holder_chain(heap: &Heap, target: &ObjRef, depth: usize) -> Vec<ObjRef> {
    let mut chain = vec![heap.sequence([Value::from(target)])];
    for _ in 1..depth {
        let outer = heap.sequence([Value::from(chain.last().unwrap())]);
        chain.push(outer);
    }
    chain.reverse();
    chain
}

/// Record with one read-only and one writable field, both holding `target`
pub fn guarded_record(heap: &Heap, target: &ObjRef) -> ObjRef {
    heap.record(
        DynRecord::new("Service")
            .with_read_only("config", target)
            .with_field("cache", target)
            .with_field("name", "svc"),
    )
}

/// Ids of live objects that still directly hold `target`
pub fn still_referenced(heap: &Heap, target: &ObjRef) -> Vec<ObjectId> {
    heap.live_objects()
        .into_iter()
        .filter(|obj| obj.holds(target))
        .map(|obj| obj.id())
        .collect()
}

/// Observer that keeps every event
#[derive(Debug, Default)]
pub struct RecordingObserver {
    rewrites: Mutex<Vec<Rewrite>>,
    failures: Mutex<Vec<MutationError>>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rewrites(&self) -> Vec<Rewrite> {
        self.rewrites.lock().clone()
    }

    pub fn failures(&self) -> Vec<MutationError> {
        self.failures.lock().clone()
    }
}

impl SweepObserver for RecordingObserver {
    fn on_rewrite(&self, rewrite: &Rewrite) {
        self.rewrites.lock().push(rewrite.clone());
    }

    fn on_failure(&self, failure: &MutationError) {
        self.failures.lock().push(failure.clone());
    }
}
