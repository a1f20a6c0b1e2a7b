//! Demo graphs and a compact renderer for them

use hotswap_heap::{Body, DynRecord, Frame, FrameRef, ObjRef, Runtime, Value};
use std::fmt::Write as _;

/// Nesting beyond this is elided, which also cuts cycles
const RENDER_DEPTH: usize = 6;

/// The shared-list / nested-mapping scenario
pub(crate) struct Demo {
    pub(crate) runtime: Runtime,
    pub(crate) target: ObjRef,
    pub(crate) substitute: ObjRef,
    pub(crate) shared: ObjRef,
    pub(crate) nested: ObjRef,
}

pub(crate) fn demo() -> Demo {
    let runtime = Runtime::new();
    let heap = runtime.heap();
    let target = heap.mapping([
        (Value::str("key"), Value::str("value")),
        (Value::str("old"), Value::str("example")),
    ]);
    let substitute = heap.mapping([(Value::str("new_key"), Value::str("new_value"))]);
    let shared = heap.sequence([Value::str("shared_item"), Value::from(&target)]);
    let nested = heap.mapping([(Value::str("nested"), Value::from(&target))]);
    Demo {
        runtime,
        target,
        substitute,
        shared,
        nested,
    }
}

/// Many holders of one target, spread over every container kind
pub(crate) struct Wide {
    pub(crate) runtime: Runtime,
    pub(crate) target: ObjRef,
    pub(crate) substitute: ObjRef,
    pub(crate) holders: Vec<ObjRef>,
    pub(crate) frame: FrameRef,
}

pub(crate) fn wide(objects: usize) -> Wide {
    let runtime = Runtime::new();
    let heap = runtime.heap();
    let target = heap.mapping([(Value::str("generation"), Value::Int(1))]);
    let substitute = heap.mapping([(Value::str("generation"), Value::Int(2))]);

    let mut holders = Vec::with_capacity(objects);
    for i in 0..objects {
        let n = i64::try_from(i).unwrap_or(i64::MAX);
        let holder = match i % 5 {
            0 => heap.sequence([Value::Int(n), Value::from(&target)]),
            1 => heap.mapping([(Value::Int(n), Value::from(&target))]),
            2 => heap.mapping([(Value::from(&target), Value::Int(n))]),
            3 => heap.set([Value::Int(n), Value::from(&target)]),
            _ => heap.record(
                DynRecord::new("Worker")
                    .with_field("id", n)
                    .with_field("config", &target),
            ),
        };
        holders.push(holder);
    }

    let registry = heap.sequence(holders.iter().map(Value::from));
    let globals = heap.mapping([
        (Value::str("REGISTRY"), Value::from(&registry)),
        (Value::str("CONFIG"), Value::from(&target)),
    ]);
    holders.push(globals.clone());
    let frame = Frame::new("serve", globals, [("config", Value::from(&target))]);

    Wide {
        runtime,
        target,
        substitute,
        holders,
        frame,
    }
}

/// Render a value in a compact literal syntax
pub(crate) fn render(value: &Value) -> String {
    let mut out = String::new();
    render_into(&mut out, value, RENDER_DEPTH);
    out
}

fn render_into(out: &mut String, value: &Value, depth: usize) {
    let obj = match value {
        Value::Nil => return out.push_str("nil"),
        Value::Bool(b) => return out.push_str(if *b { "true" } else { "false" }),
        Value::Int(n) => return out.push_str(&n.to_string()),
        Value::Float(x) => return out.push_str(&x.to_string()),
        Value::Str(s) => return out.push_str(&format!("{s:?}")),
        Value::Ref(obj) => obj,
    };
    if depth == 0 {
        let _ = write!(out, "<{}{}>", obj.type_name(), obj.id());
        return;
    }

    let body = obj.read();
    match &*body {
        Body::Mapping(map) => {
            out.push('{');
            for (i, (key, value)) in map.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                render_into(out, key, depth - 1);
                out.push_str(": ");
                render_into(out, value, depth - 1);
            }
            out.push('}');
        }
        Body::Sequence(items) => {
            out.push('[');
            join(out, items.iter(), depth);
            out.push(']');
        }
        Body::Set(members) => {
            out.push('{');
            join(out, members.iter(), depth);
            out.push('}');
        }
        Body::Record(record) => {
            out.push_str(record.type_name());
            out.push('(');
            for (i, (name, value)) in record.fields().iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                out.push_str(name);
                out.push('=');
                render_into(out, value, depth - 1);
            }
            out.push(')');
        }
        Body::Opaque(_) => {
            let _ = write!(out, "<{}{}>", obj.type_name(), obj.id());
        }
    }
}

fn join<'a>(out: &mut String, values: impl Iterator<Item = &'a Value>, depth: usize) {
    for (i, value) in values.enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        render_into(out, value, depth - 1);
    }
}
