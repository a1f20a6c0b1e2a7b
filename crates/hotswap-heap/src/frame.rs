//! Execution frames and the call stack
//!
//! A [`Frame`] models one active call: a shared global scope (a mapping
//! object keyed by name) and private locals kept in fast slots. Running code
//! reads and writes the slots directly. Tools inspecting the frame work on a
//! detached [`LocalBindings`] snapshot and must [`Frame::commit_locals`] for
//! their edits to become visible to the running code.

use crate::object::ObjRef;
use crate::value::{ObjectId, Value};
use indexmap::IndexMap;
use parking_lot::Mutex;
use std::fmt::{self, Debug, Formatter};
use std::sync::Arc;

/// Shared handle to a frame
pub type FrameRef = Arc<Frame>;

#[derive(Debug, Default)]
struct FastLocals {
    names: Vec<String>,
    slots: Vec<Value>,
}

impl FastLocals {
    fn position(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }

    fn set(&mut self, name: &str, value: Value) {
        match self.position(name) {
            Some(i) => self.slots[i] = value,
            None => {
                self.names.push(name.to_string());
                self.slots.push(value);
            }
        }
    }
}

/// Detached snapshot of a frame's local bindings
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocalBindings {
    entries: IndexMap<String, Value>,
}

impl LocalBindings {
    /// Bound value of a name
    #[inline]
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.entries.get(name)
    }

    /// Rebind a name in the snapshot
    pub fn rebind(&mut self, name: impl Into<String>, value: Value) {
        self.entries.insert(name.into(), value);
    }

    /// Iterate bindings in slot order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(name, value)| (name.as_str(), value))
    }

    /// Number of bindings
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether there are no bindings
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// One active call
pub struct Frame {
    id: ObjectId,
    function: String,
    globals: ObjRef,
    locals: Mutex<FastLocals>,
}

impl Frame {
    /// Create a frame for `function` running against `globals`
    pub fn new<N: Into<String>>(
        function: impl Into<String>,
        globals: ObjRef,
        locals: impl IntoIterator<Item = (N, Value)>,
    ) -> FrameRef {
        let mut fast = FastLocals::default();
        for (name, value) in locals {
            fast.set(&name.into(), value);
        }
        Arc::new(Self {
            id: ObjectId::next(),
            function: function.into(),
            globals,
            locals: Mutex::new(fast),
        })
    }

    /// Frame identity
    #[inline]
    #[must_use]
    pub fn id(&self) -> ObjectId {
        self.id
    }

    /// Name of the running function
    #[inline]
    #[must_use]
    pub fn function(&self) -> &str {
        &self.function
    }

    /// Global scope visible to the call
    #[inline]
    #[must_use]
    pub fn globals(&self) -> &ObjRef {
        &self.globals
    }

    /// Read a global as the running code would
    #[must_use]
    pub fn global(&self, name: &str) -> Option<Value> {
        self.globals.get(&Value::str(name))
    }

    /// Read a local as the running code would
    #[must_use]
    pub fn local(&self, name: &str) -> Option<Value> {
        let locals = self.locals.lock();
        locals.position(name).map(|i| locals.slots[i].clone())
    }

    /// Write a local as the running code would
    pub fn set_local(&self, name: &str, value: Value) {
        self.locals.lock().set(name, value);
    }

    /// Snapshot the local bindings
    #[must_use]
    pub fn local_bindings(&self) -> LocalBindings {
        let locals = self.locals.lock();
        LocalBindings {
            entries: locals
                .names
                .iter()
                .cloned()
                .zip(locals.slots.iter().cloned())
                .collect(),
        }
    }

    /// Write a snapshot back into the fast slots
    ///
    /// Every name in `bindings` is written; names absent from the snapshot
    /// keep their current slot value.
    pub fn commit_locals(&self, bindings: &LocalBindings) {
        let mut locals = self.locals.lock();
        for (name, value) in bindings.iter() {
            locals.set(name, value.clone());
        }
    }
}

impl Debug for Frame {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("id", &self.id)
            .field("function", &self.function)
            .field("globals", &self.globals.id())
            .finish_non_exhaustive()
    }
}

/// Host-maintained stack of active frames, outermost first
#[derive(Debug, Default)]
pub struct CallStack {
    frames: Mutex<Vec<FrameRef>>,
}

impl CallStack {
    /// Create an empty stack
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Push a frame; it stays active until the guard is dropped
    #[must_use = "the frame is popped as soon as the guard is dropped"]
    pub fn enter(&self, frame: FrameRef) -> FrameGuard<'_> {
        let id = frame.id();
        self.frames.lock().push(frame);
        FrameGuard { stack: self, id }
    }

    /// Snapshot of the active frames, outermost first
    #[must_use]
    pub fn frames(&self) -> Vec<FrameRef> {
        self.frames.lock().clone()
    }

    /// Innermost active frame
    #[must_use]
    pub fn current(&self) -> Option<FrameRef> {
        self.frames.lock().last().cloned()
    }

    /// Number of active frames
    #[must_use]
    pub fn depth(&self) -> usize {
        self.frames.lock().len()
    }

    fn exit(&self, id: ObjectId) {
        let mut frames = self.frames.lock();
        if let Some(pos) = frames.iter().rposition(|frame| frame.id() == id) {
            frames.remove(pos);
        }
    }
}

/// Keeps a frame on its [`CallStack`] while alive
#[derive(Debug)]
pub struct FrameGuard<'a> {
    stack: &'a CallStack,
    id: ObjectId,
}

impl Drop for FrameGuard<'_> {
    fn drop(&mut self) {
        self.stack.exit(self.id);
    }
}
