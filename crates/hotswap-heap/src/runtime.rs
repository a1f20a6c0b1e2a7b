//! Default host: one heap plus one call stack

use crate::frame::CallStack;
use crate::heap::Heap;

/// A live program: its allocation registry and its active frames
#[derive(Debug, Default)]
pub struct Runtime {
    heap: Heap,
    stack: CallStack,
}

impl Runtime {
    /// Create an empty runtime
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocation registry
    #[inline]
    #[must_use]
    pub fn heap(&self) -> &Heap {
        &self.heap
    }

    /// Active frames
    #[inline]
    #[must_use]
    pub fn stack(&self) -> &CallStack {
        &self.stack
    }
}
