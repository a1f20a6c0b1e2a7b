//! Execution-context walker

use crate::config::FrameOrder;
use hotswap_heap::{CallStack, FrameRef, Runtime};

/// Enumerates the active call stack
pub trait FrameSource: Send + Sync {
    /// Snapshot of the active frames in the requested order
    fn active_frames(&self, order: FrameOrder) -> Vec<FrameRef>;
}

impl FrameSource for CallStack {
    fn active_frames(&self, order: FrameOrder) -> Vec<FrameRef> {
        let mut frames = self.frames();
        if order == FrameOrder::InnermostFirst {
            frames.reverse();
        }
        frames
    }
}

impl FrameSource for Runtime {
    fn active_frames(&self, order: FrameOrder) -> Vec<FrameRef> {
        self.stack().active_frames(order)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hotswap_heap::{Frame, ObjectId, Value};

    #[test]
    fn order_is_configurable() {
        let runtime = Runtime::new();
        let make = |name: &str| Frame::new(name, runtime.heap().mapping([]), Vec::<(String, Value)>::new());
        let outer = make("outer");
        let inner = make("inner");
        let _g1 = runtime.stack().enter(outer.clone());
        let _g2 = runtime.stack().enter(inner.clone());

        let ids = |frames: Vec<FrameRef>| frames.iter().map(|f| f.id()).collect::<Vec<ObjectId>>();
        assert_eq!(
            ids(runtime.active_frames(FrameOrder::OutermostFirst)),
            vec![outer.id(), inner.id()]
        );
        assert_eq!(
            ids(runtime.active_frames(FrameOrder::InnermostFirst)),
            vec![inner.id(), outer.id()]
        );
    }

    #[test]
    fn empty_stack_has_no_frames() {
        assert!(CallStack::new().active_frames(FrameOrder::default()).is_empty());
    }
}
