//! Hotswap Heap - object model for live, shared object graphs
//!
//! Provides the host side of reference replacement:
//! - [`Value`]s whose references compare by identity
//! - [`Object`]s with lock-protected mapping, sequence, set, record or opaque bodies
//! - the [`Record`] capability for generic field enumeration
//! - the [`Heap`] allocation registry used for referrer discovery
//! - [`Frame`]s and the [`CallStack`] of active calls
//!
//! # Example
//!
//! ```rust
//! use hotswap_heap::{Heap, Value};
//!
//! let heap = Heap::new();
//! let target = heap.mapping([(Value::str("old"), Value::str("example"))]);
//! let shared = heap.sequence([Value::str("shared_item"), Value::from(&target)]);
//!
//! assert!(shared.holds(&target));
//! ```

pub mod frame;
pub mod heap;
pub mod object;
pub mod record;
pub mod runtime;
pub mod value;

pub use frame::{CallStack, Frame, FrameGuard, FrameRef, LocalBindings};
pub use heap::Heap;
pub use object::{Body, BodyKind, Frozen, ObjRef, Object};
pub use record::{DynRecord, FieldError, Record};
pub use runtime::Runtime;
pub use value::{ObjectId, Value};
