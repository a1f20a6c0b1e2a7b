//! Container classification
//!
//! Every value met during a sweep is classified into exactly one
//! [`ContainerKind`]. For heap objects the classifier also hands out a
//! [`Container`] view over the locked body, which is what the mutator edits.

use hotswap_heap::{Body, BodyKind, Object, Record, Value};
use indexmap::{IndexMap, IndexSet};
use serde::Serialize;
use std::fmt::{self, Display, Formatter};

/// Container classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ContainerKind {
    /// Key to value mapping
    Mapping,
    /// Index to value sequence
    Sequence,
    /// Unordered set
    Set,
    /// Record with enumerable named fields
    Record,
    /// Active call with global and local scopes
    Frame,
    /// No enumerable structure; terminal
    Opaque,
}

impl ContainerKind {
    /// Classify a value without locking anything but its own body
    #[must_use]
    pub fn of_value(value: &Value) -> Self {
        match value {
            Value::Ref(obj) => Self::of_object(obj),
            _ => Self::Opaque,
        }
    }

    /// Classify a heap object
    #[must_use]
    pub fn of_object(obj: &Object) -> Self {
        obj.kind().into()
    }

    /// Whether the kind can hold references
    #[inline]
    #[must_use]
    pub fn is_traversable(self) -> bool {
        !matches!(self, Self::Opaque)
    }

    /// Lower-case name
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Mapping => "mapping",
            Self::Sequence => "sequence",
            Self::Set => "set",
            Self::Record => "record",
            Self::Frame => "frame",
            Self::Opaque => "opaque",
        }
    }
}

impl From<BodyKind> for ContainerKind {
    fn from(kind: BodyKind) -> Self {
        match kind {
            BodyKind::Mapping => Self::Mapping,
            BodyKind::Sequence => Self::Sequence,
            BodyKind::Set => Self::Set,
            BodyKind::Record => Self::Record,
            BodyKind::Opaque => Self::Opaque,
        }
    }
}

impl Display for ContainerKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Mutable view over a classified object body
pub enum Container<'a> {
    /// Mapping entries
    Mapping(&'a mut IndexMap<Value, Value>),
    /// Sequence elements
    Sequence(&'a mut Vec<Value>),
    /// Set members
    Set(&'a mut IndexSet<Value>),
    /// Record fields
    Record(&'a mut (dyn Record + 'static)),
    /// Nothing to see
    Opaque,
}

impl<'a> Container<'a> {
    /// Classify a body held under its write lock
    pub fn classify(body: &'a mut Body) -> Self {
        match body {
            Body::Mapping(map) => Self::Mapping(map),
            Body::Sequence(items) => Self::Sequence(items),
            Body::Set(members) => Self::Set(members),
            Body::Record(record) => Self::Record(record.as_mut()),
            Body::Opaque(_) => Self::Opaque,
        }
    }

    /// Classification of this view
    #[must_use]
    pub fn kind(&self) -> ContainerKind {
        match self {
            Self::Mapping(_) => ContainerKind::Mapping,
            Self::Sequence(_) => ContainerKind::Sequence,
            Self::Set(_) => ContainerKind::Set,
            Self::Record(_) => ContainerKind::Record,
            Self::Opaque => ContainerKind::Opaque,
        }
    }
}
