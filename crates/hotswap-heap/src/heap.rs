//! Allocation registry
//!
//! The [`Heap`] remembers every object it allocated through a weak
//! reference. It never keeps an object alive; it exists so that the live
//! object set can be scanned for holders of a given reference.

use crate::object::{Body, ObjRef, Object};
use crate::record::Record;
use crate::value::{ObjectId, Value};
use dashmap::DashMap;
use indexmap::{IndexMap, IndexSet};
use std::any::Any;
use std::sync::{Arc, Weak};

/// Registry of allocated objects
#[derive(Debug, Default)]
pub struct Heap {
    objects: DashMap<ObjectId, Weak<Object>>,
}

impl Heap {
    /// Create an empty heap
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate and register an object
    pub fn alloc(&self, type_name: impl Into<Arc<str>>, body: Body) -> ObjRef {
        let obj = Object::new(type_name, body);
        self.objects.insert(obj.id(), Arc::downgrade(&obj));
        obj
    }

    /// Allocate a mapping
    pub fn mapping(&self, entries: impl IntoIterator<Item = (Value, Value)>) -> ObjRef {
        self.alloc("mapping", Body::Mapping(entries.into_iter().collect::<IndexMap<_, _>>()))
    }

    /// Allocate a sequence
    pub fn sequence(&self, items: impl IntoIterator<Item = Value>) -> ObjRef {
        self.alloc("sequence", Body::Sequence(items.into_iter().collect()))
    }

    /// Allocate a set
    pub fn set(&self, members: impl IntoIterator<Item = Value>) -> ObjRef {
        self.alloc("set", Body::Set(members.into_iter().collect::<IndexSet<_>>()))
    }

    /// Allocate a record; its declared type becomes the object's type name
    pub fn record<R: Record + 'static>(&self, record: R) -> ObjRef {
        let type_name: Arc<str> = Arc::from(record.type_name());
        self.alloc(type_name, Body::Record(Box::new(record)))
    }

    /// Allocate an opaque native payload
    pub fn opaque<T: Any + Send + Sync>(&self, type_name: impl Into<Arc<str>>, payload: T) -> ObjRef {
        self.alloc(type_name, Body::Opaque(Arc::new(payload)))
    }

    /// Drop registry entries whose objects are gone
    ///
    /// Returns the number of entries pruned.
    pub fn reclaim(&self) -> usize {
        let before = self.objects.len();
        self.objects.retain(|_, obj| obj.strong_count() > 0);
        let pruned = before.saturating_sub(self.objects.len());
        if pruned > 0 {
            tracing::trace!(pruned, "reclaimed dead heap entries");
        }
        pruned
    }

    /// Snapshot of the live objects, ordered by allocation
    #[must_use]
    pub fn live_objects(&self) -> Vec<ObjRef> {
        let mut live: Vec<ObjRef> = self
            .objects
            .iter()
            .filter_map(|entry| entry.value().upgrade())
            .collect();
        live.sort_by_key(|obj| obj.id());
        live
    }

    /// Look up a live object by identity
    #[must_use]
    pub fn get(&self, id: ObjectId) -> Option<ObjRef> {
        self.objects.get(&id).and_then(|entry| entry.value().upgrade())
    }

    /// Number of registry entries, including ones not yet reclaimed
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// Whether the registry is empty
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}
