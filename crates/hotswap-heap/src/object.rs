//! Heap objects
//!
//! An [`Object`] pairs a stable identity with a lock-protected [`Body`].
//! Objects are shared as [`ObjRef`] (`Arc<Object>`) and may be mutated in
//! place by any holder; the body lock is the only synchronisation.

use crate::record::{FieldError, Record};
use crate::value::{ObjectId, Value};
use indexmap::{IndexMap, IndexSet};
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::any::Any;
use std::fmt::{self, Debug, Formatter};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Shared handle to a heap object
pub type ObjRef = Arc<Object>;

/// Shape of an object body
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BodyKind {
    /// Key to value mapping
    Mapping,
    /// Index to value sequence
    Sequence,
    /// Unordered set of members
    Set,
    /// Record with named fields
    Record,
    /// Native payload with no enumerable structure
    Opaque,
}

/// Contents of a heap object
pub enum Body {
    /// Keys are unique; iteration order is insertion order but carries no meaning
    Mapping(IndexMap<Value, Value>),
    /// Ordered elements
    Sequence(Vec<Value>),
    /// Members de-duplicated by [`Value`] equality
    Set(IndexSet<Value>),
    /// Generic record
    Record(Box<dyn Record>),
    /// Native payload
    Opaque(Arc<dyn Any + Send + Sync>),
}

impl Body {
    /// Shape of this body
    #[must_use]
    pub fn kind(&self) -> BodyKind {
        match self {
            Self::Mapping(_) => BodyKind::Mapping,
            Self::Sequence(_) => BodyKind::Sequence,
            Self::Set(_) => BodyKind::Set,
            Self::Record(_) => BodyKind::Record,
            Self::Opaque(_) => BodyKind::Opaque,
        }
    }

    /// Whether the body directly holds a reference to `target`
    ///
    /// Mapping keys, mapping values, elements, members and record fields all
    /// count. Nested objects are not inspected.
    #[must_use]
    pub fn holds(&self, target: &ObjRef) -> bool {
        match self {
            Self::Mapping(map) => map.iter().any(|(k, v)| k.is(target) || v.is(target)),
            Self::Sequence(items) => items.iter().any(|v| v.is(target)),
            Self::Set(members) => members.contains(&Value::Ref(Arc::clone(target))),
            Self::Record(record) => record.fields().iter().any(|(_, v)| v.is(target)),
            Self::Opaque(_) => false,
        }
    }

    /// Every object this body directly references
    #[must_use]
    pub fn references(&self) -> Vec<ObjRef> {
        fn refs<'a>(values: impl Iterator<Item = &'a Value>) -> Vec<ObjRef> {
            values.filter_map(Value::as_object).cloned().collect()
        }

        match self {
            Self::Mapping(map) => refs(map.iter().flat_map(|(k, v)| [k, v])),
            Self::Sequence(items) => refs(items.iter()),
            Self::Set(members) => refs(members.iter()),
            Self::Record(record) => record
                .fields()
                .into_iter()
                .filter_map(|(_, v)| v.as_object().cloned())
                .collect(),
            Self::Opaque(_) => Vec::new(),
        }
    }
}

impl Debug for Body {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Mapping(map) => f.debug_map().entries(map.iter()).finish(),
            Self::Sequence(items) => f.debug_list().entries(items.iter()).finish(),
            Self::Set(members) => f.debug_set().entries(members.iter()).finish(),
            Self::Record(record) => {
                let mut s = f.debug_struct(record.type_name());
                for (name, value) in record.fields() {
                    s.field(&name, &value);
                }
                s.finish()
            }
            Self::Opaque(_) => f.write_str("<opaque>"),
        }
    }
}

/// In-place mutation refused because the object is frozen
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("object {id} is frozen")]
pub struct Frozen {
    /// The frozen object
    pub id: ObjectId,
}

/// A live heap object
pub struct Object {
    id: ObjectId,
    type_name: Arc<str>,
    frozen: AtomicBool,
    body: RwLock<Body>,
}

impl Object {
    /// Wrap a body in a fresh identity
    ///
    /// Prefer the allocation helpers on [`Heap`](crate::Heap), which also
    /// register the object for referrer discovery.
    #[must_use]
    pub fn new(type_name: impl Into<Arc<str>>, body: Body) -> ObjRef {
        Arc::new(Self {
            id: ObjectId::next(),
            type_name: type_name.into(),
            frozen: AtomicBool::new(false),
            body: RwLock::new(body),
        })
    }

    /// Runtime identity
    #[inline]
    #[must_use]
    pub fn id(&self) -> ObjectId {
        self.id
    }

    /// Declared type
    #[inline]
    #[must_use]
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Shape of the body
    #[must_use]
    pub fn kind(&self) -> BodyKind {
        self.body.read().kind()
    }

    /// Refuse every later in-place mutation
    #[inline]
    pub fn freeze(&self) {
        self.frozen.store(true, Ordering::Release);
    }

    /// Whether the object refuses in-place mutation
    #[inline]
    #[must_use]
    pub fn is_frozen(&self) -> bool {
        self.frozen.load(Ordering::Acquire)
    }

    /// Shared access to the body
    #[inline]
    pub fn read(&self) -> RwLockReadGuard<'_, Body> {
        self.body.read()
    }

    /// Shared access to the body, giving up after `timeout`
    #[inline]
    pub fn try_read_for(&self, timeout: Duration) -> Option<RwLockReadGuard<'_, Body>> {
        self.body.try_read_for(timeout)
    }

    /// Exclusive access to the body
    ///
    /// # Errors
    /// Returns [`Frozen`] if the object has been frozen.
    pub fn write(&self) -> Result<RwLockWriteGuard<'_, Body>, Frozen> {
        if self.is_frozen() {
            return Err(Frozen { id: self.id });
        }
        Ok(self.body.write())
    }

    /// Whether the body directly holds `target`
    #[must_use]
    pub fn holds(&self, target: &ObjRef) -> bool {
        self.read().holds(target)
    }

    /// Like [`Object::holds`], but `None` if the lock is not free within `timeout`
    #[must_use]
    pub fn try_holds(&self, target: &ObjRef, timeout: Duration) -> Option<bool> {
        self.try_read_for(timeout).map(|body| body.holds(target))
    }

    /// Number of entries, elements, members or fields
    #[must_use]
    pub fn len(&self) -> usize {
        match &*self.read() {
            Body::Mapping(map) => map.len(),
            Body::Sequence(items) => items.len(),
            Body::Set(members) => members.len(),
            Body::Record(record) => record.fields().len(),
            Body::Opaque(_) => 0,
        }
    }

    /// Whether [`Object::len`] is zero
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Mapping lookup
    #[must_use]
    pub fn get(&self, key: &Value) -> Option<Value> {
        match &*self.read() {
            Body::Mapping(map) => map.get(key).cloned(),
            _ => None,
        }
    }

    /// Sequence element
    #[must_use]
    pub fn at(&self, index: usize) -> Option<Value> {
        match &*self.read() {
            Body::Sequence(items) => items.get(index).cloned(),
            _ => None,
        }
    }

    /// Set membership, or key presence for a mapping
    #[must_use]
    pub fn contains(&self, value: &Value) -> bool {
        match &*self.read() {
            Body::Set(members) => members.contains(value),
            Body::Mapping(map) => map.contains_key(value),
            _ => false,
        }
    }

    /// Record field
    #[must_use]
    pub fn field(&self, name: &str) -> Option<Value> {
        match &*self.read() {
            Body::Record(record) => record
                .fields()
                .into_iter()
                .find_map(|(field, value)| (field == name).then_some(value)),
            _ => None,
        }
    }

    /// Insert into a mapping, returning the previous value
    ///
    /// # Errors
    /// Returns [`Frozen`] if the object is frozen. Other shapes ignore the call.
    pub fn insert(&self, key: impl Into<Value>, value: impl Into<Value>) -> Result<Option<Value>, Frozen> {
        match &mut *self.write()? {
            Body::Mapping(map) => Ok(map.insert(key.into(), value.into())),
            _ => Ok(None),
        }
    }

    /// Add a set member
    ///
    /// # Errors
    /// Returns [`Frozen`] if the object is frozen. Other shapes ignore the call.
    pub fn add(&self, member: impl Into<Value>) -> Result<bool, Frozen> {
        match &mut *self.write()? {
            Body::Set(members) => Ok(members.insert(member.into())),
            _ => Ok(false),
        }
    }

    /// Append to a sequence
    ///
    /// # Errors
    /// Returns [`Frozen`] if the object is frozen. Other shapes ignore the call.
    pub fn push(&self, value: impl Into<Value>) -> Result<(), Frozen> {
        if let Body::Sequence(items) = &mut *self.write()? {
            items.push(value.into());
        }
        Ok(())
    }

    /// Rebind a record field
    ///
    /// # Errors
    /// Returns [`FieldError::ReadOnly`] if the object is frozen or the field
    /// refuses writes, [`FieldError::Unknown`] if there is no such field.
    pub fn set_field(&self, name: &str, value: impl Into<Value>) -> Result<(), FieldError> {
        let mut body = self
            .write()
            .map_err(|_| FieldError::ReadOnly(name.to_string()))?;
        match &mut *body {
            Body::Record(record) => record.set_field(name, value.into()),
            _ => Err(FieldError::Unknown(name.to_string())),
        }
    }
}

impl Debug for Object {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Object")
            .field("id", &self.id)
            .field("type_name", &self.type_name)
            .field("frozen", &self.is_frozen())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::DynRecord;
    use crate::Heap;

    #[test]
    fn holds_sees_keys_values_elements_and_fields() {
        let heap = Heap::new();
        let target = heap.sequence([]);

        let as_value = heap.mapping([(Value::str("a"), Value::from(&target))]);
        let as_key = heap.mapping([(Value::from(&target), Value::Nil)]);
        let as_element = heap.sequence([Value::Int(1), Value::from(&target)]);
        let as_member = heap.set([Value::from(&target)]);
        let as_field = heap.record(DynRecord::new("Holder").with_field("dep", &target));
        let unrelated = heap.sequence([Value::Int(1)]);

        for holder in [&as_value, &as_key, &as_element, &as_member, &as_field] {
            assert!(holder.holds(&target), "{holder:?} should hold the target");
        }
        assert!(!unrelated.holds(&target));
    }

    #[test]
    fn references_lists_direct_children_only() {
        let heap = Heap::new();
        let leaf = heap.sequence([]);
        let middle = heap.sequence([Value::from(&leaf)]);
        let top = heap.mapping([(Value::str("m"), Value::from(&middle))]);

        let refs = top.read().references();
        assert_eq!(refs.len(), 1);
        assert!(Arc::ptr_eq(&refs[0], &middle));
    }

    #[test]
    fn frozen_objects_refuse_writes_but_stay_readable() {
        let heap = Heap::new();
        let tuple = heap.sequence([Value::Int(1)]);
        tuple.freeze();

        assert_eq!(tuple.push(Value::Int(2)), Err(Frozen { id: tuple.id() }));
        assert_eq!(tuple.at(0), Some(Value::Int(1)));
        assert_eq!(tuple.len(), 1);
    }

    #[test]
    fn accessors_match_body_shape() {
        let heap = Heap::new();
        let record = heap.record(DynRecord::new("Cfg").with_field("port", Value::Int(1)));
        record.set_field("port", Value::Int(2)).unwrap();
        assert_eq!(record.field("port"), Some(Value::Int(2)));
        assert_eq!(record.kind(), BodyKind::Record);
        assert_eq!(record.type_name(), "Cfg");

        let map = heap.mapping([]);
        assert_eq!(map.insert("k", Value::Int(1)).unwrap(), None);
        assert!(map.contains(&Value::str("k")));
        assert_eq!(map.get(&Value::str("k")), Some(Value::Int(1)));
    }
}
