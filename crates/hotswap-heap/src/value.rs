//! Values held by heap objects
//!
//! A [`Value`] is either an opaque primitive or a reference to a heap
//! [`Object`](crate::Object). References compare and hash by identity only,
//! so storing one in a mapping or set never runs user comparison logic.

use crate::object::ObjRef;
use std::fmt::{self, Debug, Display, Formatter};
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

static NEXT_OBJECT_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique object identity
///
/// Identities are allocated monotonically and never reused, so two
/// observations of the same live object always agree and two distinct
/// objects never share one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectId(u64);

impl ObjectId {
    /// Allocate the next identity
    #[inline]
    #[must_use]
    pub fn next() -> Self {
        Self(NEXT_OBJECT_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw identity number
    #[inline]
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl Display for ObjectId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A value stored in a container slot, record field or frame binding
#[derive(Clone, Default)]
pub enum Value {
    /// Absence of a value
    #[default]
    Nil,
    /// Boolean primitive
    Bool(bool),
    /// Integer primitive
    Int(i64),
    /// Float primitive (compared by bit pattern)
    Float(f64),
    /// Immutable string primitive
    Str(Arc<str>),
    /// Reference to a heap object
    Ref(ObjRef),
}

impl Value {
    /// Build a string value
    #[inline]
    #[must_use]
    pub fn str(s: impl AsRef<str>) -> Self {
        Self::Str(Arc::from(s.as_ref()))
    }

    /// The referenced object, if this is a reference
    #[inline]
    #[must_use]
    pub fn as_object(&self) -> Option<&ObjRef> {
        match self {
            Self::Ref(obj) => Some(obj),
            _ => None,
        }
    }

    /// Identity check against a live object
    #[inline]
    #[must_use]
    pub fn is(&self, obj: &ObjRef) -> bool {
        matches!(self, Self::Ref(held) if Arc::ptr_eq(held, obj))
    }

    /// Primitives carry no identity and cannot be replaced by reference
    #[inline]
    #[must_use]
    pub fn is_primitive(&self) -> bool {
        !matches!(self, Self::Ref(_))
    }

    /// Short name of the value's kind
    #[must_use]
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Nil => "nil",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Str(_) => "str",
            Self::Ref(_) => "reference",
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Nil, Self::Nil) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => a.to_bits() == b.to_bits(),
            (Self::Str(a), Self::Str(b)) => a == b,
            (Self::Ref(a), Self::Ref(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Self::Nil => {}
            Self::Bool(b) => b.hash(state),
            Self::Int(i) => i.hash(state),
            Self::Float(x) => x.to_bits().hash(state),
            Self::Str(s) => s.hash(state),
            Self::Ref(obj) => obj.id().hash(state),
        }
    }
}

impl Debug for Value {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Nil => f.write_str("nil"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(x) => write!(f, "{x:?}"),
            Self::Str(s) => write!(f, "{s:?}"),
            Self::Ref(obj) => write!(f, "<{}{}>", obj.type_name(), obj.id()),
        }
    }
}

impl From<ObjRef> for Value {
    fn from(obj: ObjRef) -> Self {
        Self::Ref(obj)
    }
}

impl From<&ObjRef> for Value {
    fn from(obj: &ObjRef) -> Self {
        Self::Ref(Arc::clone(obj))
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Self::Float(x)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::str(s)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Str(Arc::from(s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Heap;
    use proptest::prelude::*;
    use std::collections::hash_map::DefaultHasher;

    fn hash_of(value: &Value) -> u64 {
        let mut hasher = DefaultHasher::new();
        value.hash(&mut hasher);
        hasher.finish()
    }

    #[test]
    fn object_ids_are_unique_and_increasing() {
        let a = ObjectId::next();
        let b = ObjectId::next();
        assert!(b > a);
        assert_eq!(a.to_string(), format!("#{}", a.get()));
    }

    #[test]
    fn references_compare_by_identity_not_contents() {
        let heap = Heap::new();
        let a = heap.mapping([(Value::str("k"), Value::Int(1))]);
        let b = heap.mapping([(Value::str("k"), Value::Int(1))]);

        assert_eq!(Value::from(&a), Value::from(&a));
        assert_ne!(Value::from(&a), Value::from(&b));
        assert_eq!(hash_of(&Value::from(&a)), hash_of(&Value::from(&a)));
        assert!(Value::from(&a).is(&a));
        assert!(!Value::from(&a).is(&b));
    }

    #[test]
    fn primitives_compare_by_value() {
        assert_eq!(Value::str("x"), Value::from("x"));
        assert_eq!(Value::Float(f64::NAN), Value::Float(f64::NAN));
        assert_ne!(Value::Int(1), Value::Bool(true));
        assert!(Value::Int(3).is_primitive());
        assert_eq!(Value::Nil.kind_name(), "nil");
    }

    fn primitive() -> impl Strategy<Value = Value> {
        prop_oneof![
            Just(Value::Nil),
            any::<bool>().prop_map(Value::Bool),
            any::<i64>().prop_map(Value::Int),
            any::<f64>().prop_map(Value::Float),
            "[a-z]{0,8}".prop_map(Value::from),
        ]
    }

    proptest! {
        #[test]
        fn equal_values_hash_equal(a in primitive(), b in primitive()) {
            prop_assert_eq!(a.clone(), a.clone());
            if a == b {
                prop_assert_eq!(hash_of(&a), hash_of(&b));
            }
        }
    }
}
