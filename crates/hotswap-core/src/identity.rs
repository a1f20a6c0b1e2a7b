//! Identity keys for deduplication
//!
//! Provides [`IdentityKey`], a 32-byte SHA-256 digest of an object's runtime
//! identity and declared type. Deriving a key never touches the object's
//! body, so it cannot trigger user comparison logic or block on a lock.

use hotswap_heap::{Frame, ObjectId, Object, Value};
use sha2::{Digest, Sha256};
use std::fmt::{self, Debug, Display, Formatter};

/// Type name used when keying frames
const FRAME_TYPE: &str = "frame";

/// Type name used when keying the referrer lookup of a target
const DISCOVERY_TYPE: &str = "discover";

/// Deduplication key derived from (identity, type)
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct IdentityKey([u8; 32]);

impl IdentityKey {
    /// Derive a key from raw identity and type
    #[must_use]
    pub fn derive(id: ObjectId, type_name: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(id.get().to_le_bytes());
        hasher.update([0]);
        hasher.update(type_name.as_bytes());
        Self(hasher.finalize().into())
    }

    /// Key of a heap object
    #[inline]
    #[must_use]
    pub fn of_object(obj: &Object) -> Self {
        Self::derive(obj.id(), obj.type_name())
    }

    /// Key of an execution frame
    #[inline]
    #[must_use]
    pub fn of_frame(frame: &Frame) -> Self {
        Self::derive(frame.id(), FRAME_TYPE)
    }

    /// Key of the referrer lookup for `target`
    ///
    /// Distinct from [`IdentityKey::of_object`], so looking up a target's
    /// referrers never blocks a visit of the target itself.
    #[inline]
    #[must_use]
    pub fn of_discovery(target: &Object) -> Self {
        Self::derive(target.id(), DISCOVERY_TYPE)
    }

    /// Key of a value; primitives have no identity
    #[inline]
    #[must_use]
    pub fn of_value(value: &Value) -> Option<Self> {
        value.as_object().map(|obj| Self::of_object(obj))
    }

    /// Raw digest bytes
    #[inline]
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Short string representation (first 16 hex chars)
    #[inline]
    #[must_use]
    pub fn short(&self) -> String {
        hex::encode(&self.0[..8])
    }
}

impl Display for IdentityKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl Debug for IdentityKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "IdentityKey({})", self.short())
    }
}
