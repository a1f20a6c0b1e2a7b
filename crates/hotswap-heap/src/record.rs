//! Records with enumerable, individually settable fields
//!
//! A heap object that is neither a mapping, a sequence nor a set takes part
//! in replacement only through the [`Record`] capability: it lists its fields
//! and accepts (or refuses) writes to them one at a time.

use crate::value::Value;
use indexmap::IndexMap;
use std::collections::HashSet;

/// Field write failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FieldError {
    /// The field exists but cannot be rebound
    #[error("field `{0}` is read-only")]
    ReadOnly(String),

    /// The record has no such field
    #[error("no field named `{0}`")]
    Unknown(String),
}

/// "Enumerate mutable fields" capability for generic records
pub trait Record: Send + Sync {
    /// Declared type of the record
    fn type_name(&self) -> &str;

    /// Snapshot of every enumerable field and its current value
    fn fields(&self) -> Vec<(String, Value)>;

    /// Rebind a single field
    ///
    /// # Errors
    /// Returns [`FieldError`] if the field is unknown or read-only.
    fn set_field(&mut self, name: &str, value: Value) -> Result<(), FieldError>;
}

/// Dynamically shaped record with named fields
///
/// Fields registered through [`DynRecord::with_read_only`] refuse writes.
#[derive(Debug, Clone)]
pub struct DynRecord {
    type_name: String,
    fields: IndexMap<String, Value>,
    read_only: HashSet<String>,
}

impl DynRecord {
    /// Create an empty record of the given type
    #[inline]
    #[must_use]
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            fields: IndexMap::new(),
            read_only: HashSet::new(),
        }
    }

    /// With a writable field
    #[must_use]
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    /// With a read-only field
    #[must_use]
    pub fn with_read_only(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        let name = name.into();
        self.read_only.insert(name.clone());
        self.fields.insert(name, value.into());
        self
    }

    /// Current value of a field
    #[inline]
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Whether a field refuses writes
    #[inline]
    #[must_use]
    pub fn is_read_only(&self, name: &str) -> bool {
        self.read_only.contains(name)
    }
}

impl Record for DynRecord {
    fn type_name(&self) -> &str {
        &self.type_name
    }

    fn fields(&self) -> Vec<(String, Value)> {
        self.fields
            .iter()
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect()
    }

    fn set_field(&mut self, name: &str, value: Value) -> Result<(), FieldError> {
        if self.read_only.contains(name) {
            return Err(FieldError::ReadOnly(name.to_string()));
        }
        match self.fields.get_mut(name) {
            Some(slot) => {
                *slot = value;
                Ok(())
            }
            None => Err(FieldError::Unknown(name.to_string())),
        }
    }
}
