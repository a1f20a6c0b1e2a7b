//! Error types for Hotswap Core
//!
//! Provides error handling for:
//! - Configuration rejected before a session starts
//! - Target/substitute values that cannot be replaced by reference
//! - Per-slot mutation failures (always swallowed by the sweep)
//! - Partial referrer discovery

use crate::classify::ContainerKind;
use hotswap_heap::{FieldError, ObjectId};

/// Session-level failures, raised before any mutation begins
#[derive(Debug, thiserror::Error)]
pub enum ReplaceError {
    /// Invalid session configuration
    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigError),

    /// Target or substitute is not a referenceable value
    #[error("type constraint violated: {role} must be a reference, found {found}")]
    TypeConstraint {
        /// `"target"` or `"substitute"`
        role: &'static str,
        /// Kind of the value supplied
        found: &'static str,
    },

    /// No sweep worker could be started
    #[error("failed to start sweep workers: {0}")]
    WorkerSpawn(#[source] std::io::Error),
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Concurrency limit below one
    #[error("concurrency limit must be at least 1, got {0}")]
    InvalidConcurrency(usize),

    /// Configuration file could not be parsed
    #[error("invalid configuration: {0}")]
    Parse(#[from] toml::de::Error),
}

/// A single slot could not be rewritten
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MutationError {
    /// The holding container refuses in-place mutation
    #[error("{kind} {holder} is frozen")]
    Frozen {
        /// Holding object
        holder: ObjectId,
        /// Its classification
        kind: ContainerKind,
    },

    /// A record refused the field write
    #[error("record {holder}: {source}")]
    Field {
        /// Holding record
        holder: ObjectId,
        /// Reason given by the record
        #[source]
        source: FieldError,
    },
}

impl MutationError {
    /// Object whose slot could not be rewritten
    #[inline]
    #[must_use]
    pub fn holder(&self) -> ObjectId {
        match self {
            Self::Frozen { holder, .. } | Self::Field { holder, .. } => *holder,
        }
    }
}

/// Referrer discovery could not inspect an object
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DiscoveryError {
    /// The object's lock stayed busy past the configured timeout
    #[error("object {id} stayed locked during discovery; skipped")]
    LockTimeout {
        /// Skipped object
        id: ObjectId,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mutation_errors_name_their_holder() {
        let id = ObjectId::next();
        let frozen = MutationError::Frozen {
            holder: id,
            kind: ContainerKind::Sequence,
        };
        let field = MutationError::Field {
            holder: id,
            source: FieldError::ReadOnly("config".into()),
        };
        assert_eq!(frozen.holder(), id);
        assert_eq!(field.holder(), id);
        assert_eq!(frozen.to_string(), format!("sequence {id} is frozen"));
        assert!(field.to_string().contains("read-only"));
    }

    #[test]
    fn configuration_errors_convert_into_replace_errors() {
        let err: ReplaceError = ConfigError::InvalidConcurrency(0).into();
        assert!(matches!(
            err,
            ReplaceError::Configuration(ConfigError::InvalidConcurrency(0))
        ));
        assert_eq!(
            err.to_string(),
            "configuration error: concurrency limit must be at least 1, got 0"
        );
    }
}
