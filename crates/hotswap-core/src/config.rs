//! Session configuration
//!
//! [`SessionConfig`] is plain data: build it with the `with_*` methods or
//! load it from TOML. Validation happens once, when a session is created.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Order in which active frames are seeded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameOrder {
    /// Outermost caller first
    #[default]
    OutermostFirst,
    /// Innermost call first
    InnermostFirst,
}

/// Replacement session configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SessionConfig {
    /// Number of sweep worker threads
    pub concurrency_limit: usize,
    /// Seeding order for active frames
    pub frame_order: FrameOrder,
    /// Seed the sweep from the active call stack
    pub include_frames: bool,
    /// Run the reclaimer before referrer discovery
    pub reclaim_before_discovery: bool,
    /// How long discovery waits for a busy object before skipping it
    pub lock_timeout_ms: u64,
}

impl SessionConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With concurrency limit
    #[inline]
    #[must_use]
    pub fn with_concurrency_limit(mut self, limit: usize) -> Self {
        self.concurrency_limit = limit;
        self
    }

    /// With frame order
    #[inline]
    #[must_use]
    pub fn with_frame_order(mut self, order: FrameOrder) -> Self {
        self.frame_order = order;
        self
    }

    /// With or without call-stack seeding
    #[inline]
    #[must_use]
    pub fn with_frames(mut self, include: bool) -> Self {
        self.include_frames = include;
        self
    }

    /// With or without reclaiming before discovery
    #[inline]
    #[must_use]
    pub fn with_reclaim(mut self, reclaim: bool) -> Self {
        self.reclaim_before_discovery = reclaim;
        self
    }

    /// With discovery lock timeout
    #[inline]
    #[must_use]
    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Discovery lock timeout
    #[inline]
    #[must_use]
    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }

    /// Parse from TOML
    ///
    /// Missing keys take their defaults. The result is not validated.
    ///
    /// # Errors
    /// Returns [`ConfigError::Parse`] on malformed input or unknown keys.
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(input)?)
    }

    /// Check invariants
    ///
    /// # Errors
    /// Returns [`ConfigError::InvalidConcurrency`] if the limit is below one.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.concurrency_limit < 1 {
            return Err(ConfigError::InvalidConcurrency(self.concurrency_limit));
        }
        Ok(())
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            concurrency_limit: 4,
            frame_order: FrameOrder::OutermostFirst,
            include_frames: true,
            reclaim_before_discovery: true,
            lock_timeout_ms: 50,
        }
    }
}
