//! Hotswap Core - replace a live object everywhere it is referenced
//!
//! A session sweeps a live object graph and rewrites, in place, every slot
//! that holds the target so that it holds the substitute instead:
//! - [`IdentityKey`]s deduplicate traversal by object identity
//! - the [`Mutator`] rewrites mappings, sequences, sets, records and frame locals
//! - a [`ReferrerSource`] finds the direct referrers of the target
//! - a [`FrameSource`] exposes the active call stack
//! - the [`Scheduler`] fans work out over a bounded worker pool until fixpoint
//! - a [`Session`] ties these together and returns a [`SweepReport`]
//!
//! The sweep is best effort: slots that refuse the write are skipped and
//! counted, never propagated.
//!
//! # Example
//!
//! ```rust
//! use hotswap_core::run;
//! use hotswap_heap::{Runtime, Value};
//!
//! let runtime = Runtime::new();
//! let target = runtime.heap().mapping([(Value::str("old"), Value::str("example"))]);
//! let substitute = runtime.heap().mapping([(Value::str("new_key"), Value::str("new_value"))]);
//! let shared = runtime.heap().sequence([Value::str("shared_item"), Value::from(&target)]);
//!
//! let report = run(&runtime, &Value::from(&target), &Value::from(&substitute), 4).unwrap();
//!
//! assert!(shared.at(1).unwrap().is(&substitute));
//! assert_eq!(report.slots_rewritten, 1);
//! ```

pub mod classify;
pub mod config;
pub mod discovery;
pub mod error;
pub mod identity;
pub mod mutator;
pub mod observer;
pub mod scheduler;
pub mod session;
pub mod walker;

pub use classify::{Container, ContainerKind};
pub use config::{FrameOrder, SessionConfig};
pub use discovery::{Discovery, ReferrerSource, RootSet};
pub use error::{ConfigError, DiscoveryError, MutationError, ReplaceError};
pub use identity::IdentityKey;
pub use mutator::{Mutator, PassSummary, Rewrite, RewriteOutcome, Slot};
pub use observer::SweepObserver;
pub use scheduler::{Scheduler, SchedulerStats, Submitter, WorkItem, WorkState};
pub use session::{run, Session, SessionId, SweepReport};
pub use walker::FrameSource;

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for running replacement sessions
    pub use crate::{
        run, FrameOrder, FrameSource, ReferrerSource, ReplaceError, RootSet, Session,
        SessionConfig, SweepObserver, SweepReport,
    };
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
