//! Optional sweep observer
//!
//! Every rewrite and every swallowed failure is already logged through
//! `tracing`; an observer additionally receives them as values. Callbacks
//! run on worker threads, concurrently.

use crate::error::MutationError;
use crate::mutator::Rewrite;

/// Receives sweep events as they happen
pub trait SweepObserver: Send + Sync {
    /// A slot now holds the substitute
    fn on_rewrite(&self, rewrite: &Rewrite) {
        let _ = rewrite;
    }

    /// A slot refused the write; the sweep carried on
    fn on_failure(&self, failure: &MutationError) {
        let _ = failure;
    }
}
