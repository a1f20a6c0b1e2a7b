//! Referrer discovery
//!
//! A [`ReferrerSource`] answers "which objects directly hold this reference
//! right now?". Answers are best-effort snapshots: objects whose lock stays
//! busy are skipped and reported, and the sweep proceeds with what was found.
//!
//! Two strategies are provided:
//! - [`Heap`]: scan every live object in the allocation registry
//! - [`RootSet`]: walk everything reachable from explicitly registered roots
//!
//! Frames are never returned; they are seeded separately.

use crate::error::DiscoveryError;
use hotswap_heap::{Heap, ObjRef, ObjectId, Runtime};
use parking_lot::Mutex;
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

/// Result of one discovery pass
#[derive(Debug, Default)]
pub struct Discovery {
    /// Objects holding at least one direct reference to the target
    pub referrers: Vec<ObjRef>,
    /// Objects that could not be inspected
    pub skipped: Vec<DiscoveryError>,
}

/// Reverse-reference facility
pub trait ReferrerSource: Send + Sync {
    /// Reclaim unreachable objects before discovery
    ///
    /// Returns how many were reclaimed.
    fn reclaim(&self) -> usize {
        0
    }

    /// Snapshot of the current direct referrers of `target`
    fn referrers(&self, target: &ObjRef, lock_timeout: Duration) -> Discovery;
}

impl ReferrerSource for Heap {
    fn reclaim(&self) -> usize {
        Heap::reclaim(self)
    }

    fn referrers(&self, target: &ObjRef, lock_timeout: Duration) -> Discovery {
        let mut found = Discovery::default();
        for obj in self.live_objects() {
            match obj.try_holds(target, lock_timeout) {
                Some(true) => found.referrers.push(obj),
                Some(false) => {}
                None => found.skipped.push(DiscoveryError::LockTimeout { id: obj.id() }),
            }
        }
        found
    }
}

impl ReferrerSource for Runtime {
    fn reclaim(&self) -> usize {
        self.heap().reclaim()
    }

    fn referrers(&self, target: &ObjRef, lock_timeout: Duration) -> Discovery {
        ReferrerSource::referrers(self.heap(), target, lock_timeout)
    }
}

/// Explicitly registered roots
///
/// Discovery walks the graph reachable from the roots breadth-first and
/// reports every visited object that directly holds the target.
#[derive(Debug, Default)]
pub struct RootSet {
    roots: Mutex<Vec<ObjRef>>,
}

impl RootSet {
    /// Create an empty root set
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a root
    pub fn register(&self, root: ObjRef) {
        let mut roots = self.roots.lock();
        if !roots.iter().any(|r| Arc::ptr_eq(r, &root)) {
            roots.push(root);
        }
    }

    /// Unregister a root; returns whether it was registered
    pub fn unregister(&self, root: &ObjRef) -> bool {
        let mut roots = self.roots.lock();
        let before = roots.len();
        roots.retain(|r| !Arc::ptr_eq(r, root));
        roots.len() != before
    }

    /// Number of registered roots
    #[must_use]
    pub fn len(&self) -> usize {
        self.roots.lock().len()
    }

    /// Whether no roots are registered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.roots.lock().is_empty()
    }
}

impl ReferrerSource for RootSet {
    fn referrers(&self, target: &ObjRef, lock_timeout: Duration) -> Discovery {
        let mut found = Discovery::default();
        let mut seen: HashSet<ObjectId> = HashSet::new();
        let mut queue: VecDeque<ObjRef> = self.roots.lock().iter().cloned().collect();

        while let Some(obj) = queue.pop_front() {
            if !seen.insert(obj.id()) {
                continue;
            }
            let Some(body) = obj.try_read_for(lock_timeout) else {
                found.skipped.push(DiscoveryError::LockTimeout { id: obj.id() });
                continue;
            };
            let holds = body.holds(target);
            queue.extend(
                body.references()
                    .into_iter()
                    .filter(|child| !Arc::ptr_eq(child, target)),
            );
            drop(body);
            if holds {
                found.referrers.push(obj);
            }
        }
        found
    }
}
