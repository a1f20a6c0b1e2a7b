//! Traversal scheduler
//!
//! A bounded pool of scoped worker threads plus a shared visited set:
//! - [`Submitter::schedule`] checks-and-inserts the item's [`IdentityKey`]
//!   under one lock and only enqueues on a fresh insert
//! - a pending counter tracks every enqueued item until it has run, so
//!   [`Scheduler::run`] returns only at the fixpoint, including work
//!   scheduled by work that was already running
//! - a panicking item is caught and counted; it still completes
//!
//! Per-item lifecycle is [`WorkState`]: `Pending` then either
//! `DeduplicatedSkip`, or `Submitted`, `Running`, `Completed`.

use crate::identity::IdentityKey;
use crossbeam::channel::{self, Receiver, Sender};
use hotswap_heap::{FrameRef, ObjRef, ObjectId};
use parking_lot::{Condvar, Mutex};
use serde::Serialize;
use std::collections::HashSet;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;

/// A unit of scheduled traversal
#[derive(Debug, Clone)]
pub enum WorkItem {
    /// Find the referrers of the target
    ///
    /// Keyed apart from a visit of the same object, so a target that holds
    /// itself is still visited when discovery reports it.
    Discover(ObjRef),
    /// Mutate one heap object and fan out to its members
    Visit(ObjRef),
    /// Mutate the locals of one active frame
    Frame(FrameRef),
}

impl WorkItem {
    /// Deduplication key of the item's primary argument
    #[must_use]
    pub fn key(&self) -> IdentityKey {
        match self {
            Self::Discover(target) => IdentityKey::of_discovery(target),
            Self::Visit(obj) => IdentityKey::of_object(obj),
            Self::Frame(frame) => IdentityKey::of_frame(frame),
        }
    }

    /// Identity of the primary argument
    #[must_use]
    pub fn id(&self) -> ObjectId {
        match self {
            Self::Discover(obj) | Self::Visit(obj) => obj.id(),
            Self::Frame(frame) => frame.id(),
        }
    }

    /// Short name for logs
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Discover(_) => "discover",
            Self::Visit(_) => "visit",
            Self::Frame(_) => "frame",
        }
    }
}

/// Lifecycle of a work item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkState {
    /// Created, not yet checked against the visited set
    Pending,
    /// Key already visited; dropped
    DeduplicatedSkip,
    /// Enqueued to the pool
    Submitted,
    /// Picked up by a worker
    Running,
    /// Finished, successfully or not
    Completed,
}

impl WorkState {
    /// Whether no further transition is possible
    #[inline]
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::DeduplicatedSkip | Self::Completed)
    }
}

/// Counters of one scheduler run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SchedulerStats {
    /// Items submitted to the pool
    pub scheduled: usize,
    /// Items dropped as already visited
    pub deduplicated: usize,
    /// Items that reached `Completed`
    pub completed: usize,
    /// Items whose execution panicked
    pub panicked: usize,
}

enum Message {
    Run(WorkItem),
    Shutdown,
}

/// Handle used to submit work, from the seeding thread or from a worker
pub struct Submitter<'s> {
    scheduler: &'s Scheduler,
    queue: Sender<Message>,
}

impl Submitter<'_> {
    /// Submit an item unless its key was already visited
    ///
    /// Returns whether the item was enqueued.
    pub fn schedule(&self, item: WorkItem) -> bool {
        let key = item.key();
        tracing::trace!(item = item.label(), id = %item.id(), state = ?WorkState::Pending);
        if !self.scheduler.mark_visited(key) {
            self.scheduler.deduplicated.fetch_add(1, Ordering::Relaxed);
            tracing::trace!(item = item.label(), id = %item.id(), state = ?WorkState::DeduplicatedSkip);
            return false;
        }

        *self.scheduler.pending.lock() += 1;
        tracing::trace!(item = item.label(), id = %item.id(), state = ?WorkState::Submitted);
        if self.queue.send(Message::Run(item)).is_err() {
            // pool already gone; the item can never run
            self.scheduler.finish_one();
            return false;
        }
        self.scheduler.scheduled.fetch_add(1, Ordering::Relaxed);
        true
    }
}

/// Bounded worker pool with a shared visited set
#[derive(Debug)]
pub struct Scheduler {
    workers: usize,
    visited: Mutex<HashSet<IdentityKey>>,
    pending: Mutex<usize>,
    settled: Condvar,
    scheduled: AtomicUsize,
    deduplicated: AtomicUsize,
    completed: AtomicUsize,
    panicked: AtomicUsize,
}

impl Scheduler {
    /// Create a scheduler for `workers` threads (at least one)
    #[must_use]
    pub fn new(workers: usize) -> Self {
        Self {
            workers: workers.max(1),
            visited: Mutex::new(HashSet::new()),
            pending: Mutex::new(0),
            settled: Condvar::new(),
            scheduled: AtomicUsize::new(0),
            deduplicated: AtomicUsize::new(0),
            completed: AtomicUsize::new(0),
            panicked: AtomicUsize::new(0),
        }
    }

    /// Configured pool size
    #[inline]
    #[must_use]
    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Atomically check-and-insert into the visited set
    ///
    /// Returns `true` on a fresh insert.
    pub fn mark_visited(&self, key: IdentityKey) -> bool {
        self.visited.lock().insert(key)
    }

    /// Number of distinct keys visited so far
    #[must_use]
    pub fn visited_len(&self) -> usize {
        self.visited.lock().len()
    }

    /// Counter snapshot
    #[must_use]
    pub fn stats(&self) -> SchedulerStats {
        SchedulerStats {
            scheduled: self.scheduled.load(Ordering::Relaxed),
            deduplicated: self.deduplicated.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            panicked: self.panicked.load(Ordering::Relaxed),
        }
    }

    /// Start the pool, seed it, and block until all work has drained
    ///
    /// `seed` runs on the calling thread once the workers are up. `execute`
    /// runs on the workers and may schedule more work through the
    /// [`Submitter`] it is handed. The pool is shut down and joined before
    /// this returns.
    ///
    /// # Panics
    /// Re-raises a panic from `seed` once the pool has been shut down.
    ///
    /// # Errors
    /// Returns the spawn error if not a single worker could be started.
    /// If only some fail, the run continues on the ones that started.
    pub fn run<S, E>(&self, seed: S, execute: E) -> io::Result<()>
    where
        S: FnOnce(&Submitter<'_>),
        E: Fn(WorkItem, &Submitter<'_>) + Sync,
    {
        let (tx, rx) = channel::unbounded::<Message>();
        let execute = &execute;

        thread::scope(|scope| {
            let mut started = 0;
            for index in 0..self.workers {
                let worker_rx = rx.clone();
                let submitter = Submitter {
                    scheduler: self,
                    queue: tx.clone(),
                };
                let spawned = thread::Builder::new()
                    .name(format!("hotswap-worker-{index}"))
                    .spawn_scoped(scope, move || self.work(&worker_rx, &submitter, execute));
                match spawned {
                    Ok(_) => started += 1,
                    Err(err) if started > 0 => {
                        tracing::warn!("Started {started} of {} workers: {err}", self.workers);
                        break;
                    }
                    Err(err) => return Err(err),
                }
            }
            tracing::debug!("Worker pool up with {started} threads");

            let seeded = panic::catch_unwind(AssertUnwindSafe(|| {
                seed(&Submitter {
                    scheduler: self,
                    queue: tx.clone(),
                });
            }));
            if seeded.is_ok() {
                self.drain();
            }

            // workers hold senders, so the channel never disconnects on its own
            for _ in 0..started {
                let _ = tx.send(Message::Shutdown);
            }
            if let Err(payload) = seeded {
                tracing::warn!("Seeding panicked; worker pool shut down");
                panic::resume_unwind(payload);
            }
            Ok(())
        })
    }

    /// Block until no item is pending or running
    pub fn drain(&self) {
        let mut pending = self.pending.lock();
        while *pending > 0 {
            self.settled.wait(&mut pending);
        }
    }

    fn finish_one(&self) {
        let mut pending = self.pending.lock();
        *pending = pending.saturating_sub(1);
        if *pending == 0 {
            self.settled.notify_all();
        }
    }

    fn work<E>(&self, queue: &Receiver<Message>, submitter: &Submitter<'_>, execute: &E)
    where
        E: Fn(WorkItem, &Submitter<'_>) + Sync,
    {
        for message in queue {
            let item = match message {
                Message::Run(item) => item,
                Message::Shutdown => break,
            };
            let (label, id) = (item.label(), item.id());
            tracing::trace!(item = label, id = %id, state = ?WorkState::Running);

            if panic::catch_unwind(AssertUnwindSafe(|| execute(item, submitter))).is_err() {
                self.panicked.fetch_add(1, Ordering::Relaxed);
                tracing::warn!("Work item {label} {id} panicked; continuing sweep");
            }

            self.completed.fetch_add(1, Ordering::Relaxed);
            tracing::trace!(item = label, id = %id, state = ?WorkState::Completed);
            self.finish_one();
        }
    }
}
