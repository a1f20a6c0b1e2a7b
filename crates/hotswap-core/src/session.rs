//! Replacement session
//!
//! Orchestrates one sweep: seed, discover, mutate, recurse, drain.
//!
//! ```text
//! seed ──► Discover(target) ──► Visit(referrer) ──► Visit(member) ──► ...
//!      └─► Frame(f) ──────────► Visit(globals)  ──► ...
//! ```
//!
//! The session owns its worker pool and visited set for the duration of
//! [`Session::run`]; it owns none of the objects it rewrites.

use crate::config::SessionConfig;
use crate::discovery::ReferrerSource;
use crate::error::ReplaceError;
use crate::mutator::{Mutator, PassSummary, RewriteOutcome};
use crate::observer::SweepObserver;
use crate::scheduler::{Scheduler, SchedulerStats, Submitter, WorkItem};
use crate::walker::FrameSource;
use hotswap_heap::{FrameRef, ObjRef, Runtime, Value};
use serde::Serialize;
use std::fmt::{self, Display, Formatter};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::Span;
use ulid::Ulid;

/// Unique session identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct SessionId(Ulid);

impl SessionId {
    /// Generate a new identifier
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for SessionId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.0, f)
    }
}

/// What a sweep did
///
/// Purely observational: the effect of a sweep is the set of in-place
/// rewrites it performed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// Session that produced the report
    pub session: SessionId,
    /// Work items submitted to the pool
    pub items_scheduled: usize,
    /// Work items dropped as already visited
    pub items_deduplicated: usize,
    /// Work items that ran to completion
    pub items_completed: usize,
    /// Slots now holding the substitute
    pub slots_rewritten: usize,
    /// Slots that refused the write
    pub mutation_failures: usize,
    /// Objects discovery could not inspect
    pub discovery_skips: usize,
    /// Work items that panicked
    pub worker_panics: usize,
    /// Active frames seeded
    pub frames_seeded: usize,
    /// Direct referrers of the target found by discovery
    pub referrers_found: usize,
    /// Wall-clock duration
    pub elapsed_ms: u64,
}

impl SweepReport {
    /// Report of a sweep that did nothing
    #[must_use]
    pub fn empty(session: SessionId) -> Self {
        Self {
            session,
            items_scheduled: 0,
            items_deduplicated: 0,
            items_completed: 0,
            slots_rewritten: 0,
            mutation_failures: 0,
            discovery_skips: 0,
            worker_panics: 0,
            frames_seeded: 0,
            referrers_found: 0,
            elapsed_ms: 0,
        }
    }

    /// Whether every attempted rewrite succeeded
    #[inline]
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.mutation_failures == 0 && self.discovery_skips == 0 && self.worker_panics == 0
    }
}

/// One replacement session
pub struct Session<'h> {
    id: SessionId,
    config: SessionConfig,
    referrers: &'h dyn ReferrerSource,
    frames: Option<&'h dyn FrameSource>,
    observer: Option<Arc<dyn SweepObserver>>,
}

impl<'h> Session<'h> {
    /// Create a session over a referrer source
    ///
    /// # Errors
    /// Returns [`ReplaceError::Configuration`] if the configuration is invalid.
    pub fn new(config: SessionConfig, referrers: &'h dyn ReferrerSource) -> Result<Self, ReplaceError> {
        config.validate()?;
        Ok(Self {
            id: SessionId::new(),
            config,
            referrers,
            frames: None,
            observer: None,
        })
    }

    /// Seed from an active call stack too
    #[must_use]
    pub fn with_frames(mut self, frames: &'h dyn FrameSource) -> Self {
        self.frames = Some(frames);
        self
    }

    /// Install an observer
    #[must_use]
    pub fn with_observer(mut self, observer: Arc<dyn SweepObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Session identifier
    #[inline]
    #[must_use]
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Session configuration
    #[inline]
    #[must_use]
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Replace every reachable reference to `target` with `substitute`
    ///
    /// Blocks until all scheduled work has drained. Slots that refuse the
    /// write are skipped and counted; they never fail the call.
    ///
    /// # Errors
    /// - [`ReplaceError::TypeConstraint`] if either value is a primitive
    /// - [`ReplaceError::WorkerSpawn`] if no worker thread could be started
    ///
    /// # Panics
    /// A panic raised by the referrer or frame source propagates to the caller
    /// after every worker has stopped.
    pub fn run(&self, target: &Value, substitute: &Value) -> Result<SweepReport, ReplaceError> {
        let target = reference("target", target)?;
        let substitute = reference("substitute", substitute)?;

        let span = tracing::info_span!(
            "sweep",
            session = %self.id,
            target = %target.id(),
            substitute = %substitute.id(),
        );
        let _entered = span.enter();

        if Arc::ptr_eq(target, substitute) {
            tracing::info!("Substitute is the target; nothing to replace");
            return Ok(SweepReport::empty(self.id));
        }

        let started = Instant::now();
        // host callbacks run before the pool starts
        if self.config.reclaim_before_discovery {
            let reclaimed = self.referrers.reclaim();
            tracing::debug!("Reclaimed {reclaimed} unreachable objects before discovery");
        }
        let frames = match self.frames {
            Some(source) if self.config.include_frames => source.active_frames(self.config.frame_order),
            _ => Vec::new(),
        };

        let sweep = Sweep {
            session: self,
            mutator: Mutator::new(Arc::clone(target), Arc::clone(substitute)),
            span: span.clone(),
            tally: Tally::default(),
        };
        let scheduler = Scheduler::new(self.config.concurrency_limit);
        scheduler
            .run(|submit| sweep.seed(frames, submit), |item, submit| sweep.execute(item, submit))
            .map_err(ReplaceError::WorkerSpawn)?;

        let report = sweep.tally.report(self.id, scheduler.stats(), started.elapsed());
        tracing::info!(
            "Sweep finished: {} slots rewritten, {} failures, {} items in {}ms",
            report.slots_rewritten,
            report.mutation_failures,
            report.items_completed,
            report.elapsed_ms,
        );
        Ok(report)
    }
}

impl fmt::Debug for Session<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("config", &self.config)
            .field("frames", &self.frames.is_some())
            .field("observer", &self.observer.is_some())
            .finish_non_exhaustive()
    }
}

/// Replace `target` with `substitute` across a runtime's heap and call stack
///
/// # Errors
/// See [`Session::new`] and [`Session::run`].
pub fn run(
    runtime: &Runtime,
    target: &Value,
    substitute: &Value,
    concurrency_limit: usize,
) -> Result<SweepReport, ReplaceError> {
    let config = SessionConfig::new().with_concurrency_limit(concurrency_limit);
    Session::new(config, runtime)?.with_frames(runtime).run(target, substitute)
}

fn reference<'v>(role: &'static str, value: &'v Value) -> Result<&'v ObjRef, ReplaceError> {
    value.as_object().ok_or(ReplaceError::TypeConstraint {
        role,
        found: value.kind_name(),
    })
}

#[derive(Debug, Default)]
struct Tally {
    rewritten: AtomicUsize,
    failed: AtomicUsize,
    skipped: AtomicUsize,
    frames: AtomicUsize,
    referrers: AtomicUsize,
}

impl Tally {
    fn report(&self, session: SessionId, stats: SchedulerStats, elapsed: Duration) -> SweepReport {
        SweepReport {
            session,
            items_scheduled: stats.scheduled,
            items_deduplicated: stats.deduplicated,
            items_completed: stats.completed,
            slots_rewritten: self.rewritten.load(Ordering::Relaxed),
            mutation_failures: self.failed.load(Ordering::Relaxed),
            discovery_skips: self.skipped.load(Ordering::Relaxed),
            worker_panics: stats.panicked,
            frames_seeded: self.frames.load(Ordering::Relaxed),
            referrers_found: self.referrers.load(Ordering::Relaxed),
            elapsed_ms: u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
        }
    }
}

/// State shared by every worker for one run
struct Sweep<'s, 'h> {
    session: &'s Session<'h>,
    mutator: Mutator,
    span: Span,
    tally: Tally,
}

impl Sweep<'_, '_> {
    fn seed(&self, frames: Vec<FrameRef>, submit: &Submitter<'_>) {
        submit.schedule(WorkItem::Discover(Arc::clone(self.mutator.target())));
        for frame in frames {
            if submit.schedule(WorkItem::Frame(frame)) {
                self.tally.frames.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    fn execute(&self, item: WorkItem, submit: &Submitter<'_>) {
        let _entered = self.span.enter();
        match item {
            WorkItem::Discover(target) => self.discover(&target, submit),
            WorkItem::Visit(obj) => {
                let outcome = self.mutator.rewrite_object(&obj);
                self.absorb(outcome, submit);
            }
            WorkItem::Frame(frame) => {
                let outcome = self.mutator.rewrite_frame(&frame);
                self.absorb(outcome, submit);
            }
        }
    }

    fn discover(&self, target: &ObjRef, submit: &Submitter<'_>) {
        let found = self
            .session
            .referrers
            .referrers(target, self.session.config.lock_timeout());
        tracing::debug!("Discovered {} referrers of {}", found.referrers.len(), target.id());

        self.tally.referrers.fetch_add(found.referrers.len(), Ordering::Relaxed);
        self.tally.skipped.fetch_add(found.skipped.len(), Ordering::Relaxed);
        for skip in &found.skipped {
            tracing::warn!("{skip}");
        }
        for referrer in found.referrers {
            submit.schedule(WorkItem::Visit(referrer));
        }
    }

    fn absorb(&self, outcome: RewriteOutcome, submit: &Submitter<'_>) {
        let summary = PassSummary::from(&outcome);
        self.tally.rewritten.fetch_add(summary.rewritten, Ordering::Relaxed);
        self.tally.failed.fetch_add(summary.failed, Ordering::Relaxed);

        for rewrite in &outcome.rewrites {
            tracing::debug!(holder = %rewrite.holder, kind = %rewrite.kind, slot = ?rewrite.slot, "Rewrote slot");
            if let Some(observer) = &self.session.observer {
                observer.on_rewrite(rewrite);
            }
        }
        for failure in &outcome.failures {
            tracing::debug!("Skipped slot: {failure}");
            if let Some(observer) = &self.session.observer {
                observer.on_failure(failure);
            }
        }
        for child in outcome.children {
            submit.schedule(WorkItem::Visit(child));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FrameOrder;
    use crate::error::ConfigError;
    use hotswap_heap::{Frame, Heap};

    #[test]
    fn zero_concurrency_is_a_configuration_error() {
        let heap = Heap::new();
        let err = Session::new(SessionConfig::new().with_concurrency_limit(0), &heap).unwrap_err();
        assert!(matches!(
            err,
            ReplaceError::Configuration(ConfigError::InvalidConcurrency(0))
        ));
    }

    #[test]
    fn primitives_cannot_be_replaced() {
        let heap = Heap::new();
        let session = Session::new(SessionConfig::new(), &heap).unwrap();
        let obj = Value::from(&heap.sequence([]));

        let err = session.run(&Value::Int(1), &obj).unwrap_err();
        assert!(matches!(
            err,
            ReplaceError::TypeConstraint { role: "target", found: "int" }
        ));
        let err = session.run(&obj, &Value::str("x")).unwrap_err();
        assert!(matches!(err, ReplaceError::TypeConstraint { role: "substitute", .. }));
    }

    #[test]
    fn self_replacement_is_a_no_op() {
        let heap = Heap::new();
        let target = heap.sequence([]);
        let holder = heap.sequence([Value::from(&target)]);
        let session = Session::new(SessionConfig::new(), &heap).unwrap();

        let report = session.run(&Value::from(&target), &Value::from(&target)).unwrap();

        assert_eq!(report, SweepReport::empty(session.id()));
        assert!(holder.at(0).unwrap().is(&target));
    }

    #[test]
    fn sweep_reaches_referrers_and_frames() {
        let runtime = Runtime::new();
        let target = runtime.heap().mapping([]);
        let substitute = runtime.heap().mapping([]);
        let holder = runtime.heap().sequence([Value::from(&target)]);
        let globals = runtime.heap().mapping([(Value::str("T"), Value::from(&target))]);
        let frame = Frame::new("main", globals, [("t", Value::from(&target))]);
        let _guard = runtime.stack().enter(frame.clone());

        let report = run(&runtime, &Value::from(&target), &Value::from(&substitute), 2).unwrap();

        assert!(holder.at(0).unwrap().is(&substitute));
        assert!(frame.local("t").unwrap().is(&substitute));
        assert!(frame.global("T").unwrap().is(&substitute));
        assert_eq!(report.frames_seeded, 1);
        assert_eq!(report.slots_rewritten, 3);
        assert!(report.is_clean());
    }

    #[test]
    fn frames_can_be_left_alone() {
        let runtime = Runtime::new();
        let target = runtime.heap().mapping([]);
        let substitute = runtime.heap().mapping([]);
        let frame = Frame::new("main", runtime.heap().mapping([]), [("t", Value::from(&target))]);
        let _guard = runtime.stack().enter(frame.clone());

        let config = SessionConfig::new()
            .with_frames(false)
            .with_frame_order(FrameOrder::InnermostFirst);
        let report = Session::new(config, &runtime)
            .unwrap()
            .with_frames(&runtime)
            .run(&Value::from(&target), &Value::from(&substitute))
            .unwrap();

        assert_eq!(report.frames_seeded, 0);
        assert!(frame.local("t").unwrap().is(&target));
    }

    #[test]
    fn target_holding_itself_points_at_the_substitute() {
        let heap = Heap::new();
        let target = heap.sequence([]);
        target.push(&target).unwrap();
        let substitute = heap.sequence([]);

        let report = Session::new(SessionConfig::new(), &heap)
            .unwrap()
            .run(&Value::from(&target), &Value::from(&substitute))
            .unwrap();

        assert!(target.at(0).unwrap().is(&substitute));
        assert_eq!(report.referrers_found, 1);
        assert_eq!(report.slots_rewritten, 1);
    }

    struct FailingReclaim(Heap);

    impl ReferrerSource for FailingReclaim {
        fn reclaim(&self) -> usize {
            panic!("reclaim failed")
        }

        fn referrers(&self, target: &ObjRef, lock_timeout: Duration) -> crate::discovery::Discovery {
            self.0.referrers(target, lock_timeout)
        }
    }

    #[test]
    fn panicking_reclaim_unwinds_out_of_run() {
        let source = FailingReclaim(Heap::new());
        let target = source.0.sequence([]);
        let substitute = source.0.sequence([]);
        let session = Session::new(SessionConfig::new().with_concurrency_limit(2), &source).unwrap();

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            session.run(&Value::from(&target), &Value::from(&substitute))
        }));

        let payload = result.unwrap_err();
        assert_eq!(payload.downcast_ref::<&str>(), Some(&"reclaim failed"));
    }

    #[test]
    fn report_serializes_with_session_id() {
        let id = SessionId::new();
        let json = serde_json::to_value(SweepReport::empty(id)).unwrap();
        assert_eq!(json["session"], serde_json::Value::String(id.to_string()));
        assert_eq!(json["slots_rewritten"], 0);
    }
}
