#![forbid(unsafe_code)]

//! The concurrent updater.
//!
//! [`Updater`] owns the render queue, the three effect queues, and the
//! context arena. It drives work in passes of up to three phases:
//!
//! 1. **Render**: pop units by priority and render them. Units enqueued
//!    while rendering join the same phase. Between units the yield check may
//!    suspend the phase; a unit whose lane deadline has passed is rendered
//!    regardless.
//! 2. **Blocking commit**: every mutation effect, then every layout effect,
//!    repeated until none remain. Never yields.
//! 3. **Background commit**: passive effects, with yield checks. Preempted
//!    as soon as render or blocking work appears.
//!
//! # Run states
//!
//! ```text
//! Idle ──request_run──▶ Scheduled(phase) ──host callback──▶ Running(phase)
//!   ▲                                                           │
//!   └──────────────── no work left ◀────────────────────────────┘
//! ```
//!
//! `request_run` while running folds into the active loop. A scheduled host
//! callback is identified by a generation number; rescheduling (to raise the
//! priority, or on [`flush_sync`](Updater::flush_sync)) makes older callbacks
//! no-ops.
//!
//! # Invariants
//!
//! | Property | Guarantee |
//! |----------|-----------|
//! | Ordering | Mutation effects commit before layout effects of the same pass |
//! | Passive | Never committed while render or blocking work is pending |
//! | Nesting | Starting a render inside a render fails with `NestedRender` |
//! | Effects | Every effect of a batch is attempted; the first failure is returned |
//! | Skips | A skipped unit is still dequeued |
//!
//! # Failure Modes
//!
//! | Condition | Behavior |
//! |-----------|----------|
//! | Render closure fails | Run stops, `WeftError::Render { unit }` returned, remaining work is rescheduled |
//! | Effect fails | Logged at error level; the pass continues through every phase; first failure returned as `WeftError::Effect { phase }` when the run ends |
//! | Signal binding fails to pull | Recorded and returned when the run ends |
//! | Host drops the updater | Pending callbacks become no-ops |

use std::cell::{Cell, RefCell};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::rc::{Rc, Weak};
use std::task::{Context, Poll, Waker};

use tracing::{debug, debug_span, error, trace, warn};
use weft_core::{
    CommitPhase, EventClass, FrameBudget, HostScheduler, HostTree, NodeId, Priority,
    ProtocolError, WeftError,
};

use crate::block::{Block, WeakBlock};
use crate::config::{ContinuousEventPolicy, SchedulerConfig};
use crate::context::{ContextArena, ContextOverride};
use crate::effect::{CommitContext, Effect, EffectQueues};
use crate::part::Part;
use crate::queue::{Enqueued, RenderQueue};
use crate::unit::{Renderable, UnitId};

// ---------------------------------------------------------------------------
// Phases and statistics
// ---------------------------------------------------------------------------

/// Phase of a pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Render,
    BlockingCommit,
    BackgroundCommit,
}

impl Phase {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Render => "render",
            Self::BlockingCommit => "blocking-commit",
            Self::BackgroundCommit => "background-commit",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Run state of the updater.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    /// A host callback for the phase is pending.
    Scheduled(Phase),
    Running(Phase),
}

/// Counters since construction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdaterStats {
    /// Host callbacks and synchronous flushes that did work.
    pub runs: u64,
    pub renders: u64,
    /// Units dequeued without rendering.
    pub skipped: u64,
    /// Render or passive slices that handed control back to the host.
    pub yields: u64,
    pub effects_committed: u64,
    pub effects_failed: u64,
    /// Renders performed past the yield signal because their lane deadline
    /// had expired.
    pub forced_by_deadline: u64,
}

enum Slice {
    Done,
    Yielded,
    /// Passive work interrupted by render or blocking work.
    Preempted,
}

enum Step {
    Idle,
    Suspend(Phase, Priority),
}

// ---------------------------------------------------------------------------
// IdleSignal
// ---------------------------------------------------------------------------

#[derive(Default)]
struct IdleShared {
    result: RefCell<Option<Result<(), WeftError>>>,
    waker: RefCell<Option<Waker>>,
}

impl IdleShared {
    fn complete(&self, result: Result<(), WeftError>) {
        if self.result.borrow().is_some() {
            return;
        }
        *self.result.borrow_mut() = Some(result);
        let waker = self.waker.borrow_mut().take();
        if let Some(waker) = waker {
            waker.wake();
        }
    }
}

/// Single-shot completion returned by [`Updater::wait_for_idle`].
///
/// Completes when the updater next reaches idle, or with the error that
/// ended the run. Every waiter of the same run sees the same result.
#[derive(Clone)]
pub struct IdleSignal {
    shared: Rc<IdleShared>,
}

impl IdleSignal {
    fn pending() -> Self {
        Self {
            shared: Rc::default(),
        }
    }

    fn ready(result: Result<(), WeftError>) -> Self {
        let signal = Self::pending();
        signal.shared.complete(result);
        signal
    }

    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.shared.result.borrow().is_some()
    }

    /// The outcome, once complete.
    #[must_use]
    pub fn result(&self) -> Option<Result<(), WeftError>> {
        self.shared.result.borrow().clone()
    }
}

impl Future for IdleSignal {
    type Output = Result<(), WeftError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        if let Some(result) = self.shared.result.borrow().clone() {
            return Poll::Ready(result);
        }
        *self.shared.waker.borrow_mut() = Some(cx.waker().clone());
        Poll::Pending
    }
}

impl fmt::Debug for IdleSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdleSignal")
            .field("complete", &self.is_complete())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Updater
// ---------------------------------------------------------------------------

struct UpdaterInner {
    host: Rc<dyn HostTree>,
    scheduler: Rc<dyn HostScheduler>,
    config: SchedulerConfig,
    queue: RefCell<RenderQueue>,
    effects: RefCell<EffectQueues>,
    arena: RefCell<ContextArena>,
    state: Cell<RunState>,
    scheduled_priority: Cell<Priority>,
    generation: Cell<u64>,
    /// Highest priority of the contexts that enqueued pending blocking
    /// effects.
    effect_priority: Cell<Option<Priority>>,
    rendering: Cell<bool>,
    sync: Cell<bool>,
    budget: FrameBudget,
    waiters: RefCell<Vec<IdleSignal>>,
    deferred_error: RefCell<Option<WeftError>>,
    stats: Cell<UpdaterStats>,
}

/// Shared handle to the scheduler that renders units and commits effects.
#[derive(Clone)]
pub struct Updater {
    inner: Rc<UpdaterInner>,
}

/// Non-owning handle to an [`Updater`].
#[derive(Clone)]
pub struct WeakUpdater {
    inner: Weak<UpdaterInner>,
}

impl WeakUpdater {
    #[must_use]
    pub fn upgrade(&self) -> Option<Updater> {
        self.inner.upgrade().map(|inner| Updater { inner })
    }
}

impl fmt::Debug for WeakUpdater {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("WeakUpdater(..)")
    }
}

/// Clears the rendering flag on drop.
struct RenderGuard<'a>(&'a Cell<bool>);

impl<'a> RenderGuard<'a> {
    fn enter(flag: &'a Cell<bool>) -> Result<Self, WeftError> {
        if flag.replace(true) {
            return Err(ProtocolError::NestedRender.into());
        }
        Ok(Self(flag))
    }
}

impl Drop for RenderGuard<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

impl Updater {
    pub fn new(host: Rc<dyn HostTree>, scheduler: Rc<dyn HostScheduler>) -> Self {
        Self::with_config(host, scheduler, SchedulerConfig::default())
    }

    pub fn with_config(
        host: Rc<dyn HostTree>,
        scheduler: Rc<dyn HostScheduler>,
        config: SchedulerConfig,
    ) -> Self {
        let budget = FrameBudget::new(config.frame_budget);
        Self {
            inner: Rc::new(UpdaterInner {
                host,
                scheduler,
                config,
                queue: RefCell::new(RenderQueue::default()),
                effects: RefCell::new(EffectQueues::default()),
                arena: RefCell::new(ContextArena::new()),
                state: Cell::new(RunState::Idle),
                scheduled_priority: Cell::new(Priority::Background),
                generation: Cell::new(0),
                effect_priority: Cell::new(None),
                rendering: Cell::new(false),
                sync: Cell::new(false),
                budget,
                waiters: RefCell::new(Vec::new()),
                deferred_error: RefCell::new(None),
                stats: Cell::new(UpdaterStats::default()),
            }),
        }
    }

    #[must_use]
    pub fn downgrade(&self) -> WeakUpdater {
        WeakUpdater {
            inner: Rc::downgrade(&self.inner),
        }
    }

    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    #[must_use]
    pub fn host(&self) -> &dyn HostTree {
        &*self.inner.host
    }

    #[must_use]
    pub fn config(&self) -> &SchedulerConfig {
        &self.inner.config
    }

    #[must_use]
    pub fn run_state(&self) -> RunState {
        self.inner.state.get()
    }

    #[must_use]
    pub fn stats(&self) -> UpdaterStats {
        self.inner.stats.get()
    }

    fn bump(&self, f: impl FnOnce(&mut UpdaterStats)) {
        let mut stats = self.inner.stats.get();
        f(&mut stats);
        self.inner.stats.set(stats);
    }

    /// A context for driving bindings outside a render, at `priority`.
    #[must_use]
    pub fn context(&self, priority: Priority) -> UpdateContext {
        UpdateContext::new(self.clone(), priority, None)
    }

    // -----------------------------------------------------------------------
    // Priorities
    // -----------------------------------------------------------------------

    /// Priority for an update requested now, derived from the platform event
    /// being dispatched.
    #[must_use]
    pub fn default_priority(&self) -> Priority {
        let config = &self.inner.config;
        match self.inner.scheduler.current_event() {
            Some(EventClass::Discrete) => Priority::UserBlocking,
            Some(EventClass::Continuous) => match config.continuous_events {
                ContinuousEventPolicy::AlwaysDowngrade => Priority::UserVisible,
                ContinuousEventPolicy::DeferToPendingDiscrete => {
                    if self.inner.queue.borrow().has_priority(Priority::UserBlocking) {
                        Priority::UserBlocking
                    } else {
                        Priority::UserVisible
                    }
                }
            },
            None => config.idle_priority,
        }
    }

    /// Priority the next pass should run at.
    #[must_use]
    pub fn pending_priority(&self) -> Priority {
        let render = self.inner.queue.borrow().top_priority();
        let effects = if self.inner.effects.borrow().has_blocking() {
            Some(
                self.inner
                    .effect_priority
                    .get()
                    .unwrap_or(self.inner.config.idle_priority),
            )
        } else {
            None
        };
        render.max(effects).unwrap_or(Priority::Background)
    }

    // -----------------------------------------------------------------------
    // Queues
    // -----------------------------------------------------------------------

    /// Queue `unit` for rendering. A unit already pending keeps one entry at
    /// the higher of the two priorities.
    ///
    /// Does not start a run; call [`request_run`](Self::request_run).
    pub fn enqueue(&self, unit: Rc<dyn Renderable>, priority: Priority) {
        let id = unit.id();
        let deadline = self.inner.scheduler.now() + self.inner.config.lane_timeout(priority);
        let outcome = self.inner.queue.borrow_mut().push(unit, priority, deadline);
        match outcome {
            Enqueued::New => trace!(unit = %id, %priority, "render enqueued"),
            Enqueued::Escalated { from } => {
                trace!(unit = %id, %from, to = %priority, "render escalated");
            }
            Enqueued::Unchanged { .. } => {}
        }
    }

    /// Queue an effect for `phase`.
    pub fn enqueue_effect(&self, effect: Box<dyn Effect>, phase: CommitPhase) {
        self.enqueue_effect_at(effect, phase, self.default_priority());
    }

    pub(crate) fn enqueue_effect_at(
        &self,
        effect: Box<dyn Effect>,
        phase: CommitPhase,
        priority: Priority,
    ) {
        if phase != CommitPhase::Passive {
            let current = self.inner.effect_priority.get();
            self.inner
                .effect_priority
                .set(Some(current.map_or(priority, |p| p.max(priority))));
        }
        self.inner.effects.borrow_mut().push(effect, phase);
    }

    #[must_use]
    pub fn pending_renders(&self) -> usize {
        self.inner.queue.borrow().len()
    }

    #[must_use]
    pub fn pending_effects(&self, phase: CommitPhase) -> usize {
        self.inner.effects.borrow().len(phase)
    }

    fn has_urgent_work(&self) -> bool {
        !self.inner.queue.borrow().is_empty() || self.inner.effects.borrow().has_blocking()
    }

    fn has_work(&self) -> bool {
        self.has_urgent_work()
            || self.inner.effects.borrow().has_passive()
            || self.inner.deferred_error.borrow().is_some()
    }

    /// Idle with nothing queued.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.inner.state.get() == RunState::Idle && !self.has_work()
    }

    // -----------------------------------------------------------------------
    // Run control
    // -----------------------------------------------------------------------

    /// Make sure queued work will run.
    pub fn request_run(&self) {
        match self.inner.state.get() {
            RunState::Running(_) => {}
            RunState::Idle => {
                if self.has_urgent_work() || self.inner.deferred_error.borrow().is_some() {
                    self.schedule(Phase::Render, self.pending_priority());
                } else if self.inner.effects.borrow().has_passive() {
                    self.schedule(Phase::BackgroundCommit, Priority::Background);
                }
            }
            RunState::Scheduled(Phase::BackgroundCommit) => {
                if self.has_urgent_work() {
                    self.schedule(Phase::Render, self.pending_priority());
                }
            }
            RunState::Scheduled(phase) => {
                let priority = self.pending_priority();
                if priority > self.inner.scheduled_priority.get() {
                    self.schedule(phase, priority);
                }
            }
        }
    }

    fn schedule(&self, phase: Phase, priority: Priority) {
        let generation = self.inner.generation.get() + 1;
        self.inner.generation.set(generation);
        self.inner.state.set(RunState::Scheduled(phase));
        self.inner.scheduled_priority.set(priority);
        debug!(%phase, %priority, generation, "run scheduled");
        let weak = self.downgrade();
        self.inner.scheduler.request_callback(
            priority,
            Box::new(move || match weak.upgrade() {
                Some(updater) if updater.inner.generation.get() == generation => {
                    updater.resume(phase)
                }
                _ => Ok(()),
            }),
        );
    }

    /// Host callback entry: run `phase` if it is the scheduled one.
    pub fn resume(&self, phase: Phase) -> Result<(), WeftError> {
        if self.inner.state.get() != RunState::Scheduled(phase) {
            trace!(%phase, "stale resume ignored");
            return Ok(());
        }
        self.bump(|s| s.runs += 1);
        match self.drive(phase) {
            Ok(Step::Suspend(next, priority)) => {
                self.schedule(next, priority);
                Ok(())
            }
            Ok(Step::Idle) => self.finish(Ok(())),
            Err(err) => self.finish(Err(err)),
        }
    }

    /// Run every pending phase to completion on the current stack, without
    /// yielding.
    pub fn flush_sync(&self) -> Result<(), WeftError> {
        if self.inner.rendering.get() || matches!(self.inner.state.get(), RunState::Running(_)) {
            return Err(ProtocolError::NestedRender.into());
        }
        // Invalidate any scheduled callback.
        self.inner.generation.set(self.inner.generation.get() + 1);
        if !self.has_work() {
            return self.finish(Ok(()));
        }
        self.bump(|s| s.runs += 1);
        self.inner.sync.set(true);
        let result = self.drive(Phase::Render);
        self.inner.sync.set(false);
        match result {
            Ok(_) => self.finish(Ok(())),
            Err(err) => self.finish(Err(err)),
        }
    }

    /// Completion for the next time the updater is idle. Requests a run if
    /// work is pending.
    #[must_use]
    pub fn wait_for_idle(&self) -> IdleSignal {
        if self.is_idle() {
            return IdleSignal::ready(Ok(()));
        }
        let signal = IdleSignal::pending();
        self.inner.waiters.borrow_mut().push(signal.clone());
        self.request_run();
        signal
    }

    fn finish(&self, result: Result<(), WeftError>) -> Result<(), WeftError> {
        let deferred = self.inner.deferred_error.borrow_mut().take();
        let result = match (result, deferred) {
            (Err(err), _) | (Ok(()), Some(err)) => Err(err),
            (Ok(()), None) => Ok(()),
        };
        self.inner.state.set(RunState::Idle);
        match &result {
            Ok(()) => debug!("updater idle"),
            Err(err) => debug!(error = %err, "run ended with error"),
        }
        let waiters = std::mem::take(&mut *self.inner.waiters.borrow_mut());
        for waiter in waiters {
            waiter.shared.complete(result.clone());
        }
        if result.is_err() && self.has_work() {
            debug!(pending = self.pending_renders(), "rescheduling work left by a failed run");
            self.request_run();
        }
        result
    }

    /// Record a failure raised outside a phase, returned when the current
    /// or next run ends.
    pub fn report_error(&self, err: WeftError) {
        let mut deferred = self.inner.deferred_error.borrow_mut();
        if deferred.is_none() {
            *deferred = Some(err);
        }
    }

    fn should_yield(&self) -> bool {
        if self.inner.sync.get() {
            return false;
        }
        self.inner.scheduler.should_yield()
            || self.inner.budget.is_exhausted(self.inner.scheduler.now())
    }

    // -----------------------------------------------------------------------
    // Phases
    // -----------------------------------------------------------------------

    fn drive(&self, mut phase: Phase) -> Result<Step, WeftError> {
        let sync = self.inner.sync.get();
        loop {
            self.inner.state.set(RunState::Running(phase));
            phase = match phase {
                Phase::Render => match self.render_phase()? {
                    Slice::Done | Slice::Preempted => Phase::BlockingCommit,
                    Slice::Yielded => {
                        return Ok(Step::Suspend(Phase::Render, self.pending_priority()));
                    }
                },
                Phase::BlockingCommit => {
                    self.blocking_commit();
                    if !self.inner.queue.borrow().is_empty() {
                        Phase::Render
                    } else if !self.inner.effects.borrow().has_passive() {
                        return Ok(Step::Idle);
                    } else if sync {
                        Phase::BackgroundCommit
                    } else {
                        return Ok(Step::Suspend(Phase::BackgroundCommit, Priority::Background));
                    }
                }
                Phase::BackgroundCommit => match self.passive_commit() {
                    Slice::Done if !self.has_urgent_work() => return Ok(Step::Idle),
                    Slice::Done | Slice::Preempted if sync => Phase::Render,
                    Slice::Done | Slice::Preempted => {
                        return Ok(Step::Suspend(Phase::Render, self.pending_priority()));
                    }
                    Slice::Yielded => {
                        return Ok(Step::Suspend(Phase::BackgroundCommit, Priority::Background));
                    }
                },
            };
        }
    }

    fn render_phase(&self) -> Result<Slice, WeftError> {
        let _span = debug_span!("weft.render_phase").entered();
        let scheduler = &self.inner.scheduler;
        self.inner.budget.restart(scheduler.now());
        loop {
            let task = self.inner.queue.borrow_mut().pop();
            let Some(task) = task else {
                return Ok(Slice::Done);
            };
            if task.unit.should_skip() {
                trace!(unit = %task.unit.id(), name = task.unit.name(), "render skipped");
                self.bump(|s| s.skipped += 1);
            } else {
                let cx = UpdateContext::new(self.clone(), task.priority, None);
                let _guard = RenderGuard::enter(&self.inner.rendering)?;
                task.unit.render(&cx).map_err(|source| WeftError::Render {
                    unit: Rc::from(task.unit.name()),
                    source: Box::new(source),
                })?;
                self.bump(|s| s.renders += 1);
            }

            if self.inner.queue.borrow().is_empty() {
                return Ok(Slice::Done);
            }
            if self.should_yield() {
                let now = scheduler.now();
                let expired = self
                    .inner
                    .queue
                    .borrow_mut()
                    .earliest_deadline()
                    .is_some_and(|deadline| deadline <= now);
                if expired {
                    warn!(now_ms = now.as_millis() as u64, "lane deadline expired, rendering past yield");
                    self.bump(|s| s.forced_by_deadline += 1);
                    continue;
                }
                self.bump(|s| s.yields += 1);
                debug!(pending = self.pending_renders(), "render phase yielded");
                return Ok(Slice::Yielded);
            }
        }
    }

    /// Failures are recorded with [`report_error`](Self::report_error).
    fn blocking_commit(&self) {
        let _span = debug_span!("weft.commit", phase = "blocking").entered();
        loop {
            let (phase, batch) = {
                let mut effects = self.inner.effects.borrow_mut();
                let mutation = effects.take(CommitPhase::Mutation);
                if mutation.is_empty() {
                    let layout = effects.take(CommitPhase::Layout);
                    if layout.is_empty() {
                        break;
                    }
                    (CommitPhase::Layout, layout)
                } else {
                    (CommitPhase::Mutation, mutation)
                }
            };
            trace!(%phase, count = batch.len(), "committing effects");
            let cx = CommitContext::new(&*self.inner.host, phase);
            for effect in batch {
                self.commit_one(effect, &cx);
            }
        }
        self.inner.effect_priority.set(None);
    }

    fn passive_commit(&self) -> Slice {
        let _span = debug_span!("weft.commit", phase = "passive").entered();
        self.inner.budget.restart(self.inner.scheduler.now());
        let cx = CommitContext::new(&*self.inner.host, CommitPhase::Passive);
        loop {
            if self.has_urgent_work() {
                break Slice::Preempted;
            }
            let effect = self.inner.effects.borrow_mut().pop_passive();
            let Some(effect) = effect else {
                break Slice::Done;
            };
            self.commit_one(effect, &cx);
            if self.inner.effects.borrow().has_passive() && self.should_yield() {
                self.bump(|s| s.yields += 1);
                break Slice::Yielded;
            }
        }
    }

    fn commit_one(&self, effect: Box<dyn Effect>, cx: &CommitContext<'_>) {
        match effect.commit(cx) {
            Ok(()) => self.bump(|s| s.effects_committed += 1),
            Err(source) => {
                let phase = cx.phase();
                error!(%phase, error = %source, "effect failed");
                self.bump(|s| s.effects_failed += 1);
                self.report_error(WeftError::Effect {
                    phase,
                    source: Box::new(source),
                });
            }
        }
    }

    // -----------------------------------------------------------------------
    // Mounting and context
    // -----------------------------------------------------------------------

    /// Mount `block` before `anchor` and request a run.
    pub fn mount(&self, block: &Block, anchor: NodeId) -> Result<(), WeftError> {
        let cx = self.context(self.default_priority());
        block.attach(Part::child(anchor), &cx)?;
        self.request_run();
        Ok(())
    }

    /// Schedule removal of `block`'s content and disconnect it.
    pub fn unmount(&self, block: &Block) {
        let cx = self.context(self.default_priority());
        block.detach(&cx);
        self.request_run();
    }

    /// Provide `value` to every unit that finds no closer provider.
    pub fn provide_root<T: 'static>(&self, value: T) {
        self.inner.arena.borrow_mut().provide_root(value);
    }

    /// Root value of type `T`, including active overrides.
    #[must_use]
    pub fn root_context<T: 'static>(&self) -> Option<Rc<T>> {
        self.inner.arena.borrow().lookup_root::<T>()
    }

    /// Override root lookups of `T` until the guard drops.
    #[must_use = "the override ends when the guard is dropped"]
    pub fn push_context_override<T: 'static>(&self, value: T) -> ContextOverride {
        self.inner.arena.borrow().push_override(value)
    }

    pub(crate) fn register_scope(&self, unit: UnitId, parent: Option<UnitId>) {
        self.inner.arena.borrow_mut().register(unit, parent);
    }

    pub(crate) fn release_scope(&self, unit: UnitId) {
        self.inner.arena.borrow_mut().release(unit);
    }

    pub(crate) fn provide<T: 'static>(&self, unit: UnitId, value: T) {
        if !self.inner.arena.borrow_mut().provide(unit, value) {
            trace!(%unit, "provide ignored for unit without scope");
        }
    }

    pub(crate) fn lookup<T: 'static>(&self, unit: UnitId) -> Option<Rc<T>> {
        self.inner.arena.borrow().lookup::<T>(unit)
    }
}

impl fmt::Debug for Updater {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Updater")
            .field("state", &self.inner.state.get())
            .field("pending_renders", &self.pending_renders())
            .field("stats", &self.inner.stats.get())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// UpdateContext
// ---------------------------------------------------------------------------

/// Context threaded through connect, bind, and render calls.
///
/// Carries the updater, the priority of the work in progress, and the block
/// that owns the bindings being driven.
#[derive(Clone)]
pub struct UpdateContext {
    updater: Updater,
    priority: Priority,
    owner: Option<WeakBlock>,
}

impl UpdateContext {
    #[must_use]
    pub fn new(updater: Updater, priority: Priority, owner: Option<WeakBlock>) -> Self {
        Self {
            updater,
            priority,
            owner,
        }
    }

    #[must_use]
    pub fn host(&self) -> &dyn HostTree {
        self.updater.host()
    }

    #[must_use]
    pub fn priority(&self) -> Priority {
        self.priority
    }

    #[must_use]
    pub fn updater(&self) -> &Updater {
        &self.updater
    }

    /// The block whose render is driving this context.
    #[must_use]
    pub fn owner(&self) -> Option<Block> {
        self.owner.as_ref().and_then(WeakBlock::upgrade)
    }

    pub(crate) fn owner_weak(&self) -> Option<WeakBlock> {
        self.owner.clone()
    }

    /// Same updater and priority, owned by `block`.
    #[must_use]
    pub fn with_owner(&self, block: &Block) -> Self {
        Self {
            updater: self.updater.clone(),
            priority: self.priority,
            owner: Some(block.downgrade()),
        }
    }

    pub fn enqueue_effect(&self, effect: Box<dyn Effect>, phase: CommitPhase) {
        self.updater.enqueue_effect_at(effect, phase, self.priority);
    }

    pub fn request_run(&self) {
        self.updater.request_run();
    }

    pub fn report_error(&self, err: WeftError) {
        self.updater.report_error(err);
    }
}

impl fmt::Debug for UpdateContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpdateContext")
            .field("priority", &self.priority)
            .field("owner", &self.owner)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effect::from_fn;
    use std::time::Duration;
    use weft_core::HostError;
    use weft_harness::{ManualScheduler, MemoryHost};

    struct LoggedUnit {
        id: UnitId,
        name: &'static str,
        skip: bool,
        fail: bool,
        log: Rc<RefCell<Vec<&'static str>>>,
        cost: Duration,
        clock: Option<Rc<ManualScheduler>>,
    }

    impl LoggedUnit {
        fn new(name: &'static str, log: &Rc<RefCell<Vec<&'static str>>>) -> Self {
            Self {
                id: UnitId::next(),
                name,
                skip: false,
                fail: false,
                log: Rc::clone(log),
                cost: Duration::ZERO,
                clock: None,
            }
        }
    }

    impl Renderable for LoggedUnit {
        fn id(&self) -> UnitId {
            self.id
        }

        fn name(&self) -> &str {
            self.name
        }

        fn should_skip(&self) -> bool {
            self.skip
        }

        fn render(&self, _cx: &UpdateContext) -> Result<(), WeftError> {
            self.log.borrow_mut().push(self.name);
            if let Some(clock) = &self.clock {
                clock.advance(self.cost);
            }
            if self.fail {
                return Err(ProtocolError::NotOwned(NodeId::from_raw(9)).into());
            }
            Ok(())
        }
    }

    fn recorder(log: &Rc<RefCell<Vec<&'static str>>>, tag: &'static str) -> Box<dyn Effect> {
        let log = Rc::clone(log);
        Box::new(from_fn(move |_| {
            log.borrow_mut().push(tag);
            Ok(())
        }))
    }

    fn updater() -> (Rc<MemoryHost>, Rc<ManualScheduler>, Updater) {
        let host = MemoryHost::new();
        let scheduler = ManualScheduler::new();
        let updater = Updater::new(host.clone(), scheduler.clone());
        (host, scheduler, updater)
    }

    #[test]
    fn renders_by_priority_and_skips_dequeue() {
        let (_host, scheduler, updater) = updater();
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut skipped = LoggedUnit::new("skipped", &log);
        skipped.skip = true;
        updater.enqueue(Rc::new(LoggedUnit::new("bg", &log)), Priority::Background);
        updater.enqueue(Rc::new(skipped), Priority::UserBlocking);
        updater.enqueue(Rc::new(LoggedUnit::new("ub", &log)), Priority::UserBlocking);
        updater.request_run();
        assert_eq!(updater.run_state(), RunState::Scheduled(Phase::Render));
        assert_eq!(scheduler.requested_priorities(), [Priority::UserBlocking]);

        scheduler.run_until_idle().unwrap();
        assert_eq!(*log.borrow(), ["ub", "bg"]);
        assert_eq!(updater.stats().skipped, 1);
        assert_eq!(updater.pending_renders(), 0);
        assert!(updater.is_idle());
    }

    #[test]
    fn mutation_before_layout_before_passive() {
        let (_host, _scheduler, updater) = updater();
        let log = Rc::new(RefCell::new(Vec::new()));
        updater.enqueue_effect(recorder(&log, "passive"), CommitPhase::Passive);
        updater.enqueue_effect(recorder(&log, "layout"), CommitPhase::Layout);
        updater.enqueue_effect(recorder(&log, "mutation"), CommitPhase::Mutation);
        updater.flush_sync().unwrap();
        assert_eq!(*log.borrow(), ["mutation", "layout", "passive"]);
    }

    #[test]
    fn every_effect_attempted_first_error_returned() {
        let (_host, _scheduler, updater) = updater();
        let log = Rc::new(RefCell::new(Vec::new()));
        let bad = |node| -> Box<dyn Effect> {
            Box::new(from_fn(move |_| Err(HostError::UnknownNode(NodeId::from_raw(node)).into())))
        };
        updater.enqueue_effect(bad(1), CommitPhase::Mutation);
        updater.enqueue_effect(recorder(&log, "after"), CommitPhase::Mutation);
        updater.enqueue_effect(bad(2), CommitPhase::Mutation);
        let err = updater.flush_sync().unwrap_err();
        assert!(matches!(
            err,
            WeftError::Effect {
                phase: CommitPhase::Mutation,
                ..
            }
        ));
        assert!(matches!(err.root(), WeftError::Host(HostError::UnknownNode(n)) if n.raw() == 1));
        assert_eq!(*log.borrow(), ["after"]);
        assert_eq!(updater.stats().effects_failed, 2);
        assert!(updater.is_idle());
    }

    fn failing(node: u64) -> Box<dyn Effect> {
        Box::new(from_fn(move |_| Err(HostError::UnknownNode(NodeId::from_raw(node)).into())))
    }

    #[test]
    fn failed_passive_effect_keeps_the_rest_scheduled() {
        let (_host, scheduler, updater) = updater();
        let log = Rc::new(RefCell::new(Vec::new()));
        updater.enqueue_effect(failing(3), CommitPhase::Passive);
        updater.enqueue_effect(recorder(&log, "p2"), CommitPhase::Passive);
        updater.request_run();
        scheduler.script_yields([true]);

        assert!(scheduler.run_next().unwrap(), "the failure is held until the run ends");
        assert!(log.borrow().is_empty());
        assert_eq!(updater.run_state(), RunState::Scheduled(Phase::BackgroundCommit));

        let err = scheduler.run_until_idle().unwrap_err();
        assert!(matches!(
            err,
            WeftError::Effect {
                phase: CommitPhase::Passive,
                ..
            }
        ));
        assert_eq!(*log.borrow(), ["p2"]);
        assert_eq!(updater.pending_effects(CommitPhase::Passive), 0);
        assert!(updater.is_idle());
    }

    #[test]
    fn failed_mutation_still_reaches_passive_effects() {
        let (_host, scheduler, updater) = updater();
        let log = Rc::new(RefCell::new(Vec::new()));
        updater.enqueue_effect(failing(5), CommitPhase::Mutation);
        updater.enqueue_effect(recorder(&log, "passive"), CommitPhase::Passive);
        updater.request_run();

        let err = scheduler.run_until_idle().unwrap_err();
        assert!(matches!(err.root(), WeftError::Host(HostError::UnknownNode(n)) if n.raw() == 5));
        assert_eq!(*log.borrow(), ["passive"]);
        assert!(updater.is_idle());
    }

    #[test]
    fn failed_render_reschedules_queued_units() {
        let (_host, scheduler, updater) = updater();
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut broken = LoggedUnit::new("broken", &log);
        broken.fail = true;
        updater.enqueue(Rc::new(broken), Priority::UserBlocking);
        updater.enqueue(Rc::new(LoggedUnit::new("ok", &log)), Priority::UserVisible);
        updater.request_run();

        let err = scheduler.run_until_idle().unwrap_err();
        assert!(matches!(&err, WeftError::Render { unit, .. } if &**unit == "broken"));
        assert_eq!(updater.run_state(), RunState::Scheduled(Phase::Render));
        assert_eq!(scheduler.pending(), 1);

        scheduler.run_until_idle().unwrap();
        assert_eq!(*log.borrow(), ["broken", "ok"]);
        assert!(updater.is_idle());
    }

    #[test]
    fn yields_between_units_and_resumes() {
        let (_host, scheduler, updater) = updater();
        let log = Rc::new(RefCell::new(Vec::new()));
        for name in ["a", "b", "c"] {
            updater.enqueue(Rc::new(LoggedUnit::new(name, &log)), Priority::UserVisible);
        }
        updater.request_run();
        scheduler.script_yields([true, false]);
        scheduler.run_next().unwrap();
        assert_eq!(*log.borrow(), ["a"]);
        assert_eq!(updater.run_state(), RunState::Scheduled(Phase::Render));
        assert_eq!(updater.stats().yields, 1);

        scheduler.run_until_idle().unwrap();
        assert_eq!(*log.borrow(), ["a", "b", "c"]);
    }

    #[test]
    fn expired_deadline_renders_past_yield() {
        let (_host, scheduler, updater) = updater();
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut slow = LoggedUnit::new("slow", &log);
        slow.cost = Duration::from_millis(300);
        slow.clock = Some(scheduler.clone());
        updater.enqueue(Rc::new(slow), Priority::UserBlocking);
        updater.enqueue(Rc::new(LoggedUnit::new("late", &log)), Priority::UserBlocking);
        updater.request_run();
        scheduler.script_yields([true]);
        scheduler.run_next().unwrap();
        assert_eq!(*log.borrow(), ["slow", "late"]);
        assert_eq!(updater.stats().forced_by_deadline, 1);
        assert_eq!(updater.stats().yields, 0);
    }

    #[test]
    fn expired_background_task_forces_the_slice_on() {
        let (_host, scheduler, updater) = updater();
        let log = Rc::new(RefCell::new(Vec::new()));
        updater.enqueue(Rc::new(LoggedUnit::new("late", &log)), Priority::Background);
        scheduler.advance(Duration::from_secs(11));
        updater.enqueue(Rc::new(LoggedUnit::new("first", &log)), Priority::UserBlocking);
        updater.enqueue(Rc::new(LoggedUnit::new("second", &log)), Priority::UserBlocking);
        updater.request_run();
        scheduler.script_yields([true, true]);
        scheduler.run_next().unwrap();
        assert_eq!(*log.borrow(), ["first", "second", "late"]);
        assert_eq!(updater.stats().forced_by_deadline, 2);
        assert_eq!(updater.stats().yields, 0);
    }

    #[test]
    fn frame_budget_forces_yield() {
        let host = MemoryHost::new();
        let scheduler = ManualScheduler::new();
        let config = SchedulerConfig::default().with_frame_budget(Duration::from_millis(4));
        let updater = Updater::with_config(host, scheduler.clone(), config);
        let log = Rc::new(RefCell::new(Vec::new()));
        for name in ["a", "b"] {
            let mut unit = LoggedUnit::new(name, &log);
            unit.cost = Duration::from_millis(5);
            unit.clock = Some(scheduler.clone());
            updater.enqueue(Rc::new(unit), Priority::Background);
        }
        updater.request_run();
        scheduler.run_next().unwrap();
        assert_eq!(*log.borrow(), ["a"]);
        scheduler.run_until_idle().unwrap();
        assert_eq!(*log.borrow(), ["a", "b"]);
    }

    #[test]
    fn passive_effects_are_preempted_by_renders() {
        let (_host, scheduler, updater) = updater();
        let log = Rc::new(RefCell::new(Vec::new()));
        updater.enqueue_effect(recorder(&log, "p1"), CommitPhase::Passive);
        updater.enqueue_effect(recorder(&log, "p2"), CommitPhase::Passive);
        updater.request_run();
        assert_eq!(updater.run_state(), RunState::Scheduled(Phase::BackgroundCommit));

        updater.enqueue(Rc::new(LoggedUnit::new("urgent", &log)), Priority::UserBlocking);
        updater.request_run();
        assert_eq!(updater.run_state(), RunState::Scheduled(Phase::Render));
        scheduler.run_until_idle().unwrap();
        assert_eq!(*log.borrow(), ["urgent", "p1", "p2"]);
    }

    #[test]
    fn passive_commit_yields() {
        let (_host, scheduler, updater) = updater();
        let log = Rc::new(RefCell::new(Vec::new()));
        updater.enqueue_effect(recorder(&log, "p1"), CommitPhase::Passive);
        updater.enqueue_effect(recorder(&log, "p2"), CommitPhase::Passive);
        updater.request_run();
        scheduler.script_yields([true]);
        scheduler.run_next().unwrap();
        assert_eq!(*log.borrow(), ["p1"]);
        assert_eq!(updater.run_state(), RunState::Scheduled(Phase::BackgroundCommit));
        scheduler.run_until_idle().unwrap();
        assert_eq!(*log.borrow(), ["p1", "p2"]);
    }

    #[test]
    fn nested_render_is_rejected() {
        struct Reentrant(UnitId);
        impl Renderable for Reentrant {
            fn id(&self) -> UnitId {
                self.0
            }
            fn should_skip(&self) -> bool {
                false
            }
            fn render(&self, cx: &UpdateContext) -> Result<(), WeftError> {
                cx.updater().flush_sync()
            }
        }

        let (_host, _scheduler, updater) = updater();
        updater.enqueue(Rc::new(Reentrant(UnitId::next())), Priority::UserBlocking);
        let err = updater.flush_sync().unwrap_err();
        assert_eq!(err.as_protocol(), Some(&ProtocolError::NestedRender));
    }

    #[test]
    fn default_priority_follows_event_class() {
        let (_host, scheduler, updater) = updater();
        assert_eq!(updater.default_priority(), Priority::UserVisible);
        scheduler.set_event(Some(EventClass::Discrete));
        assert_eq!(updater.default_priority(), Priority::UserBlocking);
        scheduler.set_event(Some(EventClass::Continuous));
        assert_eq!(updater.default_priority(), Priority::UserVisible);
    }

    #[test]
    fn continuous_event_can_join_pending_discrete_work() {
        let host = MemoryHost::new();
        let scheduler = ManualScheduler::new();
        let config = SchedulerConfig::default()
            .with_continuous_events(ContinuousEventPolicy::DeferToPendingDiscrete);
        let updater = Updater::with_config(host, scheduler.clone(), config);
        let log = Rc::new(RefCell::new(Vec::new()));
        scheduler.set_event(Some(EventClass::Continuous));
        assert_eq!(updater.default_priority(), Priority::UserVisible);
        updater.enqueue(Rc::new(LoggedUnit::new("click", &log)), Priority::UserBlocking);
        assert_eq!(updater.default_priority(), Priority::UserBlocking);
    }

    #[test]
    fn request_while_scheduled_escalates() {
        let (_host, scheduler, updater) = updater();
        let log = Rc::new(RefCell::new(Vec::new()));
        updater.enqueue(Rc::new(LoggedUnit::new("bg", &log)), Priority::Background);
        updater.request_run();
        updater.enqueue(Rc::new(LoggedUnit::new("ub", &log)), Priority::UserBlocking);
        updater.request_run();
        assert_eq!(
            scheduler.requested_priorities(),
            [Priority::Background, Priority::UserBlocking]
        );
        scheduler.run_until_idle().unwrap();
        assert_eq!(*log.borrow(), ["ub", "bg"]);
        assert_eq!(updater.stats().runs, 1, "stale callback does nothing");
    }

    #[test]
    fn idle_signal_completes_once() {
        let (_host, scheduler, updater) = updater();
        assert!(updater.wait_for_idle().is_complete());

        let log = Rc::new(RefCell::new(Vec::new()));
        updater.enqueue(Rc::new(LoggedUnit::new("a", &log)), Priority::UserVisible);
        let first = updater.wait_for_idle();
        let second = updater.wait_for_idle();
        assert!(!first.is_complete());

        let mut future = std::pin::pin!(first.clone());
        let mut cx = Context::from_waker(Waker::noop());
        assert!(future.as_mut().poll(&mut cx).is_pending());

        scheduler.run_until_idle().unwrap();
        assert!(matches!(future.as_mut().poll(&mut cx), Poll::Ready(Ok(()))));
        assert!(matches!(second.result(), Some(Ok(()))));
    }

    #[test]
    fn idle_signal_carries_the_error() {
        let (_host, scheduler, updater) = updater();
        updater.enqueue_effect(
            Box::new(from_fn(|_| Err(HostError::InvalidNode(NodeId::from_raw(4)).into()))),
            CommitPhase::Layout,
        );
        let a = updater.wait_for_idle();
        let b = updater.wait_for_idle();
        assert!(scheduler.run_until_idle().is_err());
        for signal in [a, b] {
            let err = signal.result().unwrap().unwrap_err();
            assert!(matches!(err, WeftError::Effect { phase: CommitPhase::Layout, .. }));
        }
    }

    #[test]
    fn dropped_updater_makes_callbacks_noops() {
        let (_host, scheduler, updater) = updater();
        let log = Rc::new(RefCell::new(Vec::new()));
        updater.enqueue(Rc::new(LoggedUnit::new("a", &log)), Priority::UserVisible);
        updater.request_run();
        drop(updater);
        scheduler.run_until_idle().unwrap();
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn context_overrides_are_scoped() {
        let (_host, _scheduler, updater) = updater();
        updater.provide_root(1_u32);
        {
            let _guard = updater.push_context_override(2_u32);
            assert_eq!(updater.root_context::<u32>().as_deref(), Some(&2));
        }
        assert_eq!(updater.root_context::<u32>().as_deref(), Some(&1));
    }
}
