#![forbid(unsafe_code)]

//! Blocks: the renderable units of weft.
//!
//! A [`Block`] wraps a render closure that returns the [`Value`] to show at
//! the child part it is mounted on. Every signal the closure watches through
//! its [`RenderContext`] requests a re-render when it changes.
//!
//! # Status
//!
//! ```text
//! Unmounted ──attach──▶ Dirty ──render──▶ Idle ──signal──▶ Dirty
//!                         ▲                 │
//!                         └─────resume──── Suspended ◀──suspend
//!               any state ──disconnect──▶ Disconnected (final)
//! ```
//!
//! # Invariants
//!
//! 1. A block is mounted at most once.
//! 2. A popped render is skipped unless the block is `Dirty` and no
//!    ancestor is `Dirty` (the ancestor's render rebinds it anyway).
//! 3. Watches are renewed on every render; a render that stops reading a
//!    signal stops reacting to it.

use std::cell::RefCell;
use std::error::Error;
use std::fmt;
use std::rc::{Rc, Weak};

use tracing::trace;
use weft_core::{CommitPhase, NodeId, Priority, ProtocolError, WeftError};
use weft_reactive::{Atom, Computed, SubscriptionScope, Versioned};

use crate::binding::Slot;
use crate::effect::{CommitContext, Effect, from_fn};
use crate::part::Part;
use crate::unit::{Renderable, UnitId};
use crate::updater::{UpdateContext, Updater, WeakUpdater};
use crate::value::Value;

type RenderFn = dyn Fn(&mut RenderContext<'_>) -> Result<Value, WeftError>;

/// Lifecycle state of a [`Block`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockStatus {
    /// Created, never attached.
    Unmounted,
    /// Rendered and up to date.
    Idle,
    /// A render is queued.
    Dirty,
    /// Unbound from its part; renders nothing until resumed.
    Suspended,
    Disconnected,
}

struct BlockState {
    status: BlockStatus,
    part: Option<Part>,
    parent: Option<WeakBlock>,
    updater: Option<WeakUpdater>,
    /// Out of the state while the block renders.
    slot: Option<Slot>,
    watches: SubscriptionScope,
    renders: u64,
}

struct BlockInner {
    id: UnitId,
    name: Rc<str>,
    render: Box<RenderFn>,
    state: RefCell<BlockState>,
}

/// Shared handle to a renderable unit.
#[derive(Clone)]
pub struct Block {
    inner: Rc<BlockInner>,
}

/// Non-owning handle to a [`Block`].
#[derive(Clone)]
pub struct WeakBlock {
    id: UnitId,
    inner: Weak<BlockInner>,
}

impl WeakBlock {
    #[must_use]
    pub fn upgrade(&self) -> Option<Block> {
        self.inner.upgrade().map(|inner| Block { inner })
    }

    #[must_use]
    pub fn id(&self) -> UnitId {
        self.id
    }
}

impl fmt::Debug for WeakBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("WeakBlock").field(&self.id).finish()
    }
}

impl Block {
    /// Create an unmounted block.
    pub fn new(
        name: &str,
        render: impl Fn(&mut RenderContext<'_>) -> Result<Value, WeftError> + 'static,
    ) -> Self {
        Self {
            inner: Rc::new(BlockInner {
                id: UnitId::next(),
                name: Rc::from(name),
                render: Box::new(render),
                state: RefCell::new(BlockState {
                    status: BlockStatus::Unmounted,
                    part: None,
                    parent: None,
                    updater: None,
                    slot: None,
                    watches: SubscriptionScope::new(),
                    renders: 0,
                }),
            }),
        }
    }

    #[must_use]
    pub fn id(&self) -> UnitId {
        self.inner.id
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    #[must_use]
    pub fn status(&self) -> BlockStatus {
        self.inner.state.borrow().status
    }

    /// Completed and attempted renders.
    #[must_use]
    pub fn render_count(&self) -> u64 {
        self.inner.state.borrow().renders
    }

    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    #[must_use]
    pub fn downgrade(&self) -> WeakBlock {
        WeakBlock {
            id: self.inner.id,
            inner: Rc::downgrade(&self.inner),
        }
    }

    /// The block that mounted this one, if it is still alive.
    #[must_use]
    pub fn parent(&self) -> Option<Block> {
        self.inner
            .state
            .borrow()
            .parent
            .as_ref()
            .and_then(WeakBlock::upgrade)
    }

    /// Mount at `part`. The owner of `cx` becomes the parent.
    pub(crate) fn attach(&self, part: Part, cx: &UpdateContext) -> Result<(), WeftError> {
        let parent = cx.owner_weak();
        {
            let mut state = self.inner.state.borrow_mut();
            match state.status {
                BlockStatus::Unmounted => {}
                BlockStatus::Disconnected => return Err(ProtocolError::DisconnectedBinding.into()),
                _ => return Err(ProtocolError::AlreadyMounted.into()),
            }
            state.part = Some(part);
            state.parent = parent.clone();
            state.updater = Some(cx.updater().downgrade());
            state.status = BlockStatus::Idle;
        }
        cx.updater()
            .register_scope(self.inner.id, parent.as_ref().map(WeakBlock::id));
        self.request_update(Some(cx.priority()));
        Ok(())
    }

    /// Queue a render. `None` uses the updater's default priority.
    ///
    /// Ignored unless the block is mounted and not suspended.
    pub fn request_update(&self, priority: Option<Priority>) {
        let updater = {
            let mut state = self.inner.state.borrow_mut();
            if !matches!(state.status, BlockStatus::Idle | BlockStatus::Dirty) {
                return;
            }
            let Some(updater) = state.updater.as_ref().and_then(WeakUpdater::upgrade) else {
                return;
            };
            state.status = BlockStatus::Dirty;
            updater
        };
        let priority = priority.unwrap_or_else(|| updater.default_priority());
        updater.enqueue(Rc::new(self.clone()), priority);
        updater.request_run();
    }

    /// Stop rendering and schedule removal of the content.
    pub(crate) fn suspend(&self, cx: &UpdateContext) {
        let mut state = self.inner.state.borrow_mut();
        if !matches!(state.status, BlockStatus::Idle | BlockStatus::Dirty) {
            return;
        }
        state.status = BlockStatus::Suspended;
        state.watches.clear();
        if let Some(slot) = state.slot.as_mut() {
            slot.unbind(cx);
        }
    }

    /// Re-render after [`suspend`](Self::suspend), or escalate a pending
    /// render to `cx`'s priority.
    pub(crate) fn resume(&self, cx: &UpdateContext) {
        {
            let mut state = self.inner.state.borrow_mut();
            match state.status {
                BlockStatus::Suspended => state.status = BlockStatus::Idle,
                BlockStatus::Dirty => {}
                _ => return,
            }
        }
        self.request_update(Some(cx.priority()));
    }

    /// Release watches, content bindings, and the context scope. Schedules
    /// no host mutations.
    pub fn disconnect(&self) {
        let updater = {
            let mut state = self.inner.state.borrow_mut();
            if state.status == BlockStatus::Disconnected {
                return;
            }
            state.status = BlockStatus::Disconnected;
            state.watches.clear();
            if let Some(slot) = state.slot.as_mut() {
                slot.disconnect();
            }
            state.updater.as_ref().and_then(WeakUpdater::upgrade)
        };
        if let Some(updater) = updater {
            updater.release_scope(self.inner.id);
        }
        trace!(unit = %self.inner.id, name = %self.inner.name, "block disconnected");
    }

    /// Schedule removal of the content, then disconnect.
    pub(crate) fn detach(&self, cx: &UpdateContext) {
        if let Some(slot) = self.inner.state.borrow_mut().slot.as_mut() {
            slot.unbind(cx);
        }
        self.disconnect();
    }

    /// Top-level host nodes of the rendered content, in document order.
    pub fn committed_nodes(&self, out: &mut Vec<NodeId>) {
        if let Some(slot) = &self.inner.state.borrow().slot {
            slot.committed_nodes(out);
        }
    }

    #[must_use]
    pub fn first_committed_node(&self) -> Option<NodeId> {
        self.inner
            .state
            .borrow()
            .slot
            .as_ref()
            .and_then(Slot::first_committed_node)
    }

    fn has_dirty_ancestor(&self) -> bool {
        let mut next = self.parent();
        while let Some(block) = next {
            if block.status() == BlockStatus::Dirty {
                return true;
            }
            next = block.parent();
        }
        false
    }
}

impl Renderable for Block {
    fn id(&self) -> UnitId {
        self.inner.id
    }

    fn name(&self) -> &str {
        &self.inner.name
    }

    fn should_skip(&self) -> bool {
        self.status() != BlockStatus::Dirty || self.has_dirty_ancestor()
    }

    fn render(&self, cx: &UpdateContext) -> Result<(), WeftError> {
        let (mut slot, part) = {
            let mut state = self.inner.state.borrow_mut();
            state.status = BlockStatus::Idle;
            state.renders += 1;
            state.watches.clear();
            (state.slot.take(), state.part.clone())
        };
        let Some(part) = part else {
            return Ok(());
        };
        let child = cx.with_owner(self);
        let mut watches = SubscriptionScope::new();
        let rendered = {
            let mut render_cx = RenderContext {
                cx: &child,
                block: self,
                watches: &mut watches,
            };
            (self.inner.render)(&mut render_cx)
        };
        let outcome = match rendered {
            Ok(value) => match slot.as_mut() {
                Some(current) => current.bind(value, &child),
                None => Slot::connect(part, value, &child).map(|connected| {
                    slot = Some(connected);
                }),
            },
            Err(err) => Err(err),
        };

        let mut state = self.inner.state.borrow_mut();
        if state.status == BlockStatus::Disconnected {
            watches.clear();
            if let Some(slot) = slot.as_mut() {
                slot.disconnect();
            }
        }
        state.watches = watches;
        state.slot = slot;
        outcome
    }
}

impl fmt::Debug for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("Block");
        s.field("id", &self.inner.id).field("name", &self.inner.name);
        if let Ok(state) = self.inner.state.try_borrow() {
            s.field("status", &state.status).field("renders", &state.renders);
        }
        s.finish()
    }
}

// ---------------------------------------------------------------------------
// RenderContext
// ---------------------------------------------------------------------------

/// Explicit context handed to a block's render closure.
pub struct RenderContext<'a> {
    cx: &'a UpdateContext,
    block: &'a Block,
    watches: &'a mut SubscriptionScope,
}

impl RenderContext<'_> {
    #[must_use]
    pub fn priority(&self) -> Priority {
        self.cx.priority()
    }

    #[must_use]
    pub fn unit_id(&self) -> UnitId {
        self.block.id()
    }

    #[must_use]
    pub fn updater(&self) -> &Updater {
        self.cx.updater()
    }

    #[must_use]
    pub fn update_context(&self) -> &UpdateContext {
        self.cx
    }

    /// Re-render this block whenever `source` changes.
    pub fn watch<S: Versioned + ?Sized>(&mut self, source: &S) -> &mut Self {
        let block = self.block.downgrade();
        self.watches.watch(
            source,
            Rc::new(move || {
                if let Some(block) = block.upgrade() {
                    block.request_update(None);
                }
            }),
        );
        self
    }

    /// Read an atom and watch it.
    pub fn read<T: Clone + 'static>(&mut self, atom: &Atom<T>) -> T {
        self.watch(atom);
        atom.get()
    }

    /// Read a derived signal and watch it.
    pub fn read_computed<T, E>(&mut self, computed: &Computed<T, E>) -> Result<T, WeftError>
    where
        T: Clone + PartialEq + 'static,
        E: Error + 'static,
    {
        self.watch(computed);
        computed.try_get().map_err(WeftError::compute)
    }

    /// Provide `value` to this block and its descendants.
    pub fn provide<T: 'static>(&self, value: T) {
        self.cx.updater().provide(self.block.id(), value);
    }

    /// Nearest value of type `T` provided by this block, an ancestor, or
    /// the root.
    #[must_use]
    pub fn context<T: 'static>(&self) -> Option<Rc<T>> {
        self.cx.updater().lookup::<T>(self.block.id())
    }

    pub fn enqueue_effect(&self, effect: Box<dyn Effect>, phase: CommitPhase) {
        self.cx.enqueue_effect(effect, phase);
    }

    /// Run `f` after this pass's mutations, before paint.
    pub fn on_layout(
        &self,
        f: impl FnOnce(&CommitContext<'_>) -> Result<(), WeftError> + 'static,
    ) {
        self.enqueue_effect(Box::new(from_fn(f)), CommitPhase::Layout);
    }

    /// Run `f` in the background commit.
    pub fn on_passive(
        &self,
        f: impl FnOnce(&CommitContext<'_>) -> Result<(), WeftError> + 'static,
    ) {
        self.enqueue_effect(Box::new(from_fn(f)), CommitPhase::Passive);
    }
}

impl fmt::Debug for RenderContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderContext")
            .field("unit", &self.block.id())
            .field("priority", &self.cx.priority())
            .field("watches", &self.watches.len())
            .finish()
    }
}
