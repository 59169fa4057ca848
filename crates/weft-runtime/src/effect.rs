#![forbid(unsafe_code)]

//! Deferred commit work.
//!
//! An [`Effect`] is enqueued with a [`CommitPhase`] and owned by the
//! updater's queues from then on. It is committed at most once per enqueue.

use std::collections::VecDeque;
use std::fmt;

use weft_core::{CommitPhase, HostTree, WeftError};

/// Context handed to an effect when it commits.
pub struct CommitContext<'a> {
    host: &'a dyn HostTree,
    phase: CommitPhase,
}

impl<'a> CommitContext<'a> {
    #[must_use]
    pub fn new(host: &'a dyn HostTree, phase: CommitPhase) -> Self {
        Self { host, phase }
    }

    #[must_use]
    pub fn host(&self) -> &'a dyn HostTree {
        self.host
    }

    #[must_use]
    pub fn phase(&self) -> CommitPhase {
        self.phase
    }
}

impl fmt::Debug for CommitContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommitContext")
            .field("phase", &self.phase)
            .finish()
    }
}

/// Deferred callback run in a commit phase.
pub trait Effect {
    fn commit(self: Box<Self>, cx: &CommitContext<'_>) -> Result<(), WeftError>;
}

/// Effect backed by a closure. See [`from_fn`].
pub struct FnEffect<F>(F);

impl<F> Effect for FnEffect<F>
where
    F: FnOnce(&CommitContext<'_>) -> Result<(), WeftError>,
{
    fn commit(self: Box<Self>, cx: &CommitContext<'_>) -> Result<(), WeftError> {
        (self.0)(cx)
    }
}

/// Wrap a closure as an [`Effect`].
pub fn from_fn<F>(f: F) -> FnEffect<F>
where
    F: FnOnce(&CommitContext<'_>) -> Result<(), WeftError>,
{
    FnEffect(f)
}

/// The three effect queues.
#[derive(Default)]
pub(crate) struct EffectQueues {
    mutation: Vec<Box<dyn Effect>>,
    layout: Vec<Box<dyn Effect>>,
    passive: VecDeque<Box<dyn Effect>>,
}

impl EffectQueues {
    pub(crate) fn push(&mut self, effect: Box<dyn Effect>, phase: CommitPhase) {
        match phase {
            CommitPhase::Mutation => self.mutation.push(effect),
            CommitPhase::Layout => self.layout.push(effect),
            CommitPhase::Passive => self.passive.push_back(effect),
        }
    }

    /// Take every queued effect of a blocking phase, in enqueue order.
    pub(crate) fn take(&mut self, phase: CommitPhase) -> Vec<Box<dyn Effect>> {
        match phase {
            CommitPhase::Mutation => std::mem::take(&mut self.mutation),
            CommitPhase::Layout => std::mem::take(&mut self.layout),
            CommitPhase::Passive => self.passive.drain(..).collect(),
        }
    }

    pub(crate) fn pop_passive(&mut self) -> Option<Box<dyn Effect>> {
        self.passive.pop_front()
    }

    pub(crate) fn len(&self, phase: CommitPhase) -> usize {
        match phase {
            CommitPhase::Mutation => self.mutation.len(),
            CommitPhase::Layout => self.layout.len(),
            CommitPhase::Passive => self.passive.len(),
        }
    }

    pub(crate) fn has_blocking(&self) -> bool {
        !self.mutation.is_empty() || !self.layout.is_empty()
    }

    pub(crate) fn has_passive(&self) -> bool {
        !self.passive.is_empty()
    }
}
