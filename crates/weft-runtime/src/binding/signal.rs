#![forbid(unsafe_code)]

//! Signal held directly in a hole.
//!
//! The binding subscribes to the signal and rebinds an inner [`Slot`] with
//! the signal's current value on every change, without re-rendering the
//! unit that produced it.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use tracing::trace;
use weft_core::{NodeId, WeftError};
use weft_reactive::Subscription;

use super::{Binding, Slot, disconnected};
use crate::block::WeakBlock;
use crate::effect::CommitContext;
use crate::part::Part;
use crate::updater::{UpdateContext, WeakUpdater};
use crate::value::{SignalValue, Value};

struct SignalState {
    part: Part,
    source: SignalValue,
    /// Version last pulled into the inner slot.
    seen: u64,
    inner: Option<Slot>,
    subscription: Option<Subscription>,
    updater: Option<WeakUpdater>,
    owner: Option<WeakBlock>,
    disconnected: bool,
}

impl SignalState {
    /// Pull the current value into the inner slot.
    fn pull(&mut self, cx: &UpdateContext) -> Result<(), WeftError> {
        self.seen = self.source.version();
        let value = self.source.current()?;
        match self.inner.as_mut() {
            Some(inner) => inner.bind(value, cx),
            None => {
                self.inner = Some(Slot::connect(self.part.clone(), value, cx)?);
                Ok(())
            }
        }
    }

    fn release(&mut self) {
        if let Some(subscription) = self.subscription.take() {
            subscription.unsubscribe();
        }
    }
}

fn subscribe(state: &Rc<RefCell<SignalState>>) {
    let weak = Rc::downgrade(state);
    let callback: Rc<dyn Fn()> = Rc::new(move || {
        if let Some(state) = weak.upgrade() {
            on_change(&state);
        }
    });
    let mut guard = state.borrow_mut();
    let subscription = guard.source.subscribe(callback);
    guard.subscription = Some(subscription);
}

fn on_change(state: &Rc<RefCell<SignalState>>) {
    // A change raised while this binding is mid-bind is picked up by that
    // bind.
    let Ok(mut guard) = state.try_borrow_mut() else {
        return;
    };
    if guard.disconnected || guard.subscription.is_none() {
        return;
    }
    let Some(updater) = guard.updater.as_ref().and_then(WeakUpdater::upgrade) else {
        return;
    };
    let cx = UpdateContext::new(updater.clone(), updater.default_priority(), guard.owner.clone());
    trace!(source = ?guard.source.source_id(), "signal changed");
    let result = guard.pull(&cx);
    drop(guard);
    if let Err(err) = result {
        cx.report_error(err);
    }
    cx.request_run();
}

/// Binding of a [`SignalValue`] to a part.
pub struct SignalBinding {
    part: Part,
    state: Rc<RefCell<SignalState>>,
}

impl SignalBinding {
    #[must_use]
    pub fn new(part: Part, source: SignalValue) -> Self {
        let state = SignalState {
            part: part.clone(),
            seen: source.version(),
            source,
            inner: None,
            subscription: None,
            updater: None,
            owner: None,
            disconnected: false,
        };
        Self {
            part,
            state: Rc::new(RefCell::new(state)),
        }
    }

    /// Whether the binding currently follows its signal.
    #[must_use]
    pub fn is_subscribed(&self) -> bool {
        self.state.borrow().subscription.is_some()
    }
}

impl Binding for SignalBinding {
    fn part(&self) -> &Part {
        &self.part
    }

    fn accepts(&self, value: &Value) -> bool {
        matches!(value, Value::Signal(_))
    }

    fn connect(&mut self, cx: &UpdateContext) -> Result<(), WeftError> {
        {
            let mut state = self.state.borrow_mut();
            if state.disconnected {
                return Err(disconnected());
            }
            state.updater = Some(cx.updater().downgrade());
            state.owner = cx.owner_weak();
            state.pull(cx)?;
        }
        subscribe(&self.state);
        Ok(())
    }

    fn bind(&mut self, value: Value, cx: &UpdateContext) -> Result<(), WeftError> {
        let next = match value {
            Value::Signal(next) => next,
            other => return Err(super::unsupported(&self.part, &other)),
        };
        let resubscribe = {
            let mut state = self.state.borrow_mut();
            if state.disconnected {
                return Err(disconnected());
            }
            state.updater = Some(cx.updater().downgrade());
            state.owner = cx.owner_weak();
            let same = state.source.same_source(&next);
            let paused = state.subscription.is_none();
            if same && !paused && state.source.version() == state.seen {
                return Ok(());
            }
            if !same {
                state.release();
                state.source = next;
            }
            state.pull(cx)?;
            state.subscription.is_none()
        };
        if resubscribe {
            subscribe(&self.state);
        }
        Ok(())
    }

    fn unbind(&mut self, cx: &UpdateContext) {
        let mut state = self.state.borrow_mut();
        state.release();
        if let Some(inner) = state.inner.as_mut() {
            inner.unbind(cx);
        }
    }

    fn disconnect(&mut self) {
        let mut state = self.state.borrow_mut();
        state.disconnected = true;
        state.release();
        if let Some(inner) = state.inner.as_mut() {
            inner.disconnect();
        }
    }

    fn commit(&mut self, cx: &CommitContext<'_>) -> Result<(), WeftError> {
        match self.state.borrow_mut().inner.as_mut() {
            Some(inner) => inner.binding_mut().commit(cx),
            None => Ok(()),
        }
    }

    fn is_connected(&self) -> bool {
        let state = self.state.borrow();
        state.inner.is_some() && !state.disconnected
    }

    fn committed_nodes(&self, out: &mut Vec<NodeId>) {
        if let Some(inner) = &self.state.borrow().inner {
            inner.committed_nodes(out);
        }
    }

    fn first_committed_node(&self) -> Option<NodeId> {
        self.state
            .borrow()
            .inner
            .as_ref()
            .and_then(Slot::first_committed_node)
    }
}

impl fmt::Debug for SignalBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.borrow();
        f.debug_struct("SignalBinding")
            .field("part", &self.part)
            .field("source", &state.source)
            .field("seen", &state.seen)
            .field("subscribed", &state.subscription.is_some())
            .finish()
    }
}
