#![forbid(unsafe_code)]

//! Event listener binding.
//!
//! The host sees one stable trampoline listener per part. Swapping handlers
//! only changes the cell the trampoline reads; the host listener is added or
//! removed only when the part starts or stops listening.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use weft_core::{HostEvent, Listener, NodeId, WeftError};

use super::{Binding, CommitState, commit_now, disconnected, schedule};
use crate::effect::CommitContext;
use crate::part::Part;
use crate::updater::UpdateContext;
use crate::value::{EventHandler, Value};

type HandlerCell = Rc<RefCell<Option<EventHandler>>>;

struct EventState {
    node: NodeId,
    name: Rc<str>,
    /// Read by the trampoline on every dispatch.
    active: HandlerCell,
    pending: Option<EventHandler>,
    listening: bool,
    disconnected: bool,
    scheduled: bool,
}

impl CommitState for EventState {
    fn scheduled(&mut self) -> &mut bool {
        &mut self.scheduled
    }

    fn commit(&mut self, cx: &CommitContext<'_>) -> Result<(), WeftError> {
        if self.disconnected {
            return Ok(());
        }
        self.active.replace(self.pending.clone());
        let want = self.pending.is_some();
        if want == self.listening {
            return Ok(());
        }
        if want {
            cx.host()
                .add_listener(self.node, &self.name, trampoline(&self.active))?;
        } else {
            cx.host().remove_listener(self.node, &self.name)?;
        }
        self.listening = want;
        Ok(())
    }
}

fn trampoline(cell: &HandlerCell) -> Listener {
    let cell = Rc::clone(cell);
    Rc::new(move |event: &HostEvent| {
        let handler = cell.borrow().clone();
        if let Some(handler) = handler {
            handler.call(event);
        }
    })
}

pub struct EventBinding {
    part: Part,
    state: Rc<RefCell<EventState>>,
    connected: bool,
}

impl EventBinding {
    #[must_use]
    pub fn new(part: Part, value: Value) -> Self {
        let state = EventState {
            node: part.node(),
            name: Rc::from(part.name().unwrap_or_default()),
            active: Rc::new(RefCell::new(None)),
            pending: into_handler(value),
            listening: false,
            disconnected: false,
            scheduled: false,
        };
        Self {
            part,
            state: Rc::new(RefCell::new(state)),
            connected: false,
        }
    }
}

fn into_handler(value: Value) -> Option<EventHandler> {
    match value {
        Value::Handler(handler) => Some(handler),
        _ => None,
    }
}

impl Binding for EventBinding {
    fn part(&self) -> &Part {
        &self.part
    }

    fn accepts(&self, value: &Value) -> bool {
        matches!(value, Value::Empty | Value::Handler(_))
    }

    fn connect(&mut self, cx: &UpdateContext) -> Result<(), WeftError> {
        let mut state = self.state.borrow_mut();
        if state.disconnected {
            return Err(disconnected());
        }
        self.connected = true;
        schedule(&self.state, &mut state.scheduled, cx);
        Ok(())
    }

    fn bind(&mut self, value: Value, cx: &UpdateContext) -> Result<(), WeftError> {
        let mut state = self.state.borrow_mut();
        if state.disconnected {
            return Err(disconnected());
        }
        let next = into_handler(value);
        if state.pending == next {
            return Ok(());
        }
        state.pending = next;
        schedule(&self.state, &mut state.scheduled, cx);
        Ok(())
    }

    fn unbind(&mut self, cx: &UpdateContext) {
        let mut state = self.state.borrow_mut();
        if state.disconnected || state.pending.is_none() {
            return;
        }
        state.pending = None;
        schedule(&self.state, &mut state.scheduled, cx);
    }

    fn disconnect(&mut self) {
        let mut state = self.state.borrow_mut();
        state.disconnected = true;
        state.active.replace(None);
        self.connected = false;
    }

    fn commit(&mut self, cx: &CommitContext<'_>) -> Result<(), WeftError> {
        commit_now(&self.state, cx)
    }

    fn is_connected(&self) -> bool {
        self.connected
    }
}

impl fmt::Debug for EventBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.borrow();
        f.debug_struct("EventBinding")
            .field("part", &self.part)
            .field("listening", &state.listening)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::updater::Updater;
    use std::cell::Cell;
    use weft_core::{HostTree, Primitive, Priority};
    use weft_harness::{HostOp, ManualScheduler, MemoryHost};

    fn counter(hits: &Rc<Cell<u32>>, by: u32) -> EventHandler {
        let hits = Rc::clone(hits);
        EventHandler::new(move |_| hits.set(hits.get() + by))
    }

    #[test]
    fn swapping_handlers_keeps_one_listener() {
        let host = MemoryHost::new();
        let updater = Updater::new(host.clone(), ManualScheduler::new());
        let button = host.create_element("button");
        let cx = updater.context(Priority::UserBlocking);
        let hits = Rc::new(Cell::new(0));

        let mut binding = EventBinding::new(Part::event(button, "click"), counter(&hits, 1).into());
        binding.connect(&cx).unwrap();
        updater.flush_sync().unwrap();
        host.dispatch(button, "click", Primitive::Null);
        assert_eq!(hits.get(), 1);

        host.take_ops();
        binding.bind(counter(&hits, 10).into(), &cx).unwrap();
        updater.flush_sync().unwrap();
        assert!(host.take_ops().is_empty(), "handler swap does not touch the host");
        host.dispatch(button, "click", Primitive::Null);
        assert_eq!(hits.get(), 11);

        binding.bind(Value::Empty, &cx).unwrap();
        updater.flush_sync().unwrap();
        let ops = host.take_ops();
        assert!(matches!(ops.as_slice(), [HostOp::RemoveListener { .. }]));
        host.dispatch(button, "click", Primitive::Null);
        assert_eq!(hits.get(), 11);
    }

    #[test]
    fn same_handler_is_a_no_op() {
        let host = MemoryHost::new();
        let updater = Updater::new(host.clone(), ManualScheduler::new());
        let button = host.create_element("button");
        let cx = updater.context(Priority::UserBlocking);
        let handler = EventHandler::new(|_| {});
        let mut binding = EventBinding::new(Part::event(button, "click"), handler.clone().into());
        binding.connect(&cx).unwrap();
        updater.flush_sync().unwrap();
        binding.bind(handler.into(), &cx).unwrap();
        assert!(updater.is_idle());
    }

    #[test]
    fn disconnect_silences_listener_without_host_calls() {
        let host = MemoryHost::new();
        let updater = Updater::new(host.clone(), ManualScheduler::new());
        let button = host.create_element("button");
        let cx = updater.context(Priority::UserBlocking);
        let hits = Rc::new(Cell::new(0));
        let mut binding = EventBinding::new(Part::event(button, "click"), counter(&hits, 1).into());
        binding.connect(&cx).unwrap();
        updater.flush_sync().unwrap();
        host.take_ops();

        binding.disconnect();
        host.dispatch(button, "click", Primitive::Null);
        assert_eq!(hits.get(), 0);
        assert!(host.take_ops().is_empty());
    }
}
