#![forbid(unsafe_code)]

//! Attribute spread onto an element.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use weft_core::{NodeId, WeftError};

use super::{Binding, CommitState, commit_now, disconnected, schedule};
use crate::effect::CommitContext;
use crate::part::Part;
use crate::updater::UpdateContext;
use crate::value::{AttributeMap, Value};

struct SpreadState {
    node: NodeId,
    pending: AttributeMap,
    committed: AttributeMap,
    disconnected: bool,
    scheduled: bool,
}

impl CommitState for SpreadState {
    fn scheduled(&mut self) -> &mut bool {
        &mut self.scheduled
    }

    fn commit(&mut self, cx: &CommitContext<'_>) -> Result<(), WeftError> {
        if self.disconnected || self.pending == self.committed {
            return Ok(());
        }
        let host = cx.host();
        for (name, _) in self.committed.iter() {
            if self.pending.get(name).is_none() {
                host.set_attribute(self.node, name, None)?;
            }
        }
        for (name, value) in self.pending.iter() {
            if self.committed.get(name) != Some(value) {
                host.set_attribute(self.node, name, value.to_attribute().as_deref())?;
            }
        }
        self.committed = self.pending.clone();
        Ok(())
    }
}

/// Binding of an [`AttributeMap`] to an element. Only the differences
/// between the committed and pending maps reach the host.
pub struct ElementBinding {
    part: Part,
    state: Rc<RefCell<SpreadState>>,
    connected: bool,
}

impl ElementBinding {
    #[must_use]
    pub fn new(part: Part, value: Value) -> Self {
        let state = SpreadState {
            node: part.node(),
            pending: into_map(value),
            committed: AttributeMap::new(),
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

fn into_map(value: Value) -> AttributeMap {
    match value {
        Value::Attributes(map) => map,
        _ => AttributeMap::new(),
    }
}

impl Binding for ElementBinding {
    fn part(&self) -> &Part {
        &self.part
    }

    fn accepts(&self, value: &Value) -> bool {
        matches!(value, Value::Empty | Value::Attributes(_))
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
        let next = into_map(value);
        if state.pending == next {
            return Ok(());
        }
        state.pending = next;
        schedule(&self.state, &mut state.scheduled, cx);
        Ok(())
    }

    fn unbind(&mut self, cx: &UpdateContext) {
        let mut state = self.state.borrow_mut();
        if state.disconnected || state.pending.is_empty() {
            return;
        }
        state.pending = AttributeMap::new();
        schedule(&self.state, &mut state.scheduled, cx);
    }

    fn disconnect(&mut self) {
        self.state.borrow_mut().disconnected = true;
        self.connected = false;
    }

    fn commit(&mut self, cx: &CommitContext<'_>) -> Result<(), WeftError> {
        commit_now(&self.state, cx)
    }

    fn is_connected(&self) -> bool {
        self.connected
    }
}

impl fmt::Debug for ElementBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ElementBinding")
            .field("part", &self.part)
            .field("pending", &self.state.borrow().pending)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::updater::Updater;
    use weft_core::{HostTree, Priority};
    use weft_harness::{HostOp, ManualScheduler, MemoryHost};

    #[test]
    fn spread_applies_only_differences() {
        let host = MemoryHost::new();
        let updater = Updater::new(host.clone(), ManualScheduler::new());
        let el = host.create_element("a");
        let cx = updater.context(Priority::UserBlocking);

        let first = AttributeMap::new().with("href", "/home").with("class", "nav");
        let mut binding = ElementBinding::new(Part::Element { node: el }, first.into());
        binding.connect(&cx).unwrap();
        updater.flush_sync().unwrap();
        assert_eq!(host.attribute(el, "href").as_deref(), Some("/home"));
        host.take_ops();

        let second = AttributeMap::new().with("href", "/home").with("target", "_blank");
        binding.bind(second.into(), &cx).unwrap();
        updater.flush_sync().unwrap();
        let ops = host.take_ops();
        assert_eq!(ops.len(), 2, "class removed and target added: {ops:?}");
        assert!(ops.iter().all(|op| matches!(op, HostOp::SetAttribute { .. })));
        assert!(host.attribute(el, "class").is_none());
        assert_eq!(host.attribute(el, "target").as_deref(), Some("_blank"));

        binding.unbind(&cx);
        updater.flush_sync().unwrap();
        assert!(host.attribute(el, "href").is_none());
    }
}
