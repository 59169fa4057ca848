#![forbid(unsafe_code)]

//! Nested template instance at a child position.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use weft_core::{NodeId, ProtocolError, WeftError};

use super::{Binding, CommitState, Slot, anchor_parent, commit_now, disconnected, schedule};
use crate::effect::CommitContext;
use crate::part::Part;
use crate::template::{Template, TemplateResult};
use crate::updater::UpdateContext;
use crate::value::Value;

struct Instance {
    anchor: NodeId,
    /// Top-level nodes of the fragment.
    nodes: Vec<NodeId>,
    /// For each top-level node that is a child anchor, the hole it anchors.
    top_holes: Vec<Option<usize>>,
    holes: Vec<Slot>,
    pending_attached: bool,
    attached: bool,
    disconnected: bool,
    scheduled: bool,
}

impl Instance {
    /// Top-level region in document order: each top-level anchor is preceded
    /// by the content of its hole.
    fn sequence(&self, out: &mut Vec<NodeId>) {
        for (node, hole) in self.nodes.iter().zip(&self.top_holes) {
            if let Some(slot) = hole.and_then(|index| self.holes.get(index)) {
                slot.committed_nodes(out);
            }
            out.push(*node);
        }
    }

    fn first_node(&self) -> Option<NodeId> {
        let first = *self.nodes.first()?;
        let hole_start = self
            .top_holes
            .first()
            .copied()
            .flatten()
            .and_then(|index| self.holes.get(index))
            .and_then(Slot::first_committed_node);
        Some(hole_start.unwrap_or(first))
    }
}

impl CommitState for Instance {
    fn scheduled(&mut self) -> &mut bool {
        &mut self.scheduled
    }

    fn commit(&mut self, cx: &CommitContext<'_>) -> Result<(), WeftError> {
        let want = self.pending_attached && !self.disconnected;
        if want == self.attached {
            return Ok(());
        }
        let host = cx.host();
        let mut nodes = Vec::with_capacity(self.nodes.len());
        self.sequence(&mut nodes);
        if want {
            let parent = anchor_parent(cx, self.anchor)?;
            for node in nodes {
                host.insert_before(parent, node, Some(self.anchor))?;
            }
        } else {
            for node in nodes {
                host.remove(node)?;
            }
        }
        self.attached = want;
        Ok(())
    }
}

/// Binding of a [`TemplateResult`] to a child part.
///
/// The fragment is instantiated once at connect. Later results of the same
/// template only rebind the holes; a different template replaces the binding.
pub struct TemplateBinding {
    part: Part,
    template: Rc<dyn Template>,
    initial: Option<Vec<Value>>,
    state: Option<Rc<RefCell<Instance>>>,
    disconnected: bool,
}

impl TemplateBinding {
    #[must_use]
    pub fn new(part: Part, result: TemplateResult) -> Self {
        let template = Rc::clone(result.template());
        Self {
            part,
            template,
            initial: Some(result.into_values()),
            state: None,
            disconnected: false,
        }
    }

    fn check_count(&self, actual: usize) -> Result<(), WeftError> {
        let expected = self.template.hole_count();
        if expected == actual {
            Ok(())
        } else {
            Err(ProtocolError::HoleCountMismatch { expected, actual }.into())
        }
    }

    /// Number of holes with a live slot.
    #[must_use]
    pub fn hole_count(&self) -> usize {
        self.state.as_ref().map_or(0, |state| state.borrow().holes.len())
    }
}

impl Binding for TemplateBinding {
    fn part(&self) -> &Part {
        &self.part
    }

    fn accepts(&self, value: &Value) -> bool {
        match value {
            Value::Template(result) => std::ptr::addr_eq(
                Rc::as_ptr(result.template()),
                Rc::as_ptr(&self.template),
            ),
            _ => false,
        }
    }

    fn connect(&mut self, cx: &UpdateContext) -> Result<(), WeftError> {
        if self.disconnected {
            return Err(disconnected());
        }
        let values = self.initial.take().unwrap_or_default();
        self.check_count(values.len())?;
        let fragment = self.template.instantiate(cx.host())?;
        if fragment.parts.len() != values.len() {
            return Err(ProtocolError::HoleCountMismatch {
                expected: fragment.parts.len(),
                actual: values.len(),
            }
            .into());
        }
        let top_holes = fragment
            .nodes
            .iter()
            .map(|node| {
                fragment
                    .parts
                    .iter()
                    .position(|part| matches!(part, Part::ChildNode { anchor } if anchor == node))
            })
            .collect();
        let state = Rc::new(RefCell::new(Instance {
            anchor: self.part.node(),
            nodes: fragment.nodes,
            top_holes,
            holes: Vec::with_capacity(values.len()),
            pending_attached: true,
            attached: false,
            disconnected: false,
            scheduled: false,
        }));
        // The instance must be in place before its holes insert into it.
        {
            let mut instance = state.borrow_mut();
            schedule(&state, &mut instance.scheduled, cx);
        }
        self.state = Some(Rc::clone(&state));
        for (part, value) in fragment.parts.into_iter().zip(values) {
            let slot = Slot::connect(part, value, cx)?;
            state.borrow_mut().holes.push(slot);
        }
        Ok(())
    }

    fn bind(&mut self, value: Value, cx: &UpdateContext) -> Result<(), WeftError> {
        if self.disconnected {
            return Err(disconnected());
        }
        let values = match value {
            Value::Template(result) => result.into_values(),
            other => return Err(super::unsupported(&self.part, &other)),
        };
        self.check_count(values.len())?;
        let Some(state) = &self.state else {
            self.initial = Some(values);
            return self.connect(cx);
        };
        let mut instance = state.borrow_mut();
        if !instance.pending_attached {
            instance.pending_attached = true;
            schedule(state, &mut instance.scheduled, cx);
        }
        for (slot, value) in instance.holes.iter_mut().zip(values) {
            slot.bind(value, cx)?;
        }
        Ok(())
    }

    fn unbind(&mut self, cx: &UpdateContext) {
        let Some(state) = &self.state else { return };
        let mut instance = state.borrow_mut();
        if instance.disconnected {
            return;
        }
        if instance.pending_attached {
            instance.pending_attached = false;
            schedule(state, &mut instance.scheduled, cx);
        }
        for slot in &mut instance.holes {
            slot.unbind(cx);
        }
    }

    fn disconnect(&mut self) {
        self.disconnected = true;
        let Some(state) = &self.state else { return };
        let mut instance = state.borrow_mut();
        instance.disconnected = true;
        for slot in &mut instance.holes {
            slot.disconnect();
        }
    }

    fn commit(&mut self, cx: &CommitContext<'_>) -> Result<(), WeftError> {
        match &self.state {
            Some(state) => commit_now(state, cx),
            None => Ok(()),
        }
    }

    fn is_connected(&self) -> bool {
        self.state.is_some() && !self.disconnected
    }

    fn committed_nodes(&self, out: &mut Vec<NodeId>) {
        if let Some(state) = &self.state {
            let instance = state.borrow();
            if instance.attached {
                instance.sequence(out);
            }
        }
    }

    fn first_committed_node(&self) -> Option<NodeId> {
        let instance = self.state.as_ref()?.borrow();
        if instance.attached {
            instance.first_node()
        } else {
            None
        }
    }
}

impl fmt::Debug for TemplateBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TemplateBinding")
            .field("part", &self.part)
            .field("template", &self.template.name())
            .field("holes", &self.hole_count())
            .finish()
    }
}
