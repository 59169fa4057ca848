#![forbid(unsafe_code)]

//! Primitive content at a child position.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use weft_core::{NodeId, Primitive, WeftError};

use super::{Binding, CommitState, anchor_parent, commit_now, disconnected, schedule};
use crate::effect::CommitContext;
use crate::part::Part;
use crate::updater::UpdateContext;
use crate::value::Value;

struct TextState {
    anchor: NodeId,
    /// Created on first commit.
    node: Option<NodeId>,
    pending: Option<String>,
    committed: Option<String>,
    attached: bool,
    disconnected: bool,
    scheduled: bool,
}

impl CommitState for TextState {
    fn scheduled(&mut self) -> &mut bool {
        &mut self.scheduled
    }

    fn commit(&mut self, cx: &CommitContext<'_>) -> Result<(), WeftError> {
        let host = cx.host();
        let want = if self.disconnected {
            None
        } else {
            self.pending.clone()
        };
        let Some(data) = want else {
            if self.attached
                && let Some(node) = self.node
            {
                host.remove(node)?;
                self.attached = false;
            }
            return Ok(());
        };
        let node = match self.node {
            Some(node) => {
                if self.committed.as_deref() != Some(data.as_str()) {
                    host.set_text(node, &data)?;
                }
                node
            }
            None => {
                let node = host.create_text(&data);
                self.node = Some(node);
                node
            }
        };
        self.committed = Some(data);
        if !self.attached {
            let parent = anchor_parent(cx, self.anchor)?;
            host.insert_before(parent, node, Some(self.anchor))?;
            self.attached = true;
        }
        Ok(())
    }
}

/// A text node inserted before a child anchor. `Empty` and `Null` render
/// nothing.
pub struct TextBinding {
    part: Part,
    state: Rc<RefCell<TextState>>,
    connected: bool,
}

impl TextBinding {
    #[must_use]
    pub fn new(part: Part, value: Value) -> Self {
        let state = TextState {
            anchor: part.node(),
            node: None,
            pending: into_text(value),
            committed: None,
            attached: false,
            disconnected: false,
            scheduled: false,
        };
        Self {
            part,
            state: Rc::new(RefCell::new(state)),
            connected: false,
        }
    }

    /// The host text node, once created.
    #[must_use]
    pub fn node(&self) -> Option<NodeId> {
        self.state.borrow().node
    }
}

fn into_text(value: Value) -> Option<String> {
    match value {
        Value::Primitive(Primitive::Null) | Value::Empty => None,
        Value::Primitive(p) => Some(p.to_text()),
        _ => None,
    }
}

impl Binding for TextBinding {
    fn part(&self) -> &Part {
        &self.part
    }

    fn accepts(&self, value: &Value) -> bool {
        matches!(value, Value::Empty | Value::Primitive(_))
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
        let next = into_text(value);
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
        self.state.borrow_mut().disconnected = true;
        self.connected = false;
    }

    fn commit(&mut self, cx: &CommitContext<'_>) -> Result<(), WeftError> {
        commit_now(&self.state, cx)
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn committed_nodes(&self, out: &mut Vec<NodeId>) {
        out.extend(self.first_committed_node());
    }

    fn first_committed_node(&self) -> Option<NodeId> {
        let state = self.state.borrow();
        state.node.filter(|_| state.attached)
    }
}

impl fmt::Debug for TextBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.borrow();
        f.debug_struct("TextBinding")
            .field("anchor", &state.anchor)
            .field("pending", &state.pending)
            .field("attached", &state.attached)
            .finish()
    }
}
