#![forbid(unsafe_code)]

//! Attribute, property, and text-content bindings.

use std::cell::RefCell;
use std::fmt;
use std::marker::PhantomData;
use std::rc::Rc;

use weft_core::{HostError, HostTree, NodeId, Primitive, WeftError};

use super::{Binding, CommitState, commit_now, disconnected, schedule};
use crate::effect::CommitContext;
use crate::part::Part;
use crate::updater::UpdateContext;
use crate::value::Value;

/// Where a scalar binding writes.
pub trait ScalarTarget: 'static {
    /// Write `value` (or clear when `None`).
    fn write(
        host: &dyn HostTree,
        node: NodeId,
        name: &str,
        value: Option<&Primitive>,
    ) -> Result<(), HostError>;
}

/// Writes element attributes. `None`, `Null`, and `false` remove the
/// attribute.
#[derive(Debug)]
pub struct AttributeTarget;

impl ScalarTarget for AttributeTarget {
    fn write(
        host: &dyn HostTree,
        node: NodeId,
        name: &str,
        value: Option<&Primitive>,
    ) -> Result<(), HostError> {
        let rendered = value.and_then(Primitive::to_attribute);
        host.set_attribute(node, name, rendered.as_deref())
    }
}

/// Writes element properties. Clearing writes `Null`.
#[derive(Debug)]
pub struct PropertyTarget;

impl ScalarTarget for PropertyTarget {
    fn write(
        host: &dyn HostTree,
        node: NodeId,
        name: &str,
        value: Option<&Primitive>,
    ) -> Result<(), HostError> {
        host.set_property(node, name, value.unwrap_or(&Primitive::Null))
    }
}

/// Writes the data of a bare text node.
#[derive(Debug)]
pub struct TextContentTarget;

impl ScalarTarget for TextContentTarget {
    fn write(
        host: &dyn HostTree,
        node: NodeId,
        _name: &str,
        value: Option<&Primitive>,
    ) -> Result<(), HostError> {
        let data = value.map(Primitive::to_text).unwrap_or_default();
        host.set_text(node, &data)
    }
}

pub type AttributeBinding = ScalarBinding<AttributeTarget>;
pub type PropertyBinding = ScalarBinding<PropertyTarget>;
pub type NodeBinding = ScalarBinding<TextContentTarget>;

struct ScalarState<T> {
    node: NodeId,
    name: Rc<str>,
    pending: Option<Primitive>,
    /// `None` until the first write.
    committed: Option<Option<Primitive>>,
    disconnected: bool,
    scheduled: bool,
    _target: PhantomData<fn() -> T>,
}

impl<T: ScalarTarget> CommitState for ScalarState<T> {
    fn scheduled(&mut self) -> &mut bool {
        &mut self.scheduled
    }

    fn commit(&mut self, cx: &CommitContext<'_>) -> Result<(), WeftError> {
        if self.disconnected {
            return Ok(());
        }
        let unchanged = match &self.committed {
            Some(committed) => *committed == self.pending,
            None => self.pending.is_none(),
        };
        if unchanged {
            return Ok(());
        }
        T::write(cx.host(), self.node, &self.name, self.pending.as_ref())?;
        self.committed = Some(self.pending.clone());
        Ok(())
    }
}

/// Binding of a primitive to one named slot of a node.
pub struct ScalarBinding<T: ScalarTarget> {
    part: Part,
    state: Rc<RefCell<ScalarState<T>>>,
    connected: bool,
}

impl<T: ScalarTarget> ScalarBinding<T> {
    /// Unconnected binding of `value` (empty or primitive) at `part`.
    #[must_use]
    pub fn new(part: Part, value: Value) -> Self {
        let state = ScalarState {
            node: part.node(),
            name: Rc::from(part.name().unwrap_or_default()),
            pending: into_primitive(value),
            committed: None,
            disconnected: false,
            scheduled: false,
            _target: PhantomData,
        };
        Self {
            part,
            state: Rc::new(RefCell::new(state)),
            connected: false,
        }
    }

    /// Value that will be written at the next commit.
    #[must_use]
    pub fn pending(&self) -> Option<Primitive> {
        self.state.borrow().pending.clone()
    }
}

fn into_primitive(value: Value) -> Option<Primitive> {
    match value {
        Value::Primitive(p) => Some(p),
        _ => None,
    }
}

impl<T: ScalarTarget> Binding for ScalarBinding<T> {
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
        let next = into_primitive(value);
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
}

impl<T: ScalarTarget> fmt::Debug for ScalarBinding<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.borrow();
        f.debug_struct("ScalarBinding")
            .field("part", &self.part)
            .field("pending", &state.pending)
            .field("scheduled", &state.scheduled)
            .finish()
    }
}
