#![forbid(unsafe_code)]

//! The binding protocol.
//!
//! A [`Binding`] pairs one [`Part`] with the value currently bound to it and
//! owns whatever host nodes it inserted. Bindings never touch the host tree
//! while connecting or binding; they record the desired state and schedule a
//! mutation effect that brings the host in line when it commits.
//!
//! # Lifecycle
//!
//! ```text
//! unconnected ──connect──▶ connected ──bind──▶ connected ──unbind──▶ unbound
//!                               ▲                                     │
//!                               └───────────────bind──────────────────┘
//!                         any state ──disconnect──▶ disconnected (final)
//! ```
//!
//! # Invariants
//!
//! | Property | Guarantee |
//! |----------|-----------|
//! | Effects | At most one pending mutation effect per binding |
//! | Idempotence | Binding an equal value schedules nothing |
//! | Cancellation | `unbind` then `bind` before commit performs no removal |
//! | Final state | Only the state at commit time is observable in the host |
//! | Disconnect | Schedules nothing; pending effects converge to "removed" |
//!
//! # Failure Modes
//!
//! | Condition | Error |
//! |-----------|-------|
//! | Value kind does not fit the part | [`ProtocolError::UnsupportedValue`] |
//! | Template values and holes differ in count | [`ProtocolError::HoleCountMismatch`] |
//! | Use after `disconnect` | [`ProtocolError::DisconnectedBinding`] |
//! | Child anchor has no parent at commit | [`ProtocolError::DetachedAnchor`] |

mod block;
mod element;
mod event;
mod list;
mod scalar;
mod signal;
mod template;
mod text;

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use smallvec::SmallVec;
use weft_core::{CommitPhase, NodeId, ProtocolError, WeftError};

use crate::effect::{CommitContext, Effect};
use crate::part::Part;
use crate::updater::UpdateContext;
use crate::value::Value;

pub use block::BlockBinding;
pub use element::ElementBinding;
pub use event::EventBinding;
pub use list::ListBinding;
pub use scalar::{
    AttributeBinding, AttributeTarget, NodeBinding, PropertyBinding, PropertyTarget,
    ScalarBinding, ScalarTarget, TextContentTarget,
};
pub use signal::SignalBinding;
pub use template::TemplateBinding;
pub use text::TextBinding;

// ---------------------------------------------------------------------------
// Binding trait
// ---------------------------------------------------------------------------

/// Mutable pairing of a value with a [`Part`].
pub trait Binding: fmt::Debug {
    fn part(&self) -> &Part;

    /// Whether `value` can be bound without replacing this binding.
    fn accepts(&self, value: &Value) -> bool;

    /// Compute the initial representation and schedule its insertion.
    fn connect(&mut self, cx: &UpdateContext) -> Result<(), WeftError>;

    /// Bind a new value. Equal values are a no-op.
    fn bind(&mut self, value: Value, cx: &UpdateContext) -> Result<(), WeftError>;

    /// Schedule removal. A later `bind` before commit cancels it.
    fn unbind(&mut self, cx: &UpdateContext);

    /// Release resources recursively without scheduling host mutations.
    fn disconnect(&mut self);

    /// Apply pending state to the host now.
    fn commit(&mut self, cx: &CommitContext<'_>) -> Result<(), WeftError>;

    fn is_connected(&self) -> bool;

    /// Append the top-level host nodes this binding has committed, in
    /// document order.
    fn committed_nodes(&self, _out: &mut Vec<NodeId>) {}

    /// First committed top-level node, if any.
    fn first_committed_node(&self) -> Option<NodeId> {
        None
    }

    /// First node of the binding's region. Falls back to the part's node.
    fn start_node(&self) -> NodeId {
        self.first_committed_node()
            .unwrap_or_else(|| self.end_node())
    }

    /// Last node of the binding's region: the part's node, which for child
    /// parts is the anchor the content sits before.
    fn end_node(&self) -> NodeId {
        self.part().node()
    }
}

// ---------------------------------------------------------------------------
// Classification
// ---------------------------------------------------------------------------

/// Pick the binding kind for `value` at `part`.
///
/// This is the only place a value is classified. The returned binding is
/// unconnected.
pub fn resolve_binding(part: Part, value: Value) -> Result<Box<dyn Binding>, WeftError> {
    let binding: Box<dyn Binding> = match (&part, value) {
        (Part::Event { .. } | Part::Element { .. }, Value::Signal(signal)) => {
            return Err(unsupported(&part, &Value::Signal(signal)));
        }
        (_, Value::Signal(signal)) => Box::new(SignalBinding::new(part, signal)),
        (Part::Attribute { .. }, value @ (Value::Empty | Value::Primitive(_))) => {
            Box::new(AttributeBinding::new(part, value))
        }
        (Part::Property { .. }, value @ (Value::Empty | Value::Primitive(_))) => {
            Box::new(PropertyBinding::new(part, value))
        }
        (Part::Node { .. }, value @ (Value::Empty | Value::Primitive(_))) => {
            Box::new(NodeBinding::new(part, value))
        }
        (Part::Event { .. }, value @ (Value::Empty | Value::Handler(_))) => {
            Box::new(EventBinding::new(part, value))
        }
        (Part::Element { .. }, value @ (Value::Empty | Value::Attributes(_))) => {
            Box::new(ElementBinding::new(part, value))
        }
        (Part::ChildNode { .. }, value @ (Value::Empty | Value::Primitive(_))) => {
            Box::new(TextBinding::new(part, value))
        }
        (Part::ChildNode { .. }, Value::Template(result)) => {
            Box::new(TemplateBinding::new(part, result))
        }
        (Part::ChildNode { .. }, Value::List(list)) => Box::new(ListBinding::new(part, list)),
        (Part::ChildNode { .. }, Value::Block(block)) => Box::new(BlockBinding::new(part, block)),
        (_, value) => return Err(unsupported(&part, &value)),
    };
    Ok(binding)
}

pub(crate) fn unsupported(part: &Part, value: &Value) -> WeftError {
    ProtocolError::UnsupportedValue {
        part: part.kind(),
        value: value.kind(),
    }
    .into()
}

// ---------------------------------------------------------------------------
// Slot
// ---------------------------------------------------------------------------

/// Owner of the binding for one hole.
///
/// Binding a value the current binding does not accept replaces it: the old
/// binding is unbound and disconnected, then kept as *retired* until its
/// removal commits so region queries still see its nodes.
pub struct Slot {
    current: Box<dyn Binding>,
    retired: SmallVec<[Box<dyn Binding>; 1]>,
}

impl Slot {
    /// Resolve and connect a binding for `value` at `part`.
    pub fn connect(part: Part, value: Value, cx: &UpdateContext) -> Result<Self, WeftError> {
        let mut current = resolve_binding(part, value)?;
        current.connect(cx)?;
        Ok(Self {
            current,
            retired: SmallVec::new(),
        })
    }

    pub fn bind(&mut self, value: Value, cx: &UpdateContext) -> Result<(), WeftError> {
        if self.current.accepts(&value) {
            return self.current.bind(value, cx);
        }
        let next = resolve_binding(self.current.part().clone(), value)?;
        self.retired.retain(|binding| binding.first_committed_node().is_some());
        let mut old = std::mem::replace(&mut self.current, next);
        old.unbind(cx);
        old.disconnect();
        self.retired.push(old);
        self.current.connect(cx)
    }

    pub fn unbind(&mut self, cx: &UpdateContext) {
        self.current.unbind(cx);
    }

    pub fn disconnect(&mut self) {
        self.current.disconnect();
        for retired in &mut self.retired {
            retired.disconnect();
        }
    }

    #[must_use]
    pub fn part(&self) -> &Part {
        self.current.part()
    }

    #[must_use]
    pub fn binding(&self) -> &dyn Binding {
        &*self.current
    }

    pub fn binding_mut(&mut self) -> &mut dyn Binding {
        &mut *self.current
    }

    pub fn committed_nodes(&self, out: &mut Vec<NodeId>) {
        for retired in &self.retired {
            retired.committed_nodes(out);
        }
        self.current.committed_nodes(out);
    }

    #[must_use]
    pub fn first_committed_node(&self) -> Option<NodeId> {
        self.retired
            .iter()
            .find_map(|binding| binding.first_committed_node())
            .or_else(|| self.current.first_committed_node())
    }

    #[must_use]
    pub fn start_node(&self) -> NodeId {
        self.first_committed_node()
            .unwrap_or_else(|| self.current.end_node())
    }

    #[must_use]
    pub fn end_node(&self) -> NodeId {
        self.current.end_node()
    }
}

impl fmt::Debug for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Slot")
            .field("current", &self.current)
            .field("retired", &self.retired.len())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Shared commit plumbing
// ---------------------------------------------------------------------------

/// Binding state that commits through a scheduled mutation effect.
pub(crate) trait CommitState: 'static {
    fn scheduled(&mut self) -> &mut bool;
    fn commit(&mut self, cx: &CommitContext<'_>) -> Result<(), WeftError>;
}

struct StateCommit<S>(Rc<RefCell<S>>);

impl<S: CommitState> Effect for StateCommit<S> {
    fn commit(self: Box<Self>, cx: &CommitContext<'_>) -> Result<(), WeftError> {
        let mut state = self.0.borrow_mut();
        *state.scheduled() = false;
        state.commit(cx)
    }
}

/// Enqueue one mutation effect for `state` unless one is pending.
///
/// `scheduled` is the flag inside the state the caller already borrowed.
pub(crate) fn schedule<S: CommitState>(
    state: &Rc<RefCell<S>>,
    scheduled: &mut bool,
    cx: &UpdateContext,
) {
    if *scheduled {
        return;
    }
    *scheduled = true;
    cx.enqueue_effect(Box::new(StateCommit(Rc::clone(state))), CommitPhase::Mutation);
}

/// Commit `state` directly, outside the effect queue.
pub(crate) fn commit_now<S: CommitState>(
    state: &Rc<RefCell<S>>,
    cx: &CommitContext<'_>,
) -> Result<(), WeftError> {
    state.borrow_mut().commit(cx)
}

pub(crate) fn disconnected() -> WeftError {
    ProtocolError::DisconnectedBinding.into()
}

/// Parent of a child anchor, required for insertion.
pub(crate) fn anchor_parent(cx: &CommitContext<'_>, anchor: NodeId) -> Result<NodeId, WeftError> {
    cx.host()
        .parent(anchor)
        .ok_or_else(|| ProtocolError::DetachedAnchor(anchor).into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::{Blueprint, element, hole};
    use crate::updater::Updater;
    use crate::value::{AttributeMap, EventHandler, ListValue};
    use weft_core::{HostTree, NodeId, Priority};
    use weft_harness::{ManualScheduler, MemoryHost};
    use weft_reactive::Atom;

    fn part_kinds() -> Vec<Part> {
        let n = NodeId::from_raw(1);
        vec![
            Part::attribute(n, "a"),
            Part::property(n, "p"),
            Part::event(n, "click"),
            Part::Element { node: n },
            Part::child(n),
            Part::Node { node: n },
        ]
    }

    #[test]
    fn classification_table() {
        let card = Blueprint::new("card", [element("b")]);
        let cases: Vec<(Value, [bool; 6])> = vec![
            (Value::Empty, [true, true, true, true, true, true]),
            (Value::from("x"), [true, true, false, false, true, true]),
            (card.result(Vec::new()).into(), [false, false, false, false, true, false]),
            (ListValue::new().into(), [false, false, false, false, true, false]),
            (Atom::new(1).into(), [true, true, false, false, true, true]),
            (EventHandler::new(|_| {}).into(), [false, false, true, false, false, false]),
            (AttributeMap::new().into(), [false, false, false, true, false, false]),
        ];
        for (value, expected) in cases {
            for (part, ok) in part_kinds().into_iter().zip(expected) {
                let result = resolve_binding(part.clone(), value.clone());
                assert_eq!(result.is_ok(), ok, "{} into {}", value.kind(), part.kind());
                if let Err(err) = result {
                    assert!(matches!(
                        err.as_protocol(),
                        Some(ProtocolError::UnsupportedValue { .. })
                    ));
                }
            }
        }
    }

    #[test]
    fn resolved_bindings_are_debuggable() {
        let n = NodeId::from_raw(1);
        let text = resolve_binding(Part::child(n), "x".into()).unwrap();
        assert!(format!("{text:?}").starts_with("TextBinding"));

        let err = resolve_binding(Part::event(n, "click"), "x".into()).unwrap_err();
        assert!(matches!(
            err.as_protocol(),
            Some(ProtocolError::UnsupportedValue { part: "event", .. })
        ));
    }

    #[test]
    fn slot_swaps_on_shape_change_and_keeps_order() {
        let host = MemoryHost::new();
        let scheduler = ManualScheduler::new();
        let updater = Updater::new(host.clone(), scheduler.clone());
        let root = host.create_root();
        let anchor = host.create_comment("");
        host.insert_before(root, anchor, None).unwrap();
        let cx = updater.context(Priority::UserBlocking);

        let mut slot = Slot::connect(Part::child(anchor), "hello".into(), &cx).unwrap();
        updater.flush_sync().unwrap();
        assert_eq!(host.markup(root), "<root>hello</root>");

        let card = Blueprint::new("card", [element("b").child(hole())]);
        slot.bind(card.result(vec!["bold".into()]).into(), &cx).unwrap();
        updater.flush_sync().unwrap();
        assert_eq!(host.markup(root), "<root><b>bold</b></root>");
        assert_eq!(slot.end_node(), anchor);
        assert_ne!(slot.start_node(), anchor);

        slot.bind(Value::Empty, &cx).unwrap();
        updater.flush_sync().unwrap();
        assert_eq!(host.markup(root), "<root></root>");
        assert_eq!(slot.start_node(), anchor, "empty binding resolves to its anchor");
    }

    #[test]
    fn incompatible_rebind_fails_without_replacing() {
        let host = MemoryHost::new();
        let updater = Updater::new(host.clone(), ManualScheduler::new());
        let el = host.create_element("div");
        let cx = updater.context(Priority::UserBlocking);
        let mut slot = Slot::connect(Part::attribute(el, "title"), "a".into(), &cx).unwrap();
        let err = slot.bind(ListValue::new().into(), &cx).unwrap_err();
        assert!(matches!(
            err.as_protocol(),
            Some(ProtocolError::UnsupportedValue {
                part: "attribute",
                value: "list"
            })
        ));
        assert_eq!(slot.part().kind(), "attribute");
    }
}
