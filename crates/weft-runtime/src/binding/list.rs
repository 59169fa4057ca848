#![forbid(unsafe_code)]

//! Keyed list of child values.
//!
//! Each item owns a comment anchor and a [`Slot`] whose content sits before
//! that anchor. Reconciliation records a plan of inserts, moves, and removals
//! which the list's own mutation effect replays in order at commit. The list
//! effect is always scheduled before any item it creates, so an item's anchor
//! is in place before the item's content inserts before it.
//!
//! # Invariants
//!
//! 1. After every completed bind, `items`, `keys`, and `values` have equal
//!    length.
//! 2. After every commit, `committed` mirrors the host order of item regions
//!    while attached.
//! 3. Items removed by reconciliation are disconnected immediately and their
//!    regions are removed by the list effect, never by the item.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use weft_core::{HostTree, NodeId, WeftError};

use super::{Binding, CommitState, Slot, anchor_parent, commit_now, disconnected, schedule};
use crate::effect::CommitContext;
use crate::part::Part;
use crate::reconcile::{ReconcileTarget, reconcile};
use crate::updater::UpdateContext;
use crate::value::{Key, ListValue, Value};

// ---------------------------------------------------------------------------
// Items
// ---------------------------------------------------------------------------

struct ItemInner {
    anchor: NodeId,
    slot: RefCell<Option<Slot>>,
}

#[derive(Clone)]
struct ListItem(Rc<ItemInner>);

impl ListItem {
    fn new(anchor: NodeId) -> Self {
        Self(Rc::new(ItemInner {
            anchor,
            slot: RefCell::new(None),
        }))
    }

    fn region(&self, out: &mut Vec<NodeId>) {
        if let Some(slot) = &*self.0.slot.borrow() {
            slot.committed_nodes(out);
        }
        out.push(self.0.anchor);
    }

    fn first_node(&self) -> NodeId {
        self.0
            .slot
            .borrow()
            .as_ref()
            .and_then(Slot::first_committed_node)
            .unwrap_or(self.0.anchor)
    }

    fn bind(&self, value: Value, cx: &UpdateContext) -> Result<(), WeftError> {
        let mut slot = self.0.slot.borrow_mut();
        if let Some(current) = slot.as_mut() {
            current.bind(value, cx)
        } else {
            *slot = Some(Slot::connect(Part::child(self.0.anchor), value, cx)?);
            Ok(())
        }
    }

    fn unbind(&self, cx: &UpdateContext) {
        if let Some(slot) = self.0.slot.borrow_mut().as_mut() {
            slot.unbind(cx);
        }
    }

    fn disconnect(&self) {
        if let Some(slot) = self.0.slot.borrow_mut().as_mut() {
            slot.disconnect();
        }
    }
}

enum ListOp {
    Insert {
        item: ListItem,
        before: Option<ListItem>,
    },
    Move {
        item: ListItem,
        before: Option<ListItem>,
    },
    Remove {
        item: ListItem,
    },
}

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

struct ListState {
    anchor: NodeId,
    items: Vec<ListItem>,
    keys: Vec<Key>,
    values: Vec<Value>,
    ops: Vec<ListOp>,
    committed: Vec<ListItem>,
    pending_attached: bool,
    attached: bool,
    disconnected: bool,
    scheduled: bool,
}

impl ListState {
    fn apply(&self, host: &dyn HostTree, parent: NodeId, op: ListOp) -> Result<(), WeftError> {
        let mut nodes = Vec::new();
        match op {
            ListOp::Insert { item, before } | ListOp::Move { item, before } => {
                let reference = before.as_ref().map_or(self.anchor, ListItem::first_node);
                item.region(&mut nodes);
                for node in nodes {
                    host.insert_before(parent, node, Some(reference))?;
                }
            }
            ListOp::Remove { item } => {
                item.region(&mut nodes);
                for node in nodes {
                    host.remove(node)?;
                }
            }
        }
        Ok(())
    }
}

impl CommitState for ListState {
    fn scheduled(&mut self) -> &mut bool {
        &mut self.scheduled
    }

    fn commit(&mut self, cx: &CommitContext<'_>) -> Result<(), WeftError> {
        let host = cx.host();
        let want = self.pending_attached && !self.disconnected;
        let ops = std::mem::take(&mut self.ops);

        if !want {
            if self.attached {
                let mut nodes = Vec::new();
                for item in self.committed.drain(..) {
                    item.region(&mut nodes);
                }
                for node in nodes {
                    host.remove(node)?;
                }
                self.attached = false;
            }
            return Ok(());
        }

        let parent = anchor_parent(cx, self.anchor)?;
        if self.attached {
            // The replayed plan ends in `items` order.
            let replayed = ops.into_iter().try_for_each(|op| self.apply(host, parent, op));
            self.committed = self.items.clone();
            replayed?;
        } else {
            let mut nodes = Vec::new();
            for item in &self.items {
                item.region(&mut nodes);
            }
            for node in nodes {
                host.insert_before(parent, node, Some(self.anchor))?;
            }
            self.committed = self.items.clone();
            self.attached = true;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Reconcile target
// ---------------------------------------------------------------------------

struct ListTarget<'a> {
    cx: &'a UpdateContext,
    shared: &'a Rc<RefCell<ListState>>,
    ops: &'a mut Vec<ListOp>,
    scheduled: &'a mut bool,
    values: &'a [Value],
    error: Option<WeftError>,
}

impl ListTarget<'_> {
    fn push(&mut self, op: ListOp) {
        schedule(self.shared, self.scheduled, self.cx);
        self.ops.push(op);
    }

    fn record(&mut self, result: Result<(), WeftError>) {
        if let Err(err) = result
            && self.error.is_none()
        {
            self.error = Some(err);
        }
    }

    fn value(&self, index: usize) -> Value {
        self.values.get(index).cloned().unwrap_or_default()
    }
}

impl ReconcileTarget<ListItem> for ListTarget<'_> {
    fn create(&mut self, index: usize, before: Option<&ListItem>) -> ListItem {
        let item = ListItem::new(self.cx.host().create_comment(""));
        self.push(ListOp::Insert {
            item: item.clone(),
            before: before.cloned(),
        });
        let result = item.bind(self.value(index), self.cx);
        self.record(result);
        item
    }

    fn update(&mut self, item: &ListItem, index: usize) {
        let result = item.bind(self.value(index), self.cx);
        self.record(result);
    }

    fn relocate(&mut self, item: &ListItem, before: Option<&ListItem>) {
        self.push(ListOp::Move {
            item: item.clone(),
            before: before.cloned(),
        });
    }

    fn remove(&mut self, item: ListItem) {
        item.disconnect();
        self.push(ListOp::Remove { item });
    }
}

// ---------------------------------------------------------------------------
// Binding
// ---------------------------------------------------------------------------

/// Binding of a [`ListValue`] to a child part.
pub struct ListBinding {
    part: Part,
    initial: Option<ListValue>,
    state: Rc<RefCell<ListState>>,
    connected: bool,
}

impl ListBinding {
    #[must_use]
    pub fn new(part: Part, list: ListValue) -> Self {
        let state = ListState {
            anchor: part.node(),
            items: Vec::new(),
            keys: Vec::new(),
            values: Vec::new(),
            ops: Vec::new(),
            committed: Vec::new(),
            pending_attached: false,
            attached: false,
            disconnected: false,
            scheduled: false,
        };
        Self {
            part,
            initial: Some(list),
            state: Rc::new(RefCell::new(state)),
            connected: false,
        }
    }

    /// Number of live item bindings.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.borrow().items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Keys of the last bound list.
    #[must_use]
    pub fn keys(&self) -> Vec<Key> {
        self.state.borrow().keys.clone()
    }

    fn update(&mut self, list: ListValue, cx: &UpdateContext) -> Result<(), WeftError> {
        let mut guard = self.state.borrow_mut();
        let state = &mut *guard;
        if state.disconnected {
            return Err(disconnected());
        }
        if !state.pending_attached {
            state.pending_attached = true;
            schedule(&self.state, &mut state.scheduled, cx);
        }
        let (keys, values) = list.into_parts();
        let old_items = std::mem::take(&mut state.items);
        let old_keys = std::mem::take(&mut state.keys);
        let mut target = ListTarget {
            cx,
            shared: &self.state,
            ops: &mut state.ops,
            scheduled: &mut state.scheduled,
            values: &values,
            error: None,
        };
        let items = reconcile(&old_keys, old_items, &keys, &mut target);
        let error = target.error;
        state.items = items;
        state.keys = keys;
        state.values = values;
        debug_assert_eq!(state.items.len(), state.keys.len());
        error.map_or(Ok(()), Err)
    }
}

impl Binding for ListBinding {
    fn part(&self) -> &Part {
        &self.part
    }

    fn accepts(&self, value: &Value) -> bool {
        matches!(value, Value::List(_))
    }

    fn connect(&mut self, cx: &UpdateContext) -> Result<(), WeftError> {
        let list = self.initial.take().unwrap_or_default();
        self.connected = true;
        self.update(list, cx)
    }

    fn bind(&mut self, value: Value, cx: &UpdateContext) -> Result<(), WeftError> {
        match value {
            Value::List(list) => self.update(list, cx),
            other => Err(super::unsupported(&self.part, &other)),
        }
    }

    fn unbind(&mut self, cx: &UpdateContext) {
        let mut guard = self.state.borrow_mut();
        let state = &mut *guard;
        if state.disconnected {
            return;
        }
        if state.pending_attached {
            state.pending_attached = false;
            schedule(&self.state, &mut state.scheduled, cx);
        }
        for item in &state.items {
            item.unbind(cx);
        }
    }

    fn disconnect(&mut self) {
        let mut state = self.state.borrow_mut();
        state.disconnected = true;
        for item in &state.items {
            item.disconnect();
        }
        self.connected = false;
    }

    fn commit(&mut self, cx: &CommitContext<'_>) -> Result<(), WeftError> {
        commit_now(&self.state, cx)
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn committed_nodes(&self, out: &mut Vec<NodeId>) {
        let state = self.state.borrow();
        if state.attached {
            for item in &state.committed {
                item.region(out);
            }
        }
    }

    fn first_committed_node(&self) -> Option<NodeId> {
        let state = self.state.borrow();
        if state.attached {
            state.committed.first().map(ListItem::first_node)
        } else {
            None
        }
    }
}

impl fmt::Debug for ListBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.borrow();
        f.debug_struct("ListBinding")
            .field("part", &self.part)
            .field("keys", &state.keys)
            .field("values", &state.values.len())
            .field("pending_ops", &state.ops.len())
            .finish()
    }
}
