#![forbid(unsafe_code)]

//! In-memory host tree.
//!
//! [`MemoryHost`] implements [`HostTree`] over a node arena and records
//! every successful mutation as a [`HostOp`], so tests can assert both the
//! final tree (via [`MemoryHost::markup`]) and the exact mutations that
//! produced it.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt::{self, Write as _};
use std::rc::Rc;

use ahash::AHashMap;
use tracing::trace;
use weft_core::{HostError, HostEvent, HostTree, Listener, NodeId, NodeKind, Primitive};

/// One recorded host mutation.
#[derive(Debug, Clone, PartialEq)]
pub enum HostOp {
    Create {
        node: NodeId,
        kind: NodeKind,
    },
    Insert {
        parent: NodeId,
        node: NodeId,
        reference: Option<NodeId>,
    },
    Remove {
        parent: NodeId,
        node: NodeId,
    },
    SetText {
        node: NodeId,
        data: String,
    },
    SetAttribute {
        node: NodeId,
        name: String,
        value: Option<String>,
    },
    SetProperty {
        node: NodeId,
        name: String,
        value: Primitive,
    },
    AddListener {
        node: NodeId,
        event: String,
    },
    RemoveListener {
        node: NodeId,
        event: String,
    },
}

impl HostOp {
    /// The node the operation changed.
    #[must_use]
    pub fn node(&self) -> NodeId {
        match self {
            Self::Create { node, .. }
            | Self::Insert { node, .. }
            | Self::Remove { node, .. }
            | Self::SetText { node, .. }
            | Self::SetAttribute { node, .. }
            | Self::SetProperty { node, .. }
            | Self::AddListener { node, .. }
            | Self::RemoveListener { node, .. } => *node,
        }
    }

    /// Whether the operation changed tree structure.
    #[must_use]
    pub fn is_structural(&self) -> bool {
        matches!(self, Self::Insert { .. } | Self::Remove { .. })
    }
}

struct NodeData {
    kind: NodeKind,
    /// Tag for elements, data for text and comments.
    data: String,
    root: bool,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    attributes: BTreeMap<String, String>,
    properties: BTreeMap<String, Primitive>,
    listeners: AHashMap<String, Listener>,
}

impl NodeData {
    fn new(kind: NodeKind, data: &str) -> Self {
        Self {
            kind,
            data: data.to_owned(),
            root: false,
            parent: None,
            children: Vec::new(),
            attributes: BTreeMap::new(),
            properties: BTreeMap::new(),
            listeners: AHashMap::new(),
        }
    }
}

#[derive(Default)]
struct Tree {
    nodes: Vec<NodeData>,
    ops: Vec<HostOp>,
}

impl Tree {
    fn index(node: NodeId) -> usize {
        // Ids start at 1.
        node.raw().saturating_sub(1) as usize
    }

    fn get(&self, node: NodeId) -> Result<&NodeData, HostError> {
        if node.raw() == 0 {
            return Err(HostError::UnknownNode(node));
        }
        self.nodes
            .get(Self::index(node))
            .ok_or(HostError::UnknownNode(node))
    }

    fn get_mut(&mut self, node: NodeId) -> Result<&mut NodeData, HostError> {
        if node.raw() == 0 {
            return Err(HostError::UnknownNode(node));
        }
        self.nodes
            .get_mut(Self::index(node))
            .ok_or(HostError::UnknownNode(node))
    }

    fn create(&mut self, kind: NodeKind, data: &str) -> NodeId {
        self.nodes.push(NodeData::new(kind, data));
        let node = NodeId::from_raw(self.nodes.len() as u64);
        self.ops.push(HostOp::Create { node, kind });
        node
    }

    fn detach(&mut self, node: NodeId) -> Result<Option<NodeId>, HostError> {
        let Some(parent) = self.get(node)?.parent else {
            return Ok(None);
        };
        self.get_mut(parent)?.children.retain(|child| *child != node);
        self.get_mut(node)?.parent = None;
        Ok(Some(parent))
    }

    fn is_ancestor(&self, ancestor: NodeId, mut node: NodeId) -> bool {
        loop {
            if node == ancestor {
                return true;
            }
            match self.get(node).ok().and_then(|data| data.parent) {
                Some(parent) => node = parent,
                None => return false,
            }
        }
    }
}

/// [`HostTree`] backed by an in-memory arena.
#[derive(Default)]
pub struct MemoryHost {
    tree: RefCell<Tree>,
}

impl MemoryHost {
    #[must_use]
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    /// Create a `root` element that counts as attached to a document.
    pub fn create_root(&self) -> NodeId {
        let node = self.create_element("root");
        if let Ok(data) = self.tree.borrow_mut().get_mut(node) {
            data.root = true;
        }
        node
    }

    /// Every recorded operation since construction or the last
    /// [`take_ops`](Self::take_ops).
    #[must_use]
    pub fn ops(&self) -> Vec<HostOp> {
        self.tree.borrow().ops.clone()
    }

    /// Drain the operation log.
    pub fn take_ops(&self) -> Vec<HostOp> {
        std::mem::take(&mut self.tree.borrow_mut().ops)
    }

    #[must_use]
    pub fn node_count(&self) -> usize {
        self.tree.borrow().nodes.len()
    }

    #[must_use]
    pub fn kind(&self, node: NodeId) -> Option<NodeKind> {
        self.tree.borrow().get(node).ok().map(|data| data.kind)
    }

    /// Children of `node` in order, comments included.
    #[must_use]
    pub fn children(&self, node: NodeId) -> Vec<NodeId> {
        self.tree
            .borrow()
            .get(node)
            .map(|data| data.children.clone())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn attribute(&self, node: NodeId, name: &str) -> Option<String> {
        self.tree
            .borrow()
            .get(node)
            .ok()
            .and_then(|data| data.attributes.get(name).cloned())
    }

    #[must_use]
    pub fn property(&self, node: NodeId, name: &str) -> Option<Primitive> {
        self.tree
            .borrow()
            .get(node)
            .ok()
            .and_then(|data| data.properties.get(name).cloned())
    }

    #[must_use]
    pub fn has_listener(&self, node: NodeId, event: &str) -> bool {
        self.tree
            .borrow()
            .get(node)
            .is_ok_and(|data| data.listeners.contains_key(event))
    }

    /// Concatenated text of `node` and its descendants.
    #[must_use]
    pub fn text_content(&self, node: NodeId) -> String {
        let tree = self.tree.borrow();
        let mut out = String::new();
        collect_text(&tree, node, &mut out);
        out
    }

    /// Serialize the subtree at `node`. Comments are omitted; attributes
    /// appear in name order.
    #[must_use]
    pub fn markup(&self, node: NodeId) -> String {
        let tree = self.tree.borrow();
        let mut out = String::new();
        write_markup(&tree, node, &mut out);
        out
    }

    /// Deliver `event` to the listener registered on `node`. Returns whether
    /// a listener ran.
    pub fn dispatch(&self, node: NodeId, event: &str, detail: Primitive) -> bool {
        let listener = self
            .tree
            .borrow()
            .get(node)
            .ok()
            .and_then(|data| data.listeners.get(event).cloned());
        let Some(listener) = listener else {
            return false;
        };
        trace!(%node, event, "dispatching event");
        listener(&HostEvent {
            name: Rc::from(event),
            target: node,
            detail,
        });
        true
    }
}

fn collect_text(tree: &Tree, node: NodeId, out: &mut String) {
    let Ok(data) = tree.get(node) else { return };
    match data.kind {
        NodeKind::Text => out.push_str(&data.data),
        NodeKind::Comment => {}
        NodeKind::Element => {
            for child in &data.children {
                collect_text(tree, *child, out);
            }
        }
    }
}

fn write_markup(tree: &Tree, node: NodeId, out: &mut String) {
    let Ok(data) = tree.get(node) else { return };
    match data.kind {
        NodeKind::Text => out.push_str(&data.data),
        NodeKind::Comment => {}
        NodeKind::Element => {
            out.push('<');
            out.push_str(&data.data);
            for (name, value) in &data.attributes {
                let _ = write!(out, " {name}=\"{value}\"");
            }
            out.push('>');
            for child in &data.children {
                write_markup(tree, *child, out);
            }
            let _ = write!(out, "</{}>", data.data);
        }
    }
}

impl HostTree for MemoryHost {
    fn create_element(&self, tag: &str) -> NodeId {
        self.tree.borrow_mut().create(NodeKind::Element, tag)
    }

    fn create_text(&self, data: &str) -> NodeId {
        self.tree.borrow_mut().create(NodeKind::Text, data)
    }

    fn create_comment(&self, data: &str) -> NodeId {
        self.tree.borrow_mut().create(NodeKind::Comment, data)
    }

    fn insert_before(
        &self,
        parent: NodeId,
        node: NodeId,
        reference: Option<NodeId>,
    ) -> Result<(), HostError> {
        let mut tree = self.tree.borrow_mut();
        if tree.get(parent)?.kind != NodeKind::Element {
            return Err(HostError::InvalidNode(parent));
        }
        let current = tree.get(node)?.parent;
        if reference == Some(node) {
            // Inserting a node before itself leaves it in place.
            return if current == Some(parent) {
                Ok(())
            } else {
                Err(HostError::NotAChild { parent, node })
            };
        }
        if let Some(reference) = reference
            && tree.get(reference)?.parent != Some(parent)
        {
            return Err(HostError::NotAChild {
                parent,
                node: reference,
            });
        }
        if tree.is_ancestor(node, parent) {
            return Err(HostError::Cycle { parent, node });
        }
        tree.detach(node)?;
        let siblings = &mut tree.get_mut(parent)?.children;
        let at = reference
            .and_then(|reference| siblings.iter().position(|child| *child == reference))
            .unwrap_or(siblings.len());
        siblings.insert(at, node);
        tree.get_mut(node)?.parent = Some(parent);
        tree.ops.push(HostOp::Insert {
            parent,
            node,
            reference,
        });
        Ok(())
    }

    fn remove(&self, node: NodeId) -> Result<(), HostError> {
        let mut tree = self.tree.borrow_mut();
        if let Some(parent) = tree.detach(node)? {
            tree.ops.push(HostOp::Remove { parent, node });
        }
        Ok(())
    }

    fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.tree.borrow().get(node).ok().and_then(|data| data.parent)
    }

    fn is_attached(&self, node: NodeId) -> bool {
        let tree = self.tree.borrow();
        let mut cursor = node;
        loop {
            let Ok(data) = tree.get(cursor) else {
                return false;
            };
            if data.root {
                return true;
            }
            match data.parent {
                Some(parent) => cursor = parent,
                None => return false,
            }
        }
    }

    fn set_text(&self, node: NodeId, data: &str) -> Result<(), HostError> {
        let mut tree = self.tree.borrow_mut();
        let entry = tree.get_mut(node)?;
        if entry.kind == NodeKind::Element {
            return Err(HostError::InvalidNode(node));
        }
        data.clone_into(&mut entry.data);
        tree.ops.push(HostOp::SetText {
            node,
            data: data.to_owned(),
        });
        Ok(())
    }

    fn set_attribute(
        &self,
        node: NodeId,
        name: &str,
        value: Option<&str>,
    ) -> Result<(), HostError> {
        let mut tree = self.tree.borrow_mut();
        let entry = tree.get_mut(node)?;
        if entry.kind != NodeKind::Element {
            return Err(HostError::InvalidNode(node));
        }
        match value {
            Some(value) => {
                entry.attributes.insert(name.to_owned(), value.to_owned());
            }
            None => {
                entry.attributes.remove(name);
            }
        }
        tree.ops.push(HostOp::SetAttribute {
            node,
            name: name.to_owned(),
            value: value.map(str::to_owned),
        });
        Ok(())
    }

    fn set_property(&self, node: NodeId, name: &str, value: &Primitive) -> Result<(), HostError> {
        let mut tree = self.tree.borrow_mut();
        let entry = tree.get_mut(node)?;
        if entry.kind != NodeKind::Element {
            return Err(HostError::InvalidNode(node));
        }
        entry.properties.insert(name.to_owned(), value.clone());
        tree.ops.push(HostOp::SetProperty {
            node,
            name: name.to_owned(),
            value: value.clone(),
        });
        Ok(())
    }

    fn add_listener(&self, node: NodeId, event: &str, listener: Listener) -> Result<(), HostError> {
        let mut tree = self.tree.borrow_mut();
        let entry = tree.get_mut(node)?;
        if entry.kind != NodeKind::Element {
            return Err(HostError::InvalidNode(node));
        }
        entry.listeners.insert(event.to_owned(), listener);
        tree.ops.push(HostOp::AddListener {
            node,
            event: event.to_owned(),
        });
        Ok(())
    }

    fn remove_listener(&self, node: NodeId, event: &str) -> Result<(), HostError> {
        let mut tree = self.tree.borrow_mut();
        let removed = tree.get_mut(node)?.listeners.remove(event);
        if removed.is_some() {
            tree.ops.push(HostOp::RemoveListener {
                node,
                event: event.to_owned(),
            });
        }
        Ok(())
    }
}

impl fmt::Debug for MemoryHost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tree = self.tree.borrow();
        f.debug_struct("MemoryHost")
            .field("nodes", &tree.nodes.len())
            .field("ops", &tree.ops.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn insert_move_and_remove() {
        let host = MemoryHost::new();
        let root = host.create_root();
        let a = host.create_text("a");
        let b = host.create_text("b");
        host.insert_before(root, a, None).unwrap();
        host.insert_before(root, b, Some(a)).unwrap();
        assert_eq!(host.markup(root), "<root>ba</root>");
        assert!(host.is_attached(a));

        host.insert_before(root, b, None).unwrap();
        assert_eq!(host.markup(root), "<root>ab</root>");

        host.remove(a).unwrap();
        assert_eq!(host.children(root), vec![b]);
        assert!(!host.is_attached(a));
        host.take_ops();
        host.remove(a).unwrap();
        assert!(host.take_ops().is_empty(), "removing a detached node records nothing");
    }

    #[test]
    fn rejects_bad_references_and_cycles() {
        let host = MemoryHost::new();
        let root = host.create_root();
        let div = host.create_element("div");
        let stray = host.create_text("x");
        host.insert_before(root, div, None).unwrap();
        assert_eq!(
            host.insert_before(root, stray, Some(NodeId::from_raw(99))),
            Err(HostError::UnknownNode(NodeId::from_raw(99)))
        );
        let other = host.create_comment("");
        assert_eq!(
            host.insert_before(root, stray, Some(other)),
            Err(HostError::NotAChild { parent: root, node: other })
        );
        assert_eq!(
            host.insert_before(div, root, None),
            Err(HostError::Cycle { parent: div, node: root })
        );
        assert_eq!(host.insert_before(stray, div, None), Err(HostError::InvalidNode(stray)));
    }

    #[test]
    fn markup_skips_comments_and_sorts_attributes() {
        let host = MemoryHost::new();
        let root = host.create_root();
        let p = host.create_element("p");
        host.set_attribute(p, "title", Some("t")).unwrap();
        host.set_attribute(p, "class", Some("c")).unwrap();
        let anchor = host.create_comment("marker");
        let text = host.create_text("hi");
        host.insert_before(root, p, None).unwrap();
        host.insert_before(p, anchor, None).unwrap();
        host.insert_before(p, text, Some(anchor)).unwrap();
        assert_eq!(host.markup(root), r#"<root><p class="c" title="t">hi</p></root>"#);
        assert_eq!(host.text_content(root), "hi");
    }

    #[test]
    fn dispatch_reaches_listener() {
        let host = MemoryHost::new();
        let button = host.create_element("button");
        let hits = Rc::new(Cell::new(0));
        let counter = Rc::clone(&hits);
        host.add_listener(button, "click", Rc::new(move |_| counter.set(counter.get() + 1)))
            .unwrap();
        assert!(host.dispatch(button, "click", Primitive::Null));
        assert!(!host.dispatch(button, "keydown", Primitive::Null));
        assert_eq!(hits.get(), 1);

        host.remove_listener(button, "click").unwrap();
        assert!(!host.dispatch(button, "click", Primitive::Null));
    }
}
