#![forbid(unsafe_code)]

//! Bind locations.

use std::rc::Rc;

use weft_core::NodeId;

/// Immutable descriptor of one template hole's location in the host tree.
///
/// A part never changes after creation; the [`Binding`](crate::Binding)
/// attached to it carries all mutable state.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Part {
    /// A named attribute of an element.
    Attribute { node: NodeId, name: Rc<str> },
    /// A named property of an element.
    Property { node: NodeId, name: Rc<str> },
    /// An event listener slot of an element.
    Event { node: NodeId, name: Rc<str> },
    /// The element itself (attribute spread).
    Element { node: NodeId },
    /// A position among siblings, marked by an anchor the content is
    /// inserted before.
    ChildNode { anchor: NodeId },
    /// The text content of a bare text node.
    Node { node: NodeId },
}

impl Part {
    #[must_use]
    pub fn attribute(node: NodeId, name: impl Into<Rc<str>>) -> Self {
        Self::Attribute {
            node,
            name: name.into(),
        }
    }

    #[must_use]
    pub fn property(node: NodeId, name: impl Into<Rc<str>>) -> Self {
        Self::Property {
            node,
            name: name.into(),
        }
    }

    #[must_use]
    pub fn event(node: NodeId, name: impl Into<Rc<str>>) -> Self {
        Self::Event {
            node,
            name: name.into(),
        }
    }

    #[must_use]
    pub const fn child(anchor: NodeId) -> Self {
        Self::ChildNode { anchor }
    }

    /// The node the part is attached to (the anchor for child parts).
    #[must_use]
    pub fn node(&self) -> NodeId {
        match self {
            Self::Attribute { node, .. }
            | Self::Property { node, .. }
            | Self::Event { node, .. }
            | Self::Element { node }
            | Self::Node { node } => *node,
            Self::ChildNode { anchor } => *anchor,
        }
    }

    /// Attribute, property, or event name.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        match self {
            Self::Attribute { name, .. } | Self::Property { name, .. } | Self::Event { name, .. } => {
                Some(name)
            }
            _ => None,
        }
    }

    /// Short name of the variant, used in diagnostics.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Attribute { .. } => "attribute",
            Self::Property { .. } => "property",
            Self::Event { .. } => "event",
            Self::Element { .. } => "element",
            Self::ChildNode { .. } => "child-node",
            Self::Node { .. } => "node",
        }
    }
}
