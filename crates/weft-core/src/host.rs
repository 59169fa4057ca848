#![forbid(unsafe_code)]

//! Host tree capability.
//!
//! [`HostTree`] is the only way the rendering core reaches the document it
//! renders into. Node handles are opaque [`NodeId`]s allocated by the host.
//!
//! # Invariants
//!
//! 1. A node has at most one parent. Inserting a node that already has a
//!    parent moves it.
//! 2. [`HostTree::remove`] on a node without a parent is a no-op.
//! 3. Creation never attaches: freshly created nodes have no parent until
//!    [`HostTree::insert_before`] places them.
//!
//! # Failure Modes
//!
//! | Failure | Cause | Error |
//! |---------|-------|-------|
//! | Unknown handle | Node id never allocated by this host | [`HostError::UnknownNode`] |
//! | Bad reference | `reference` is not a child of `parent` | [`HostError::NotAChild`] |
//! | Cycle | Inserting an ancestor below its descendant | [`HostError::Cycle`] |

use std::fmt;
use std::rc::Rc;

use crate::error::HostError;

/// Opaque handle to a node owned by a [`HostTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u64);

impl NodeId {
    /// Wrap a raw host handle.
    #[must_use]
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// The raw host handle.
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Kind of a host node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Element,
    Text,
    Comment,
}

/// Scalar value written to attributes, properties, and text.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Primitive {
    #[default]
    Null,
    Bool(bool),
    Number(f64),
    Text(Rc<str>),
}

impl Primitive {
    /// Attribute form of the value.
    ///
    /// `Null` and `false` mean "attribute absent"; `true` is the empty
    /// attribute.
    #[must_use]
    pub fn to_attribute(&self) -> Option<String> {
        match self {
            Self::Null | Self::Bool(false) => None,
            Self::Bool(true) => Some(String::new()),
            Self::Number(n) => Some(format_number(*n)),
            Self::Text(s) => Some(s.to_string()),
        }
    }

    /// Text-content form of the value. `Null` renders as the empty string.
    #[must_use]
    pub fn to_text(&self) -> String {
        match self {
            Self::Null => String::new(),
            Self::Bool(b) => b.to_string(),
            Self::Number(n) => format_number(*n),
            Self::Text(s) => s.to_string(),
        }
    }

    /// Short name of the variant, used in diagnostics.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Number(_) => "number",
            Self::Text(_) => "text",
        }
    }
}

fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.is_finite() && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

impl fmt::Display for Primitive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_text())
    }
}

impl From<&str> for Primitive {
    fn from(value: &str) -> Self {
        Self::Text(Rc::from(value))
    }
}

impl From<String> for Primitive {
    fn from(value: String) -> Self {
        Self::Text(Rc::from(value))
    }
}

impl From<Rc<str>> for Primitive {
    fn from(value: Rc<str>) -> Self {
        Self::Text(value)
    }
}

impl From<bool> for Primitive {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<f64> for Primitive {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

macro_rules! primitive_from_int {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for Primitive {
                fn from(value: $ty) -> Self {
                    Self::Number(value as f64)
                }
            }
        )*
    };
}

primitive_from_int!(i32, i64, u32, u64, usize);

/// Event delivered to a listener.
#[derive(Debug, Clone)]
pub struct HostEvent {
    pub name: Rc<str>,
    pub target: NodeId,
    pub detail: Primitive,
}

/// Listener registered with [`HostTree::add_listener`].
pub type Listener = Rc<dyn Fn(&HostEvent)>;

/// Node-tree capability supplied by the embedding host.
///
/// Methods take `&self`; hosts use interior mutability the way a document
/// object model does.
pub trait HostTree {
    /// Create a detached element.
    fn create_element(&self, tag: &str) -> NodeId;

    /// Create a detached text node.
    fn create_text(&self, data: &str) -> NodeId;

    /// Create a detached comment node. Comments serve as stable anchors.
    fn create_comment(&self, data: &str) -> NodeId;

    /// Insert `node` into `parent` before `reference`, or at the end when
    /// `reference` is `None`. Moves the node if it already has a parent.
    fn insert_before(
        &self,
        parent: NodeId,
        node: NodeId,
        reference: Option<NodeId>,
    ) -> Result<(), HostError>;

    /// Detach `node` from its parent. No-op when already detached.
    fn remove(&self, node: NodeId) -> Result<(), HostError>;

    /// Current parent of `node`.
    fn parent(&self, node: NodeId) -> Option<NodeId>;

    /// Whether `node` is connected to a document root.
    fn is_attached(&self, node: NodeId) -> bool;

    /// Replace the data of a text node.
    fn set_text(&self, node: NodeId, data: &str) -> Result<(), HostError>;

    /// Set (`Some`) or remove (`None`) an attribute.
    fn set_attribute(&self, node: NodeId, name: &str, value: Option<&str>)
    -> Result<(), HostError>;

    /// Assign a property.
    fn set_property(&self, node: NodeId, name: &str, value: &Primitive) -> Result<(), HostError>;

    /// Register `listener` for `event` on `node`, replacing any previous one.
    fn add_listener(&self, node: NodeId, event: &str, listener: Listener)
    -> Result<(), HostError>;

    /// Remove the listener for `event` on `node`.
    fn remove_listener(&self, node: NodeId, event: &str) -> Result<(), HostError>;
}
