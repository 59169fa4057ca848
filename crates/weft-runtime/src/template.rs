#![forbid(unsafe_code)]

//! Templates and their instances.
//!
//! A [`Template`] knows how to build a detached fragment of host nodes and
//! report the [`Part`] of each hole in document order. Parsing markup into a
//! template is out of scope; [`Blueprint`] builds one programmatically.
//!
//! # Hole order
//!
//! Holes are numbered depth-first in document order. An element's own holes
//! (attributes, properties, events, spread) come before the holes of its
//! children.

use std::fmt;
use std::rc::Rc;

use weft_core::{HostTree, NodeId, WeftError};

use crate::part::Part;
use crate::value::Value;

/// Static structure shared by every instance of a template.
pub trait Template {
    /// Build a detached fragment and the parts of its holes.
    fn instantiate(&self, host: &dyn HostTree) -> Result<TemplateFragment, WeftError>;

    /// Number of holes every instance has.
    fn hole_count(&self) -> usize;

    /// Name used in diagnostics.
    fn name(&self) -> &str {
        "template"
    }
}

/// Detached nodes produced by [`Template::instantiate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateFragment {
    /// Top-level nodes in order.
    pub nodes: Vec<NodeId>,
    /// One part per hole, in hole order.
    pub parts: Vec<Part>,
}

/// A template paired with the values for its holes.
#[derive(Clone)]
pub struct TemplateResult {
    template: Rc<dyn Template>,
    values: Vec<Value>,
}

impl TemplateResult {
    pub fn new(template: Rc<dyn Template>, values: Vec<Value>) -> Self {
        Self { template, values }
    }

    #[must_use]
    pub fn template(&self) -> &Rc<dyn Template> {
        &self.template
    }

    #[must_use]
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub(crate) fn into_values(self) -> Vec<Value> {
        self.values
    }

    /// Whether both results come from the same template.
    #[must_use]
    pub fn same_template(&self, other: &Self) -> bool {
        std::ptr::addr_eq(Rc::as_ptr(&self.template), Rc::as_ptr(&other.template))
    }
}

impl fmt::Debug for TemplateResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TemplateResult")
            .field("template", &self.template.name())
            .field("values", &self.values)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Blueprint
// ---------------------------------------------------------------------------

/// Node of a [`Blueprint`].
#[derive(Debug, Clone)]
pub enum Node {
    Element(ElementSpec),
    /// Static text.
    Text(String),
    /// Child-node hole.
    Hole,
    /// Bare text node whose content is a hole.
    TextHole,
}

#[derive(Debug, Clone)]
enum ElementHole {
    Attribute(Rc<str>),
    Property(Rc<str>),
    Event(Rc<str>),
    Spread,
}

/// Element of a [`Blueprint`], built with chained methods.
#[derive(Debug, Clone)]
pub struct ElementSpec {
    tag: String,
    attributes: Vec<(String, String)>,
    holes: Vec<ElementHole>,
    children: Vec<Node>,
}

impl ElementSpec {
    /// Static attribute.
    #[must_use]
    pub fn attr(mut self, name: &str, value: &str) -> Self {
        self.attributes.push((name.to_owned(), value.to_owned()));
        self
    }

    /// Attribute hole.
    #[must_use]
    pub fn bind_attr(mut self, name: &str) -> Self {
        self.holes.push(ElementHole::Attribute(Rc::from(name)));
        self
    }

    /// Property hole.
    #[must_use]
    pub fn bind_prop(mut self, name: &str) -> Self {
        self.holes.push(ElementHole::Property(Rc::from(name)));
        self
    }

    /// Event listener hole.
    #[must_use]
    pub fn on(mut self, event: &str) -> Self {
        self.holes.push(ElementHole::Event(Rc::from(event)));
        self
    }

    /// Attribute-spread hole.
    #[must_use]
    pub fn spread(mut self) -> Self {
        self.holes.push(ElementHole::Spread);
        self
    }

    #[must_use]
    pub fn child(mut self, node: impl Into<Node>) -> Self {
        self.children.push(node.into());
        self
    }

    #[must_use]
    pub fn children<N: Into<Node>>(mut self, nodes: impl IntoIterator<Item = N>) -> Self {
        self.children.extend(nodes.into_iter().map(Into::into));
        self
    }
}

impl From<ElementSpec> for Node {
    fn from(spec: ElementSpec) -> Self {
        Self::Element(spec)
    }
}

impl From<&str> for Node {
    fn from(text: &str) -> Self {
        Self::Text(text.to_owned())
    }
}

/// Start an element.
#[must_use]
pub fn element(tag: &str) -> ElementSpec {
    ElementSpec {
        tag: tag.to_owned(),
        attributes: Vec::new(),
        holes: Vec::new(),
        children: Vec::new(),
    }
}

/// Static text node.
#[must_use]
pub fn text(data: &str) -> Node {
    Node::Text(data.to_owned())
}

/// Child-node hole.
#[must_use]
pub const fn hole() -> Node {
    Node::Hole
}

/// Bare text node hole.
#[must_use]
pub const fn text_hole() -> Node {
    Node::TextHole
}

/// Programmatic [`Template`].
///
/// ```
/// use weft_runtime::template::{Blueprint, element, hole};
/// use weft_runtime::{Template, values};
///
/// let card = Blueprint::new("card", [
///     element("div").bind_attr("class").child(hole()),
/// ]);
/// assert_eq!(card.hole_count(), 2);
/// let _result = card.result(values!["primary", "hello"]);
/// ```
#[derive(Debug)]
pub struct Blueprint {
    name: String,
    nodes: Vec<Node>,
    holes: usize,
}

impl Blueprint {
    pub fn new<N: Into<Node>>(name: &str, nodes: impl IntoIterator<Item = N>) -> Rc<Self> {
        let nodes: Vec<Node> = nodes.into_iter().map(Into::into).collect();
        let holes = nodes.iter().map(count_holes).sum();
        Rc::new(Self {
            name: name.to_owned(),
            nodes,
            holes,
        })
    }

    /// Pair this template with hole values.
    pub fn result(self: &Rc<Self>, values: Vec<Value>) -> TemplateResult {
        TemplateResult::new(Rc::clone(self) as Rc<dyn Template>, values)
    }
}

fn count_holes(node: &Node) -> usize {
    match node {
        Node::Text(_) => 0,
        Node::Hole | Node::TextHole => 1,
        Node::Element(spec) => spec.holes.len() + spec.children.iter().map(count_holes).sum::<usize>(),
    }
}

fn build(host: &dyn HostTree, node: &Node, parts: &mut Vec<Part>) -> Result<NodeId, WeftError> {
    match node {
        Node::Text(data) => Ok(host.create_text(data)),
        Node::Hole => {
            let anchor = host.create_comment("");
            parts.push(Part::ChildNode { anchor });
            Ok(anchor)
        }
        Node::TextHole => {
            let node = host.create_text("");
            parts.push(Part::Node { node });
            Ok(node)
        }
        Node::Element(spec) => {
            let el = host.create_element(&spec.tag);
            for (name, value) in &spec.attributes {
                host.set_attribute(el, name, Some(value))?;
            }
            for hole in &spec.holes {
                parts.push(match hole {
                    ElementHole::Attribute(name) => Part::attribute(el, Rc::clone(name)),
                    ElementHole::Property(name) => Part::property(el, Rc::clone(name)),
                    ElementHole::Event(name) => Part::event(el, Rc::clone(name)),
                    ElementHole::Spread => Part::Element { node: el },
                });
            }
            for child in &spec.children {
                let node = build(host, child, parts)?;
                host.insert_before(el, node, None)?;
            }
            Ok(el)
        }
    }
}

impl Template for Blueprint {
    fn instantiate(&self, host: &dyn HostTree) -> Result<TemplateFragment, WeftError> {
        let mut parts = Vec::with_capacity(self.holes);
        let nodes = self
            .nodes
            .iter()
            .map(|node| build(host, node, &mut parts))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(TemplateFragment { nodes, parts })
    }

    fn hole_count(&self) -> usize {
        self.holes
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use weft_harness::MemoryHost;

    #[test]
    fn counts_holes_depth_first() {
        let bp = Blueprint::new(
            "row",
            [
                Node::from(element("li").bind_attr("class").on("click").child(hole())),
                text_hole(),
                hole(),
            ],
        );
        assert_eq!(bp.hole_count(), 5);
    }

    #[test]
    fn instantiate_reports_parts_in_order() {
        let host = MemoryHost::new();
        let bp = Blueprint::new(
            "row",
            [
                Node::from(
                    element("li")
                        .attr("role", "row")
                        .bind_attr("class")
                        .child(element("span").bind_prop("value"))
                        .child(hole()),
                ),
                text("tail"),
            ],
        );
        let fragment = bp.instantiate(&*host).unwrap();
        assert_eq!(fragment.nodes.len(), 2);
        let kinds: Vec<_> = fragment.parts.iter().map(Part::kind).collect();
        assert_eq!(kinds, ["attribute", "property", "child-node"]);
        assert_eq!(fragment.parts[0].node(), fragment.nodes[0]);
        assert_eq!(host.parent(fragment.nodes[0]), None);
        assert_eq!(host.attribute(fragment.nodes[0], "role").as_deref(), Some("row"));
    }

    #[test]
    fn same_template_is_identity() {
        let a = Blueprint::new("a", [text("x")]);
        let b = Blueprint::new("b", [text("x")]);
        assert!(a.result(Vec::new()).same_template(&a.result(Vec::new())));
        assert!(!a.result(Vec::new()).same_template(&b.result(Vec::new())));
    }
}
