#![forbid(unsafe_code)]

//! Hole values.
//!
//! [`Value`] is the closed union of everything a template hole can hold.
//! Which [`Binding`](crate::Binding) a value needs is decided once, by
//! [`resolve_binding`](crate::binding::resolve_binding).

use std::collections::BTreeMap;
use std::error::Error;
use std::fmt;
use std::rc::Rc;

use weft_core::{HostEvent, Primitive, WeftError};
use weft_reactive::{Atom, Computed, SourceId, Subscription, Versioned};

use crate::block::Block;
use crate::template::TemplateResult;

// ---------------------------------------------------------------------------
// Value
// ---------------------------------------------------------------------------

/// Content of one template hole.
#[derive(Clone, Default)]
pub enum Value {
    /// Nothing. Clears attributes, renders no child content.
    #[default]
    Empty,
    Primitive(Primitive),
    Template(TemplateResult),
    List(ListValue),
    Signal(SignalValue),
    Block(Block),
    Handler(EventHandler),
    Attributes(AttributeMap),
}

impl Value {
    /// Short name of the variant, used in diagnostics.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Empty => "empty",
            Self::Primitive(_) => "primitive",
            Self::Template(_) => "template",
            Self::List(_) => "list",
            Self::Signal(_) => "signal",
            Self::Block(_) => "block",
            Self::Handler(_) => "handler",
            Self::Attributes(_) => "attributes",
        }
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => f.write_str("Empty"),
            Self::Primitive(p) => f.debug_tuple("Primitive").field(p).finish(),
            Self::Template(t) => f.debug_tuple("Template").field(t).finish(),
            Self::List(l) => f.debug_tuple("List").field(l).finish(),
            Self::Signal(s) => f.debug_tuple("Signal").field(s).finish(),
            Self::Block(b) => f.debug_tuple("Block").field(b).finish(),
            Self::Handler(_) => f.write_str("Handler(..)"),
            Self::Attributes(a) => f.debug_tuple("Attributes").field(a).finish(),
        }
    }
}

impl From<Primitive> for Value {
    fn from(value: Primitive) -> Self {
        Self::Primitive(value)
    }
}

macro_rules! value_from_primitive {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for Value {
                fn from(value: $ty) -> Self {
                    Self::Primitive(Primitive::from(value))
                }
            }
        )*
    };
}

value_from_primitive!(&str, String, Rc<str>, bool, f64, i32, i64, u32, u64, usize);

impl From<()> for Value {
    fn from((): ()) -> Self {
        Self::Empty
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Empty, Into::into)
    }
}

impl From<TemplateResult> for Value {
    fn from(value: TemplateResult) -> Self {
        Self::Template(value)
    }
}

impl From<ListValue> for Value {
    fn from(value: ListValue) -> Self {
        Self::List(value)
    }
}

impl From<SignalValue> for Value {
    fn from(value: SignalValue) -> Self {
        Self::Signal(value)
    }
}

impl From<Block> for Value {
    fn from(value: Block) -> Self {
        Self::Block(value)
    }
}

impl From<&Block> for Value {
    fn from(value: &Block) -> Self {
        Self::Block(value.clone())
    }
}

impl From<EventHandler> for Value {
    fn from(value: EventHandler) -> Self {
        Self::Handler(value)
    }
}

impl From<AttributeMap> for Value {
    fn from(value: AttributeMap) -> Self {
        Self::Attributes(value)
    }
}

impl<T: Clone + Into<Value> + 'static> From<&Atom<T>> for Value {
    fn from(atom: &Atom<T>) -> Self {
        Self::Signal(SignalValue::new(atom.clone()))
    }
}

impl<T: Clone + Into<Value> + 'static> From<Atom<T>> for Value {
    fn from(atom: Atom<T>) -> Self {
        Self::Signal(SignalValue::new(atom))
    }
}

impl<T, E> From<&Computed<T, E>> for Value
where
    T: Clone + PartialEq + Into<Value> + 'static,
    E: Error + 'static,
{
    fn from(computed: &Computed<T, E>) -> Self {
        Self::Signal(SignalValue::new(computed.clone()))
    }
}

impl<T, E> From<Computed<T, E>> for Value
where
    T: Clone + PartialEq + Into<Value> + 'static,
    E: Error + 'static,
{
    fn from(computed: Computed<T, E>) -> Self {
        Self::Signal(SignalValue::new(computed))
    }
}

/// Build a `Vec<Value>` from heterogeneous expressions.
///
/// ```
/// use weft_runtime::{Value, values};
///
/// let vs: Vec<Value> = values!["label", 3, true];
/// assert_eq!(vs.len(), 3);
/// ```
#[macro_export]
macro_rules! values {
    ($($value:expr),* $(,)?) => {
        ::std::vec![$($crate::Value::from($value)),*]
    };
}

// ---------------------------------------------------------------------------
// Signals
// ---------------------------------------------------------------------------

/// Reactive source a hole can hold.
pub trait SignalSource: Versioned {
    /// Current value, converted for binding.
    fn current(&self) -> Result<Value, WeftError>;
}

impl<T: Clone + Into<Value> + 'static> SignalSource for Atom<T> {
    fn current(&self) -> Result<Value, WeftError> {
        Ok(self.get().into())
    }
}

impl<T, E> SignalSource for Computed<T, E>
where
    T: Clone + PartialEq + Into<Value> + 'static,
    E: Error + 'static,
{
    fn current(&self) -> Result<Value, WeftError> {
        self.try_get().map(Into::into).map_err(WeftError::compute)
    }
}

/// Type-erased signal held by a hole.
#[derive(Clone)]
pub struct SignalValue(Rc<dyn SignalSource>);

impl SignalValue {
    pub fn new(source: impl SignalSource + 'static) -> Self {
        Self(Rc::new(source))
    }

    pub fn current(&self) -> Result<Value, WeftError> {
        self.0.current()
    }

    #[must_use]
    pub fn version(&self) -> u64 {
        self.0.version()
    }

    pub fn subscribe(&self, callback: Rc<dyn Fn()>) -> Subscription {
        self.0.subscribe_changes(callback)
    }

    #[must_use]
    pub fn source_id(&self) -> SourceId {
        self.0.source_id()
    }

    /// Whether both values wrap the same underlying signal.
    #[must_use]
    pub fn same_source(&self, other: &Self) -> bool {
        self.source_id() == other.source_id()
    }
}

impl fmt::Debug for SignalValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignalValue")
            .field("source", &self.source_id())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Lists
// ---------------------------------------------------------------------------

/// Identity of a list item across renders.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Key {
    /// Position-based key assigned by [`ListValue::indexed`].
    Index(usize),
    Int(i64),
    Str(Rc<str>),
}

impl From<&str> for Key {
    fn from(value: &str) -> Self {
        Self::Str(Rc::from(value))
    }
}

impl From<String> for Key {
    fn from(value: String) -> Self {
        Self::Str(Rc::from(value))
    }
}

impl From<Rc<str>> for Key {
    fn from(value: Rc<str>) -> Self {
        Self::Str(value)
    }
}

impl From<i64> for Key {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<i32> for Key {
    fn from(value: i32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<u32> for Key {
    fn from(value: u32) -> Self {
        Self::Int(i64::from(value))
    }
}

/// Ordered, keyed collection of child values.
///
/// Keys and values always have the same length.
#[derive(Clone, Default)]
pub struct ListValue {
    keys: Vec<Key>,
    values: Vec<Value>,
}

impl ListValue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a keyed list from `items`.
    pub fn keyed<I, K>(
        items: I,
        mut key: impl FnMut(&I::Item, usize) -> K,
        mut value: impl FnMut(I::Item, usize) -> Value,
    ) -> Self
    where
        I: IntoIterator,
        K: Into<Key>,
    {
        let mut list = Self::new();
        for (index, item) in items.into_iter().enumerate() {
            list.keys.push(key(&item, index).into());
            list.values.push(value(item, index));
        }
        list
    }

    /// Build a list keyed by position.
    pub fn indexed<V: Into<Value>>(values: impl IntoIterator<Item = V>) -> Self {
        let values: Vec<Value> = values.into_iter().map(Into::into).collect();
        Self {
            keys: (0..values.len()).map(Key::Index).collect(),
            values,
        }
    }

    /// Append one entry.
    #[must_use]
    pub fn with(mut self, key: impl Into<Key>, value: impl Into<Value>) -> Self {
        self.push(key, value);
        self
    }

    pub fn push(&mut self, key: impl Into<Key>, value: impl Into<Value>) {
        self.keys.push(key.into());
        self.values.push(value.into());
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    #[must_use]
    pub fn keys(&self) -> &[Key] {
        &self.keys
    }

    #[must_use]
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub(crate) fn into_parts(self) -> (Vec<Key>, Vec<Value>) {
        (self.keys, self.values)
    }
}

impl<K: Into<Key>, V: Into<Value>> FromIterator<(K, V)> for ListValue {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut list = Self::new();
        for (key, value) in iter {
            list.push(key, value);
        }
        list
    }
}

impl fmt::Debug for ListValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.keys.iter().zip(self.values.iter()))
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Handlers and attribute maps
// ---------------------------------------------------------------------------

/// Event listener value. Equality is identity.
#[derive(Clone)]
pub struct EventHandler(Rc<dyn Fn(&HostEvent)>);

impl EventHandler {
    pub fn new(handler: impl Fn(&HostEvent) + 'static) -> Self {
        Self(Rc::new(handler))
    }

    pub fn call(&self, event: &HostEvent) {
        (self.0)(event);
    }

    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        std::ptr::addr_eq(Rc::as_ptr(&self.0), Rc::as_ptr(&other.0))
    }
}

impl PartialEq for EventHandler {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl fmt::Debug for EventHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("EventHandler(..)")
    }
}

/// Attribute set spread onto an element.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AttributeMap(Rc<BTreeMap<Rc<str>, Primitive>>);

impl AttributeMap {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace one attribute.
    #[must_use]
    pub fn with(mut self, name: impl Into<Rc<str>>, value: impl Into<Primitive>) -> Self {
        Rc::make_mut(&mut self.0).insert(name.into(), value.into());
        self
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Primitive> {
        self.0.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Rc<str>, &Primitive)> {
        self.0.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<N: Into<Rc<str>>, V: Into<Primitive>> FromIterator<(N, V)> for AttributeMap {
    fn from_iter<I: IntoIterator<Item = (N, V)>>(iter: I) -> Self {
        Self(Rc::new(
            iter.into_iter()
                .map(|(name, value)| (name.into(), value.into()))
                .collect(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primitive_conversions() {
        assert!(matches!(Value::from("x"), Value::Primitive(Primitive::Text(_))));
        assert!(matches!(Value::from(3), Value::Primitive(Primitive::Number(_))));
        assert!(Value::from(None::<i32>).is_empty());
        assert!(Value::from(()).is_empty());
    }

    #[test]
    fn keyed_list_lengths_match() {
        let list = ListValue::keyed(["a", "b", "c"], |s, _| *s, |s, i| Value::from(format!("{i}:{s}")));
        assert_eq!(list.len(), 3);
        assert_eq!(list.keys()[1], Key::from("b"));
        assert_eq!(list.values().len(), 3);
    }

    #[test]
    fn indexed_list_keys() {
        let list = ListValue::indexed([10, 20]);
        assert_eq!(list.keys(), &[Key::Index(0), Key::Index(1)]);
    }

    #[test]
    fn handler_equality_is_identity() {
        let a = EventHandler::new(|_| {});
        let b = EventHandler::new(|_| {});
        assert_eq!(a, a.clone());
        assert_ne!(a, b);
    }

    #[test]
    fn attribute_map_builder() {
        let map = AttributeMap::new().with("id", "main").with("hidden", true);
        assert_eq!(map.len(), 2);
        assert_eq!(map.get("id"), Some(&Primitive::from("main")));
        let same: AttributeMap = [("id", Primitive::from("main")), ("hidden", true.into())]
            .into_iter()
            .collect();
        assert_eq!(map, same);
    }

    #[test]
    fn signal_identity_survives_rewrapping() {
        let atom = Atom::new(1);
        let a = SignalValue::new(atom.clone());
        let b = SignalValue::new(atom.clone());
        assert!(a.same_source(&b));
        let other = SignalValue::new(Atom::new(1));
        assert!(!a.same_source(&other));
    }

    #[test]
    fn computed_failure_maps_to_compute_error() {
        use weft_reactive::ComputeError;
        let n = Atom::new(1);
        let src = n.clone();
        let c = Computed::try_new([n.dependency()], move || {
            if src.get() > 1 {
                Err(ComputeError::new("too big"))
            } else {
                Ok(src.get())
            }
        })
        .unwrap();
        let signal = SignalValue::new(c);
        assert!(signal.current().is_ok());
        n.set(2);
        assert!(matches!(signal.current(), Err(WeftError::Compute(_))));
    }
}
