#![forbid(unsafe_code)]

//! Error taxonomy.
//!
//! Three layers:
//!
//! - [`HostError`]: the host capability refused an operation.
//! - [`ProtocolError`]: a caller broke the binding or scheduling protocol.
//! - [`WeftError`]: what render and commit phases return. Wraps the two
//!   above plus user computation failures, and records the phase or unit a
//!   failure came from.
//!
//! [`WeftError`] is `Clone` so one failure can be delivered to every waiter
//! of an idle signal.

use std::error::Error;
use std::fmt;
use std::rc::Rc;

use crate::host::NodeId;
use crate::schedule::CommitPhase;

/// Failure reported by a [`HostTree`](crate::HostTree).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostError {
    /// The handle was never allocated by this host.
    UnknownNode(NodeId),
    /// `node` is not a child of `parent`.
    NotAChild { parent: NodeId, node: NodeId },
    /// The node cannot hold children or is not of the required kind.
    InvalidNode(NodeId),
    /// Inserting `node` under `parent` would create a cycle.
    Cycle { parent: NodeId, node: NodeId },
}

impl fmt::Display for HostError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownNode(node) => write!(f, "unknown node {node}"),
            Self::NotAChild { parent, node } => {
                write!(f, "node {node} is not a child of {parent}")
            }
            Self::InvalidNode(node) => write!(f, "node {node} does not support this operation"),
            Self::Cycle { parent, node } => {
                write!(f, "inserting {node} under {parent} would create a cycle")
            }
        }
    }
}

impl Error for HostError {}

/// Violation of the binding or scheduling protocol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// The value cannot be bound to this kind of part.
    UnsupportedValue { part: &'static str, value: &'static str },
    /// A template produced a different number of holes than values supplied.
    HoleCountMismatch { expected: usize, actual: usize },
    /// A render was started while another render was in progress.
    NestedRender,
    /// The binding was disconnected and cannot be used again.
    DisconnectedBinding,
    /// The anchor a binding inserts before has no parent.
    DetachedAnchor(NodeId),
    /// A binding tried to remove a node it never inserted.
    NotOwned(NodeId),
    /// The renderable unit is already mounted at another part.
    AlreadyMounted,
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnsupportedValue { part, value } => {
                write!(f, "cannot bind a {value} value to a {part} part")
            }
            Self::HoleCountMismatch { expected, actual } => {
                write!(f, "template has {expected} holes but {actual} values were supplied")
            }
            Self::NestedRender => f.write_str("render started while another render is running"),
            Self::DisconnectedBinding => f.write_str("binding used after disconnect"),
            Self::DetachedAnchor(node) => write!(f, "anchor {node} has no parent"),
            Self::NotOwned(node) => write!(f, "node {node} is not owned by this binding"),
            Self::AlreadyMounted => f.write_str("renderable unit is already mounted"),
        }
    }
}

impl Error for ProtocolError {}

/// Error returned by render and commit phases.
#[derive(Debug, Clone)]
pub enum WeftError {
    Host(HostError),
    Protocol(ProtocolError),
    /// A derived-signal combiner failed.
    Compute(Rc<dyn Error>),
    /// A user callback (effect body, render closure) failed.
    Callback(Rc<dyn Error>),
    /// An effect failed during `phase`.
    Effect {
        phase: CommitPhase,
        source: Box<WeftError>,
    },
    /// Rendering the named unit failed.
    Render {
        unit: Rc<str>,
        source: Box<WeftError>,
    },
}

impl WeftError {
    /// Wrap a user error raised by a callback.
    pub fn callback(err: impl Error + 'static) -> Self {
        Self::Callback(Rc::new(err))
    }

    /// Wrap a derived-signal failure.
    pub fn compute(err: impl Error + 'static) -> Self {
        Self::Compute(Rc::new(err))
    }

    /// The innermost error, skipping phase and unit wrappers.
    #[must_use]
    pub fn root(&self) -> &WeftError {
        match self {
            Self::Effect { source, .. } | Self::Render { source, .. } => source.root(),
            other => other,
        }
    }

    /// The protocol violation at the root, if any.
    #[must_use]
    pub fn as_protocol(&self) -> Option<&ProtocolError> {
        match self.root() {
            Self::Protocol(err) => Some(err),
            _ => None,
        }
    }
}

impl fmt::Display for WeftError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Host(err) => write!(f, "host error: {err}"),
            Self::Protocol(err) => write!(f, "protocol error: {err}"),
            Self::Compute(err) => write!(f, "computation failed: {err}"),
            Self::Callback(err) => write!(f, "callback failed: {err}"),
            Self::Effect { phase, source } => write!(f, "{phase} effect failed: {source}"),
            Self::Render { unit, source } => write!(f, "render of `{unit}` failed: {source}"),
        }
    }
}

impl Error for WeftError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Host(err) => Some(err),
            Self::Protocol(err) => Some(err),
            Self::Compute(err) | Self::Callback(err) => Some(err.as_ref()),
            Self::Effect { source, .. } | Self::Render { source, .. } => Some(source.as_ref()),
        }
    }
}

impl From<HostError> for WeftError {
    fn from(err: HostError) -> Self {
        Self::Host(err)
    }
}

impl From<ProtocolError> for WeftError {
    fn from(err: ProtocolError) -> Self {
        Self::Protocol(err)
    }
}
