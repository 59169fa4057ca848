#![forbid(unsafe_code)]

//! Host capability interfaces for weft.
//!
//! The rendering core never touches a concrete document. Everything it needs
//! from its environment is expressed as two capability traits:
//!
//! - [`HostTree`]: create, insert, and remove nodes; write attributes,
//!   properties, and listeners; query attachment.
//! - [`HostScheduler`]: run a task at a [`Priority`], answer the yield check,
//!   and report the class of the platform event being dispatched.
//!
//! This crate also owns the shared vocabulary used across the workspace:
//! [`NodeId`], [`Primitive`], [`Priority`], [`CommitPhase`], and the error
//! taxonomy in [`error`].

pub mod budget;
pub mod error;
pub mod host;
pub mod schedule;

pub use budget::{FrameBudget, MonotonicClock};
pub use error::{HostError, ProtocolError, WeftError};
pub use host::{HostEvent, HostTree, Listener, NodeId, NodeKind, Primitive};
pub use schedule::{CommitPhase, EventClass, HostScheduler, HostTask, Priority, classify_event};
