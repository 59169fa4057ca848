#![forbid(unsafe_code)]

//! Host scheduling capability and priority vocabulary.
//!
//! The updater never owns a clock or an event loop. It asks the host to run a
//! [`HostTask`] at a [`Priority`], consults [`HostScheduler::should_yield`]
//! between units of work, and reads the class of the event currently being
//! dispatched to pick a default priority.

use std::fmt;
use std::time::Duration;

use crate::error::WeftError;

/// Scheduling lane, ordered by urgency (`Background < UserVisible <
/// UserBlocking`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Priority {
    /// Work nobody is waiting on.
    Background,
    /// Work whose result is visible but not blocking input.
    UserVisible,
    /// Direct response to discrete input.
    UserBlocking,
}

impl Priority {
    /// All lanes from most to least urgent.
    pub const DESCENDING: [Self; 3] = [Self::UserBlocking, Self::UserVisible, Self::Background];

    /// Stable lane index, `0` for the most urgent lane.
    #[must_use]
    pub const fn lane(self) -> usize {
        match self {
            Self::UserBlocking => 0,
            Self::UserVisible => 1,
            Self::Background => 2,
        }
    }

    /// Kebab-case name used in logs and configuration files.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::UserBlocking => "user-blocking",
            Self::UserVisible => "user-visible",
            Self::Background => "background",
        }
    }

    /// Parse a kebab-case lane name.
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "user-blocking" => Some(Self::UserBlocking),
            "user-visible" => Some(Self::UserVisible),
            "background" => Some(Self::Background),
            _ => None,
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Commit phase an effect belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommitPhase {
    /// Host-tree mutations.
    Mutation,
    /// Reads and writes that must observe the mutated tree before paint.
    Layout,
    /// Deferred work that may be time-sliced.
    Passive,
}

impl CommitPhase {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Mutation => "mutation",
            Self::Layout => "layout",
            Self::Passive => "passive",
        }
    }
}

impl fmt::Display for CommitPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Class of a platform event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventClass {
    /// Clicks, key presses, input, focus changes.
    Discrete,
    /// Drag, scroll, pointer or mouse movement, wheel.
    Continuous,
}

/// Classify a platform event by name.
///
/// Continuous events are the high-frequency streams: drag, scroll, pointer
/// and mouse movement (including enter/leave/over/out), touch movement, and
/// wheel. Everything else is discrete.
#[must_use]
pub fn classify_event(name: &str) -> EventClass {
    match name {
        "drag" | "dragenter" | "dragleave" | "dragover" | "scroll" | "wheel" | "mousemove"
        | "mouseenter" | "mouseleave" | "mouseover" | "mouseout" | "pointermove"
        | "pointerenter" | "pointerleave" | "pointerover" | "pointerout" | "touchmove" => {
            EventClass::Continuous
        }
        _ => EventClass::Discrete,
    }
}

/// Task handed to [`HostScheduler::request_callback`].
pub type HostTask = Box<dyn FnOnce() -> Result<(), WeftError>>;

/// Scheduling capability supplied by the embedding host.
pub trait HostScheduler {
    /// Run `task` later at `priority`.
    ///
    /// Hosts run higher priorities first. The error returned by the task is
    /// the error of the phase it drove; hosts surface it to whoever drives
    /// their loop.
    fn request_callback(&self, priority: Priority, task: HostTask);

    /// Whether the current slice should hand the thread back to the host.
    fn should_yield(&self) -> bool;

    /// Monotonic time since an arbitrary origin.
    fn now(&self) -> Duration;

    /// Class of the platform event currently being dispatched, if any.
    fn current_event(&self) -> Option<EventClass> {
        None
    }
}
