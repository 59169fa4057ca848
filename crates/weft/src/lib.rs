#![forbid(unsafe_code)]

//! weft public facade.
//!
//! Re-exports the workspace crates and a [`prelude`] for the common case:
//!
//! ```ignore
//! use weft::prelude::*;
//!
//! let count = Atom::new(0);
//! let source = count.clone();
//! let counter = Block::new("counter", move |cx| Ok(cx.read(&source).into()));
//! updater.mount(&counter, anchor)?;
//! ```
//!
//! # Features
//!
//! | Feature | Enables |
//! |---------|---------|
//! | `runtime` (default) | Bindings, blocks, and the updater |
//! | `policy-config` | `SchedulerConfig::from_toml_str` / `from_json_str` |
//! | `testing` | `MemoryHost` and `ManualScheduler` |

pub use weft_core as core;
pub use weft_reactive as reactive;

#[cfg(feature = "runtime")]
pub use weft_runtime as runtime;

#[cfg(feature = "testing")]
pub use weft_harness as harness;

pub use weft_core::{
    CommitPhase, EventClass, HostError, HostScheduler, HostTree, NodeId, Primitive, Priority,
    ProtocolError, WeftError,
};
pub use weft_reactive::{Atom, BatchScope, ComputeError, Computed, Subscription};

#[cfg(feature = "runtime")]
pub use weft_runtime::{
    Block, ListValue, SchedulerConfig, TemplateResult, Updater, Value, values,
};

/// Common imports.
pub mod prelude {
    pub use weft_core::{HostScheduler, HostTree, NodeId, Primitive, Priority, WeftError};
    pub use weft_reactive::{Atom, BatchScope, Computed};

    #[cfg(feature = "runtime")]
    pub use weft_runtime::template::{Blueprint, element, hole, text, text_hole};
    #[cfg(feature = "runtime")]
    pub use weft_runtime::{
        AttributeMap, Block, BlockStatus, EventHandler, Key, ListValue, RenderContext,
        SchedulerConfig, Updater, Value, values,
    };

    #[cfg(feature = "testing")]
    pub use weft_harness::{ManualScheduler, MemoryHost};
}
