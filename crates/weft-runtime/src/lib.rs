#![forbid(unsafe_code)]

//! Rendering runtime for weft.
//!
//! # Architecture
//!
//! ```text
//!  Atom / Computed ──notify──▶ Block::request_update ──▶ Updater queue
//!                                                            │
//!                                       render phase ◀───────┘
//!                                            │ Block render closure → Value
//!                                            ▼
//!                           Slot ── resolve_binding ──▶ Binding (connect / bind)
//!                                            │ schedules
//!                                            ▼
//!                           mutation effects → layout effects → passive effects
//!                                            │
//!                                            ▼
//!                                        HostTree
//! ```
//!
//! - [`part`] and [`value`]: where a hole lives and what it holds.
//! - [`binding`]: the binding protocol and every binding kind.
//! - [`template`]: templates and the [`Blueprint`] builder.
//! - [`reconcile`]: the keyed list diff.
//! - [`updater`]: the priority scheduler and its phases.
//! - [`block`]: renderable units with watched signals.
//! - [`context`]: parent-chain contextual values.
//! - [`config`]: [`SchedulerConfig`] and policy-file loading.
//!
//! Bindings never touch the host while connecting or binding. Every host
//! mutation happens in a commit phase, so only the final state per part is
//! observable.

pub mod binding;
pub mod block;
pub mod config;
pub mod context;
pub mod effect;
pub mod part;
mod queue;
pub mod reconcile;
pub mod template;
pub mod unit;
pub mod updater;
pub mod value;

pub use binding::{Binding, Slot, resolve_binding};
pub use block::{Block, BlockStatus, RenderContext, WeakBlock};
pub use config::{ConfigError, ContinuousEventPolicy, SchedulerConfig};
pub use context::{ContextArena, ContextOverride};
pub use effect::{CommitContext, Effect, FnEffect, from_fn};
pub use part::Part;
pub use reconcile::{ReconcileTarget, reconcile};
pub use template::{Blueprint, Template, TemplateFragment, TemplateResult};
pub use unit::{Renderable, UnitId};
pub use updater::{IdleSignal, Phase, RunState, UpdateContext, Updater, UpdaterStats, WeakUpdater};
pub use value::{AttributeMap, EventHandler, Key, ListValue, SignalSource, SignalValue, Value};
