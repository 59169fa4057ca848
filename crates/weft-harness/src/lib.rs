#![forbid(unsafe_code)]

//! In-memory host and deterministic scheduler for testing weft.
//!
//! - [`MemoryHost`]: a [`HostTree`](weft_core::HostTree) over a node arena
//!   that logs every mutation as a [`HostOp`] and serializes subtrees with
//!   [`MemoryHost::markup`].
//! - [`ManualScheduler`]: a [`HostScheduler`](weft_core::HostScheduler)
//!   whose clock, yield answers, and current event are set by the test.
//!
//! ```ignore
//! let host = MemoryHost::new();
//! let scheduler = ManualScheduler::new();
//! let updater = Updater::new(host.clone(), scheduler.clone());
//! updater.mount(&block, anchor)?;
//! scheduler.run_until_idle()?;
//! assert_eq!(host.markup(root), "<root>hello</root>");
//! ```

pub mod host;
pub mod scheduler;

pub use host::{HostOp, MemoryHost};
pub use scheduler::{MAX_STEPS, ManualScheduler};
