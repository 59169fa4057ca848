#![forbid(unsafe_code)]

//! Reactive values for weft.
//!
//! This crate provides the change-tracking primitives the renderer watches:
//!
//! - [`Atom`]: a shared, version-tracked mutable value with synchronous
//!   change notification.
//! - [`Computed`]: a memoized value derived from one or more dependencies,
//!   recomputed lazily on read.
//! - [`Subscription`]: unsubscribe capability; idempotent, and released on
//!   drop.
//! - [`SubscriptionScope`]: holds the subscriptions of one logical owner.
//! - [`BatchScope`]: RAII guard that defers atom notifications until the
//!   outermost scope exits.
//!
//! # Architecture
//!
//! Values use `Rc<..>` with interior mutability for single-threaded shared
//! ownership. Subscribers are stored as `Weak` callbacks owned by their
//! [`Subscription`] and pruned lazily during notification. Notification runs
//! over a snapshot taken when it starts, so callbacks may subscribe or
//! unsubscribe (including themselves) freely.
//!
//! # Invariants
//!
//! 1. An atom's version increments on every write, including writes of an
//!    equal value.
//! 2. A derived signal's version increments by exactly one per recomputation
//!    that yields a different value (or was forced), however many
//!    dependencies changed.
//! 3. Subscribers are notified in registration order.
//! 4. A failed recomputation leaves the previous memoized value and version
//!    untouched.
//! 5. Within a [`BatchScope`], values and versions update immediately; each
//!    atom notifies once when the outermost scope exits.
//!
//! # Example
//!
//! ```
//! use weft_reactive::{Atom, Computed};
//!
//! let n = Atom::new(0);
//! let doubled = Computed::from1(&n, |v| v * 2);
//!
//! n.set(5);
//! assert_eq!(n.version(), 1);
//! assert_eq!(doubled.get(), 10);
//! assert_eq!(doubled.version(), 0);
//!
//! n.set(6);
//! assert_eq!(doubled.get(), 12);
//! assert_eq!(doubled.version(), 1);
//! ```

pub mod atom;
pub mod batch;
pub mod computed;
pub mod scope;
pub mod subscription;

pub use atom::Atom;
pub use batch::BatchScope;
pub use computed::{ComputeError, Computed};
pub use scope::SubscriptionScope;
pub use subscription::{Dependency, SourceId, Subscription, Versioned};
