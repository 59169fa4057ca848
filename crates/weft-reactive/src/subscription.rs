#![forbid(unsafe_code)]

//! Subscriptions and type-erased change sources.

use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

// ---------------------------------------------------------------------------
// Subscription
// ---------------------------------------------------------------------------

/// Unsubscribe capability returned by `subscribe`.
///
/// The subscription owns the only strong reference to its callback; the
/// source holds a `Weak`. Dropping the subscription or calling
/// [`unsubscribe`](Self::unsubscribe) releases the callback. Unsubscribing
/// twice is a no-op.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    guard: RefCell<Option<Box<dyn Any>>>,
}

impl Subscription {
    pub(crate) fn new(guard: Box<dyn Any>) -> Self {
        Self {
            guard: RefCell::new(Some(guard)),
        }
    }

    /// Combine several subscriptions into one.
    pub fn from_many(subscriptions: Vec<Subscription>) -> Self {
        Self::new(Box::new(subscriptions))
    }

    /// A subscription that is already released.
    pub fn inert() -> Self {
        Self {
            guard: RefCell::new(None),
        }
    }

    /// Release the callback. Idempotent.
    pub fn unsubscribe(&self) {
        // Take first so the callback is dropped outside the borrow.
        let guard = self.guard.borrow_mut().take();
        drop(guard);
    }

    /// Whether the callback is still registered.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.guard.borrow().is_some()
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.is_active())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// SubscriberList
// ---------------------------------------------------------------------------

/// Callbacks registered with one source, in registration order.
pub(crate) struct SubscriberList<F: ?Sized> {
    entries: RefCell<Vec<Weak<F>>>,
}

impl<F: ?Sized + 'static> SubscriberList<F> {
    pub(crate) fn new() -> Self {
        Self {
            entries: RefCell::new(Vec::new()),
        }
    }

    pub(crate) fn add(&self, callback: Rc<F>) -> Subscription {
        self.entries.borrow_mut().push(Rc::downgrade(&callback));
        Subscription::new(Box::new(callback))
    }

    /// Live callbacks at this instant. Dead entries are pruned.
    pub(crate) fn snapshot(&self) -> Vec<Rc<F>> {
        let mut entries = self.entries.borrow_mut();
        entries.retain(|weak| weak.strong_count() > 0);
        entries.iter().filter_map(Weak::upgrade).collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries
            .borrow()
            .iter()
            .filter(|weak| weak.strong_count() > 0)
            .count()
    }
}

// ---------------------------------------------------------------------------
// Versioned
// ---------------------------------------------------------------------------

/// Identity of a change source, stable for its lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SourceId(usize);

impl SourceId {
    pub(crate) fn of<T: ?Sized>(ptr: *const T) -> Self {
        Self(ptr.cast::<()>() as usize)
    }
}

/// A value with a version counter and change notification.
///
/// Type-erased view shared by atoms and derived signals so heterogeneous
/// sources can be listed as dependencies or watched by the renderer.
pub trait Versioned {
    /// Current version. Derived sources refresh before answering.
    fn version(&self) -> u64;

    /// Call `callback` whenever the source may have changed.
    fn subscribe_changes(&self, callback: Rc<dyn Fn()>) -> Subscription;

    /// Identity of the underlying source, shared by all clones of a handle.
    fn source_id(&self) -> SourceId;
}

/// Type-erased dependency of a [`Computed`](crate::Computed).
#[derive(Clone)]
pub struct Dependency(Rc<dyn Versioned>);

impl Dependency {
    pub fn new(source: impl Versioned + 'static) -> Self {
        Self(Rc::new(source))
    }

    #[must_use]
    pub fn version(&self) -> u64 {
        self.0.version()
    }

    pub fn subscribe_changes(&self, callback: Rc<dyn Fn()>) -> Subscription {
        self.0.subscribe_changes(callback)
    }

    #[must_use]
    pub fn source_id(&self) -> SourceId {
        self.0.source_id()
    }
}

impl fmt::Debug for Dependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dependency")
            .field("source", &self.source_id())
            .field("version", &self.version())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn unsubscribe_is_idempotent() {
        let list: SubscriberList<dyn Fn()> = SubscriberList::new();
        let sub = list.add(Rc::new(|| {}));
        assert_eq!(list.len(), 1);
        sub.unsubscribe();
        sub.unsubscribe();
        assert!(!sub.is_active());
        assert_eq!(list.len(), 0);
    }

    #[test]
    fn drop_releases_callback() {
        let list: SubscriberList<dyn Fn()> = SubscriberList::new();
        {
            let _sub = list.add(Rc::new(|| {}));
            assert_eq!(list.len(), 1);
        }
        assert!(list.snapshot().is_empty());
    }

    #[test]
    fn from_many_releases_all() {
        let list: SubscriberList<dyn Fn()> = SubscriberList::new();
        let hits = Rc::new(Cell::new(0));
        let subs = (0..3)
            .map(|_| {
                let hits = Rc::clone(&hits);
                list.add(Rc::new(move || hits.set(hits.get() + 1)))
            })
            .collect();
        let combined = Subscription::from_many(subs);
        for cb in list.snapshot() {
            cb();
        }
        assert_eq!(hits.get(), 3);
        combined.unsubscribe();
        assert_eq!(list.len(), 0);
    }

    #[test]
    fn inert_is_inactive() {
        assert!(!Subscription::inert().is_active());
    }
}
