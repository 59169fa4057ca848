#![forbid(unsafe_code)]

//! Mutable reactive values.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use crate::batch;
use crate::computed::Computed;
use crate::subscription::{Dependency, SourceId, SubscriberList, Subscription, Versioned};

/// Shared, version-tracked mutable value.
///
/// Cloning an `Atom` yields another handle to the same value.
///
/// # Invariants
///
/// 1. Every write bumps the version, whether or not the value changed.
/// 2. Subscribers run synchronously after the write, over the subscriber set
///    captured when notification starts.
/// 3. No borrow of the value is held while subscribers run; they may read or
///    write the atom.
pub struct Atom<T> {
    inner: Rc<AtomInner<T>>,
}

struct AtomInner<T> {
    value: RefCell<T>,
    version: Cell<u64>,
    subscribers: SubscriberList<dyn Fn(&T)>,
    notify_queued: Cell<bool>,
}

impl<T> Clone for Atom<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: Clone + 'static> Atom<T> {
    pub fn new(value: T) -> Self {
        Self {
            inner: Rc::new(AtomInner {
                value: RefCell::new(value),
                version: Cell::new(0),
                subscribers: SubscriberList::new(),
                notify_queued: Cell::new(false),
            }),
        }
    }

    /// Clone of the current value.
    #[must_use]
    pub fn get(&self) -> T {
        self.inner.value.borrow().clone()
    }

    /// Read the current value without cloning.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.inner.value.borrow())
    }

    #[must_use]
    pub fn version(&self) -> u64 {
        self.inner.version.get()
    }

    /// Replace the value, bump the version, and notify.
    pub fn set(&self, value: T) {
        *self.inner.value.borrow_mut() = value;
        self.changed();
    }

    /// Replace the value and return the previous one.
    pub fn replace(&self, value: T) -> T {
        let previous = self.inner.value.replace(value);
        self.changed();
        previous
    }

    /// Mutate the value in place, then bump and notify.
    pub fn update(&self, f: impl FnOnce(&mut T)) {
        f(&mut self.inner.value.borrow_mut());
        self.changed();
    }

    /// Bump the version and notify without touching the value.
    pub fn force_update(&self) {
        self.changed();
    }

    /// Register `callback`, called with the new value after every write.
    pub fn subscribe(&self, callback: impl Fn(&T) + 'static) -> Subscription {
        let callback: Rc<dyn Fn(&T)> = Rc::new(callback);
        self.inner.subscribers.add(callback)
    }

    /// Live subscriber count.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.len()
    }

    /// Derived signal over this atom.
    pub fn map<U>(&self, f: impl Fn(&T) -> U + 'static) -> Computed<U>
    where
        U: Clone + PartialEq + 'static,
    {
        Computed::from1(self, f)
    }

    /// Whether both handles share a value.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// Type-erased handle for dependency lists.
    #[must_use]
    pub fn dependency(&self) -> Dependency {
        Dependency::new(self.clone())
    }

    fn changed(&self) {
        let inner = &self.inner;
        inner.version.set(inner.version.get() + 1);
        if batch::is_batching() {
            if !inner.notify_queued.replace(true) {
                let deferred = Rc::clone(inner);
                batch::defer(Box::new(move || {
                    deferred.notify_queued.set(false);
                    AtomInner::notify(&deferred);
                }));
            }
            return;
        }
        AtomInner::notify(inner);
    }
}

impl<T: Clone + 'static> AtomInner<T> {
    fn notify(this: &Rc<Self>) {
        let subscribers = this.subscribers.snapshot();
        if subscribers.is_empty() {
            return;
        }
        let value = this.value.borrow().clone();
        for callback in subscribers {
            callback(&value);
        }
    }
}

impl<T: Clone + 'static> Versioned for Atom<T> {
    fn version(&self) -> u64 {
        Atom::version(self)
    }

    fn subscribe_changes(&self, callback: Rc<dyn Fn()>) -> Subscription {
        self.subscribe(move |_| callback())
    }

    fn source_id(&self) -> SourceId {
        SourceId::of(Rc::as_ptr(&self.inner))
    }
}

impl<T: Clone + 'static> From<&Atom<T>> for Dependency {
    fn from(atom: &Atom<T>) -> Self {
        atom.dependency()
    }
}

impl<T: Default + Clone + 'static> Default for Atom<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: fmt::Debug> fmt::Debug for Atom<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("Atom");
        match self.inner.value.try_borrow() {
            Ok(value) => s.field("value", &*value),
            Err(_) => s.field("value", &"<borrowed>"),
        };
        s.field("version", &self.inner.version.get()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::cell::Cell;

    #[test]
    fn set_bumps_and_notifies() {
        let n = Atom::new(0);
        let seen = Rc::new(Cell::new(0));
        let s = Rc::clone(&seen);
        let _sub = n.subscribe(move |v| s.set(*v));

        n.set(5);
        assert_eq!(n.get(), 5);
        assert_eq!(n.version(), 1);
        assert_eq!(seen.get(), 5);
    }

    #[test]
    fn equal_write_still_bumps() {
        let n = Atom::new(3);
        n.set(3);
        assert_eq!(n.version(), 1);
    }

    #[test]
    fn force_update_keeps_value() {
        let n = Atom::new(String::from("x"));
        let hits = Rc::new(Cell::new(0));
        let h = Rc::clone(&hits);
        let _sub = n.subscribe(move |_| h.set(h.get() + 1));
        n.force_update();
        assert_eq!(n.get(), "x");
        assert_eq!(n.version(), 1);
        assert_eq!(hits.get(), 1);
    }

    #[test]
    fn update_and_replace() {
        let v = Atom::new(vec![1, 2]);
        v.update(|items| items.push(3));
        assert_eq!(v.get(), vec![1, 2, 3]);
        let old = v.replace(Vec::new());
        assert_eq!(old, vec![1, 2, 3]);
        assert_eq!(v.version(), 2);
    }

    #[test]
    fn subscriber_unsubscribing_itself_during_notification() {
        let n = Atom::new(0);
        let holder: Rc<RefCell<Option<Subscription>>> = Rc::new(RefCell::new(None));
        let hits = Rc::new(Cell::new(0));

        let h = Rc::clone(&hits);
        let slot = Rc::clone(&holder);
        let sub = n.subscribe(move |_| {
            h.set(h.get() + 1);
            if let Some(sub) = slot.borrow_mut().take() {
                sub.unsubscribe();
            }
        });
        *holder.borrow_mut() = Some(sub);

        n.set(1);
        n.set(2);
        assert_eq!(hits.get(), 1);
        assert_eq!(n.subscriber_count(), 0);
    }

    #[test]
    fn snapshot_excludes_late_subscribers() {
        let n = Atom::new(0);
        let late_hits = Rc::new(Cell::new(0));
        let late: Rc<RefCell<Vec<Subscription>>> = Rc::new(RefCell::new(Vec::new()));

        let atom = n.clone();
        let lh = Rc::clone(&late_hits);
        let store = Rc::clone(&late);
        let _sub = n.subscribe(move |_| {
            let lh = Rc::clone(&lh);
            store
                .borrow_mut()
                .push(atom.subscribe(move |_| lh.set(lh.get() + 1)));
        });

        n.set(1);
        assert_eq!(late_hits.get(), 0);
        n.set(2);
        assert_eq!(late_hits.get(), 1);
    }

    #[test]
    fn subscriber_can_write_back() {
        let n = Atom::new(0);
        let atom = n.clone();
        let _sub = n.subscribe(move |v| {
            if *v < 3 {
                atom.set(v + 1);
            }
        });
        n.set(0);
        assert_eq!(n.get(), 3);
        assert_eq!(n.version(), 4);
    }

    #[test]
    fn clones_share_state() {
        let a = Atom::new(1);
        let b = a.clone();
        b.set(2);
        assert_eq!(a.get(), 2);
        assert!(a.ptr_eq(&b));
        assert_eq!(
            Versioned::source_id(&a),
            Versioned::source_id(&b),
        );
    }

    proptest! {
        #[test]
        fn version_is_monotonic(writes in proptest::collection::vec(any::<i16>(), 0..64)) {
            let atom = Atom::new(0_i16);
            let mut last = atom.version();
            for w in &writes {
                atom.set(*w);
                prop_assert_eq!(atom.version(), last + 1);
                last = atom.version();
            }
            prop_assert_eq!(atom.version(), writes.len() as u64);
        }
    }
}
