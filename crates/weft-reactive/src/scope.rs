#![forbid(unsafe_code)]

//! Subscription lifetime management.

use std::rc::Rc;

use crate::atom::Atom;
use crate::subscription::{Subscription, Versioned};

/// Collects the subscriptions of one logical owner (a renderable unit, a
/// signal binding).
///
/// Dropping the scope or calling [`clear`](Self::clear) releases every held
/// subscription.
///
/// # Invariants
///
/// 1. After `clear()` or drop, no callback registered through this scope
///    fires again.
/// 2. `len()` counts held subscriptions, active or not.
pub struct SubscriptionScope {
    subscriptions: Vec<Subscription>,
}

impl SubscriptionScope {
    #[must_use]
    pub fn new() -> Self {
        Self {
            subscriptions: Vec::new(),
        }
    }

    /// Keep `sub` alive for the lifetime of the scope.
    pub fn hold(&mut self, sub: Subscription) {
        self.subscriptions.push(sub);
    }

    /// Subscribe to an atom within this scope.
    pub fn subscribe<T: Clone + 'static>(
        &mut self,
        source: &Atom<T>,
        callback: impl Fn(&T) + 'static,
    ) -> &mut Self {
        let sub = source.subscribe(callback);
        self.subscriptions.push(sub);
        self
    }

    /// Subscribe to any change source within this scope.
    pub fn watch<S: Versioned + ?Sized>(
        &mut self,
        source: &S,
        callback: Rc<dyn Fn()>,
    ) -> &mut Self {
        let sub = source.subscribe_changes(callback);
        self.subscriptions.push(sub);
        self
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.subscriptions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.subscriptions.is_empty()
    }

    /// Release everything now. The scope stays usable.
    pub fn clear(&mut self) {
        for sub in self.subscriptions.drain(..).rev() {
            sub.unsubscribe();
        }
    }
}

impl Default for SubscriptionScope {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for SubscriptionScope {
    fn drop(&mut self) {
        self.clear();
    }
}

impl std::fmt::Debug for SubscriptionScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionScope")
            .field("subscriptions", &self.subscriptions.len())
            .finish()
    }
}
