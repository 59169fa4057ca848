#![forbid(unsafe_code)]

//! Memoized derived signals.
//!
//! A [`Computed`] owns its memoized value, its own version counter, and the
//! dependency versions it last observed. Reads compare those versions with
//! the dependencies' current ones and recompute only when one advanced.
//!
//! # Failure Modes
//!
//! | Failure | Effect |
//! |---------|--------|
//! | Combiner returns `Err` | Error goes to the reader; memo, version, and recorded dependency versions are unchanged, so the next read retries. |
//! | Combiner panics | Propagates to the reader. |

use std::borrow::Cow;
use std::cell::{Cell, RefCell};
use std::convert::Infallible;
use std::error::Error;
use std::fmt;
use std::rc::Rc;

use smallvec::SmallVec;
use tracing::trace;

use crate::atom::Atom;
use crate::subscription::{Dependency, SourceId, Subscription, Versioned};

/// Failure reported by a fallible combiner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComputeError {
    message: Cow<'static, str>,
}

impl ComputeError {
    pub fn new(message: impl Into<Cow<'static, str>>) -> Self {
        Self {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for ComputeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl Error for ComputeError {}

/// Derived signal over a fixed set of dependencies.
///
/// The initial value is computed at construction and does not count as a
/// change: a fresh `Computed` reports version `0`.
pub struct Computed<T, E = Infallible> {
    inner: Rc<ComputedInner<T, E>>,
}

struct ComputedInner<T, E> {
    compute: Box<dyn Fn() -> Result<T, E>>,
    deps: Vec<Dependency>,
    memo: RefCell<Memo<T>>,
    forced: Cell<bool>,
}

struct Memo<T> {
    value: T,
    version: u64,
    seen: SmallVec<[u64; 4]>,
}

impl<T, E> Clone for Computed<T, E> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: Clone + PartialEq + 'static> Computed<T> {
    /// Infallible derived signal over `deps`.
    pub fn new(
        deps: impl IntoIterator<Item = Dependency>,
        compute: impl Fn() -> T + 'static,
    ) -> Self {
        match Self::try_new(deps, move || Ok::<T, Infallible>(compute())) {
            Ok(computed) => computed,
            Err(never) => match never {},
        }
    }

    /// Derived signal over one atom.
    pub fn from1<S: Clone + 'static>(source: &Atom<S>, f: impl Fn(&S) -> T + 'static) -> Self {
        let src = source.clone();
        Self::new([source.dependency()], move || src.with(|v| f(v)))
    }

    /// Derived signal over two atoms.
    pub fn from2<A: Clone + 'static, B: Clone + 'static>(
        a: &Atom<A>,
        b: &Atom<B>,
        f: impl Fn(&A, &B) -> T + 'static,
    ) -> Self {
        let (src_a, src_b) = (a.clone(), b.clone());
        Self::new([a.dependency(), b.dependency()], move || {
            src_a.with(|va| src_b.with(|vb| f(va, vb)))
        })
    }

    /// Current value, recomputed first if stale.
    #[must_use]
    pub fn get(&self) -> T {
        match self.try_get() {
            Ok(value) => value,
            Err(never) => match never {},
        }
    }

    /// Read the current value without cloning.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        match self.try_with(f) {
            Ok(value) => value,
            Err(never) => match never {},
        }
    }
}

impl<T: Clone + PartialEq + 'static, E: 'static> Computed<T, E> {
    /// Fallible derived signal. Fails if the initial computation fails.
    pub fn try_new(
        deps: impl IntoIterator<Item = Dependency>,
        compute: impl Fn() -> Result<T, E> + 'static,
    ) -> Result<Self, E> {
        let deps: Vec<Dependency> = deps.into_iter().collect();
        let seen = deps.iter().map(Dependency::version).collect();
        let value = compute()?;
        Ok(Self {
            inner: Rc::new(ComputedInner {
                compute: Box::new(compute),
                deps,
                memo: RefCell::new(Memo {
                    value,
                    version: 0,
                    seen,
                }),
                forced: Cell::new(false),
            }),
        })
    }

    /// Current value, recomputed first if stale.
    pub fn try_get(&self) -> Result<T, E> {
        self.try_with(T::clone)
    }

    /// Read the current value without cloning.
    pub fn try_with<R>(&self, f: impl FnOnce(&T) -> R) -> Result<R, E> {
        self.refresh()?;
        Ok(f(&self.inner.memo.borrow().value))
    }

    /// Version after refreshing. On a failed refresh, the last good version.
    #[must_use]
    pub fn version(&self) -> u64 {
        if self.refresh().is_err() {
            trace!("derived refresh failed while reading version");
        }
        self.inner.memo.borrow().version
    }

    /// Make the next recomputation run and count as a change.
    pub fn force_update(&self) {
        self.inner.forced.set(true);
    }

    /// Whether a read would recompute.
    #[must_use]
    pub fn is_stale(&self) -> bool {
        if self.inner.forced.get() {
            return true;
        }
        let memo = self.inner.memo.borrow();
        self.inner
            .deps
            .iter()
            .zip(memo.seen.iter())
            .any(|(dep, seen)| dep.version() != *seen)
    }

    /// Register `callback`, called whenever a dependency notifies while this
    /// signal is alive.
    ///
    /// Nothing is recomputed here; a reader that cares whether the value
    /// actually changed compares on its next read.
    pub fn subscribe(&self, callback: impl Fn() + 'static) -> Subscription {
        let weak = Rc::downgrade(&self.inner);
        let relay: Rc<dyn Fn()> = Rc::new(move || {
            if weak.strong_count() > 0 {
                callback();
            }
        });
        Subscription::from_many(
            self.inner
                .deps
                .iter()
                .map(|dep| dep.subscribe_changes(Rc::clone(&relay)))
                .collect(),
        )
    }

    /// Type-erased handle for dependency lists.
    #[must_use]
    pub fn dependency(&self) -> Dependency {
        Dependency::new(self.clone())
    }

    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    fn refresh(&self) -> Result<(), E> {
        if !self.is_stale() {
            return Ok(());
        }
        let inner = &self.inner;
        let seen: SmallVec<[u64; 4]> = inner.deps.iter().map(Dependency::version).collect();
        let next = (inner.compute)()?;
        let forced = inner.forced.replace(false);
        let mut memo = inner.memo.borrow_mut();
        if forced || memo.value != next {
            memo.value = next;
            memo.version += 1;
        }
        memo.seen = seen;
        Ok(())
    }
}

impl<T: Clone + PartialEq + 'static, E: 'static> Versioned for Computed<T, E> {
    fn version(&self) -> u64 {
        Computed::version(self)
    }

    fn subscribe_changes(&self, callback: Rc<dyn Fn()>) -> Subscription {
        self.subscribe(move || callback())
    }

    fn source_id(&self) -> SourceId {
        SourceId::of(Rc::as_ptr(&self.inner))
    }
}

impl<T: fmt::Debug, E> fmt::Debug for Computed<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("Computed");
        match self.inner.memo.try_borrow() {
            Ok(memo) => s.field("value", &memo.value).field("version", &memo.version),
            Err(_) => s.field("value", &"<borrowed>"),
        };
        s.field("dependencies", &self.inner.deps.len()).finish()
    }
}
