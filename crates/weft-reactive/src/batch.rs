#![forbid(unsafe_code)]

//! Notification batching.
//!
//! [`BatchScope`] defers atom notifications until the outermost scope on the
//! current thread exits. Writes inside the scope update values and versions
//! immediately; each written atom queues at most one notification.

use std::cell::RefCell;
use std::marker::PhantomData;

use tracing::trace;

type Deferred = Box<dyn FnOnce()>;

#[derive(Default)]
struct BatchState {
    depth: usize,
    pending: Vec<Deferred>,
}

thread_local! {
    static BATCH: RefCell<BatchState> = RefCell::new(BatchState::default());
}

/// Whether a batch is open on this thread.
pub(crate) fn is_batching() -> bool {
    BATCH.with(|b| b.borrow().depth > 0)
}

/// Queue `notify` for the outermost scope exit.
pub(crate) fn defer(notify: Deferred) {
    BATCH.with(|b| b.borrow_mut().pending.push(notify));
}

/// RAII guard that defers notifications until the outermost scope drops.
///
/// # Example
///
/// ```
/// use std::cell::Cell;
/// use std::rc::Rc;
/// use weft_reactive::{Atom, BatchScope};
///
/// let a = Atom::new(0);
/// let hits = Rc::new(Cell::new(0));
/// let h = Rc::clone(&hits);
/// let _sub = a.subscribe(move |_| h.set(h.get() + 1));
///
/// {
///     let _batch = BatchScope::new();
///     a.set(1);
///     a.set(2);
///     assert_eq!(hits.get(), 0);
/// }
/// assert_eq!(hits.get(), 1);
/// assert_eq!(a.version(), 2);
/// ```
#[must_use = "the batch flushes when the scope is dropped"]
pub struct BatchScope {
    _not_send: PhantomData<*const ()>,
}

impl BatchScope {
    pub fn new() -> Self {
        BATCH.with(|b| b.borrow_mut().depth += 1);
        Self {
            _not_send: PhantomData,
        }
    }

    /// Whether any batch is open on this thread.
    #[must_use]
    pub fn is_active() -> bool {
        is_batching()
    }

    /// Notifications waiting for the outermost scope to exit.
    #[must_use]
    pub fn pending_count() -> usize {
        BATCH.with(|b| b.borrow().pending.len())
    }
}

impl Default for BatchScope {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for BatchScope {
    fn drop(&mut self) {
        let outermost = BATCH.with(|b| {
            let mut b = b.borrow_mut();
            b.depth = b.depth.saturating_sub(1);
            b.depth == 0
        });
        if !outermost {
            return;
        }
        // Notifications may write again; those run outside any batch.
        loop {
            let pending = BATCH.with(|b| std::mem::take(&mut b.borrow_mut().pending));
            if pending.is_empty() {
                break;
            }
            trace!(count = pending.len(), "flushing batched notifications");
            for notify in pending {
                notify();
            }
        }
    }
}

impl std::fmt::Debug for BatchScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchScope")
            .field("pending", &Self::pending_count())
            .finish()
    }
}
