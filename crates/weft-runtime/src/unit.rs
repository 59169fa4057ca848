#![forbid(unsafe_code)]

//! Renderable units.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use weft_core::WeftError;

use crate::updater::UpdateContext;

static UNIT_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier of a renderable unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UnitId(u64);

impl UnitId {
    /// Allocate a fresh id.
    #[must_use]
    pub fn next() -> Self {
        Self(UNIT_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    #[inline]
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unit#{}", self.0)
    }
}

/// Something the updater can render.
///
/// Queue identity is [`Renderable::id`]: enqueueing a unit that is already
/// pending only escalates its priority.
pub trait Renderable {
    fn id(&self) -> UnitId;

    /// Name used in logs and errors.
    fn name(&self) -> &str {
        "unit"
    }

    /// Whether a popped task for this unit should be dropped without
    /// rendering.
    fn should_skip(&self) -> bool;

    fn render(&self, cx: &UpdateContext) -> Result<(), WeftError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_unique() {
        let a = UnitId::next();
        let b = UnitId::next();
        assert_ne!(a, b);
        assert!(b.raw() > a.raw());
    }
}
