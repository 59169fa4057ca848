#![forbid(unsafe_code)]

//! Contextual variables.
//!
//! Each renderable unit gets a scope in the [`ContextArena`], linked to the
//! scope of the unit that mounted it. Lookups walk the parent chain, then
//! any active root overrides, then the root scope. There is no global
//! "current unit": callers name the unit they are reading for.

use std::any::{Any, TypeId};
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use ahash::AHashMap;

use crate::unit::UnitId;

type Values = AHashMap<TypeId, Rc<dyn Any>>;

#[derive(Default)]
struct Scope {
    parent: Option<UnitId>,
    values: Values,
}

/// Parent-chain arena of contextual values keyed by unit.
#[derive(Default)]
pub struct ContextArena {
    scopes: AHashMap<UnitId, Scope>,
    root: Values,
    overrides: Rc<RefCell<Vec<(TypeId, Rc<dyn Any>)>>>,
}

impl ContextArena {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create (or reset) the scope of `unit`.
    pub fn register(&mut self, unit: UnitId, parent: Option<UnitId>) {
        self.scopes.insert(
            unit,
            Scope {
                parent,
                values: Values::default(),
            },
        );
    }

    /// Drop the scope of `unit`. Children keep their parent link and fall
    /// through to the root.
    pub fn release(&mut self, unit: UnitId) {
        self.scopes.remove(&unit);
    }

    /// Provide `value` to `unit` and its descendants. Ignored when the unit
    /// has no scope.
    pub fn provide<T: 'static>(&mut self, unit: UnitId, value: T) -> bool {
        match self.scopes.get_mut(&unit) {
            Some(scope) => {
                scope.values.insert(TypeId::of::<T>(), Rc::new(value));
                true
            }
            None => false,
        }
    }

    /// Provide a default visible to every unit.
    pub fn provide_root<T: 'static>(&mut self, value: T) {
        self.root.insert(TypeId::of::<T>(), Rc::new(value));
    }

    /// Shadow the root value of `T` until the guard drops.
    #[must_use = "dropping this guard removes the override"]
    pub fn push_override<T: 'static>(&self, value: T) -> ContextOverride {
        let value: Rc<dyn Any> = Rc::new(value);
        self.overrides
            .borrow_mut()
            .push((TypeId::of::<T>(), Rc::clone(&value)));
        ContextOverride {
            stack: Rc::clone(&self.overrides),
            value,
        }
    }

    /// Nearest value of `T` visible from `unit`.
    #[must_use]
    pub fn lookup<T: 'static>(&self, unit: UnitId) -> Option<Rc<T>> {
        let key = TypeId::of::<T>();
        let mut cursor = Some(unit);
        // Bounded walk: the chain can be no longer than the arena.
        for _ in 0..=self.scopes.len() {
            let Some(id) = cursor else { break };
            let Some(scope) = self.scopes.get(&id) else {
                break;
            };
            if let Some(value) = scope.values.get(&key) {
                return Rc::clone(value).downcast::<T>().ok();
            }
            cursor = scope.parent;
        }
        self.lookup_root::<T>()
    }

    /// Root value of `T`, honoring overrides.
    #[must_use]
    pub fn lookup_root<T: 'static>(&self) -> Option<Rc<T>> {
        let key = TypeId::of::<T>();
        let overridden = self
            .overrides
            .borrow()
            .iter()
            .rev()
            .find(|(id, _)| *id == key)
            .map(|(_, value)| Rc::clone(value));
        overridden
            .or_else(|| self.root.get(&key).cloned())
            .and_then(|value| value.downcast::<T>().ok())
    }

    /// Parent link of `unit`.
    #[must_use]
    pub fn parent(&self, unit: UnitId) -> Option<UnitId> {
        self.scopes.get(&unit).and_then(|scope| scope.parent)
    }

    /// Number of registered scopes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.scopes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.scopes.is_empty()
    }
}

impl fmt::Debug for ContextArena {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextArena")
            .field("scopes", &self.scopes.len())
            .field("root_values", &self.root.len())
            .field("overrides", &self.overrides.borrow().len())
            .finish()
    }
}

/// RAII guard for a root override.
#[must_use = "dropping this guard removes the override"]
pub struct ContextOverride {
    stack: Rc<RefCell<Vec<(TypeId, Rc<dyn Any>)>>>,
    value: Rc<dyn Any>,
}

impl Drop for ContextOverride {
    fn drop(&mut self) {
        let mut stack = self.stack.borrow_mut();
        if let Some(pos) = stack.iter().rposition(|(_, v)| Rc::ptr_eq(v, &self.value)) {
            stack.remove(pos);
        }
    }
}

impl fmt::Debug for ContextOverride {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextOverride").finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct Theme(&'static str);

    #[test]
    fn nearest_provider_wins() {
        let (root, mid, leaf) = (UnitId::next(), UnitId::next(), UnitId::next());
        let mut arena = ContextArena::new();
        arena.register(root, None);
        arena.register(mid, Some(root));
        arena.register(leaf, Some(mid));

        assert!(arena.provide(root, Theme("light")));
        assert_eq!(arena.lookup::<Theme>(leaf).as_deref(), Some(&Theme("light")));

        arena.provide(mid, Theme("dark"));
        assert_eq!(arena.lookup::<Theme>(leaf).as_deref(), Some(&Theme("dark")));
        assert_eq!(arena.lookup::<Theme>(root).as_deref(), Some(&Theme("light")));
    }

    #[test]
    fn falls_back_to_root_and_overrides() {
        let unit = UnitId::next();
        let mut arena = ContextArena::new();
        arena.register(unit, None);
        assert_eq!(arena.lookup::<Theme>(unit), None);

        arena.provide_root(Theme("system"));
        assert_eq!(arena.lookup::<Theme>(unit).as_deref(), Some(&Theme("system")));
        {
            let _guard = arena.push_override(Theme("high-contrast"));
            assert_eq!(
                arena.lookup::<Theme>(unit).as_deref(),
                Some(&Theme("high-contrast"))
            );
        }
        assert_eq!(arena.lookup::<Theme>(unit).as_deref(), Some(&Theme("system")));
    }

    #[test]
    fn released_scope_is_skipped() {
        let (parent, child) = (UnitId::next(), UnitId::next());
        let mut arena = ContextArena::new();
        arena.register(parent, None);
        arena.register(child, Some(parent));
        arena.provide(parent, 7_u32);
        arena.release(parent);
        assert_eq!(arena.lookup::<u32>(child), None);
        assert!(!arena.provide(parent, 8_u32));
        assert_eq!(arena.len(), 1);
        assert_eq!(arena.parent(child), Some(parent));
    }
}
