#![forbid(unsafe_code)]

//! Keyed list reconciliation.
//!
//! [`reconcile`] walks the old and new key sequences with four pointers
//! (old head/tail, new head/tail) and asks a [`ReconcileTarget`] to update,
//! move, create, or remove items. Key→index maps over the unconsumed ranges
//! are built lazily, only when none of the four end comparisons match.
//!
//! # Invariants
//!
//! | Property | Guarantee |
//! |----------|-----------|
//! | Output order | Item `i` of the result was updated or created for `new_keys[i]` |
//! | Ownership | Every old item is either returned once or passed to `remove` once |
//! | Termination | Each step consumes one old slot or one new slot |
//! | Duplicates | Allowed; the last-seen old index wins a key-map entry |
//!
//! # Failure Modes
//!
//! | Condition | Behavior |
//! |-----------|----------|
//! | Target operation fails | Target records the failure; the walk continues |
//! | Duplicate keys | Extra duplicates are created fresh or removed, never shared |
//!
//! Moves and creations are expressed relative to the item that will follow
//! them (`None` means the end of the list), so a target can turn them into a
//! plan committed later.

use std::hash::Hash;

use ahash::AHashMap;
use tracing::trace;

/// Receiver of the operations produced by [`reconcile`].
pub trait ReconcileTarget<B> {
    /// Create the item for `new_keys[index]`, placed before `before`.
    fn create(&mut self, index: usize, before: Option<&B>) -> B;

    /// Rebind an existing item to the value at `index`.
    fn update(&mut self, item: &B, index: usize);

    /// Move an existing item before `before`.
    fn relocate(&mut self, item: &B, before: Option<&B>);

    /// Drop an item that has no place in the new list.
    fn remove(&mut self, item: B);
}

/// Reconcile `old` (keyed by `old_keys`) into the order of `new_keys`.
///
/// `old.len()` must equal `old_keys.len()`; extra items on either side are
/// ignored. Returns the items in new order, one per new key.
pub fn reconcile<K, B, T>(old_keys: &[K], old: Vec<B>, new_keys: &[K], target: &mut T) -> Vec<B>
where
    K: Eq + Hash,
    T: ReconcileTarget<B> + ?Sized,
{
    debug_assert_eq!(old_keys.len(), old.len(), "old keys and items differ in length");

    let mut old: Vec<Option<B>> = old.into_iter().map(Some).collect();
    let mut new: Vec<Option<B>> = std::iter::repeat_with(|| None).take(new_keys.len()).collect();

    let (mut old_head, mut old_tail) = (0, old.len().min(old_keys.len()));
    let (mut new_head, mut new_tail) = (0, new_keys.len());

    let mut new_index: Option<AHashMap<&K, usize>> = None;
    let mut old_index: Option<AHashMap<&K, usize>> = None;

    while old_head < old_tail && new_head < new_tail {
        if old[old_head].is_none() {
            old_head += 1;
        } else if old[old_tail - 1].is_none() {
            old_tail -= 1;
        } else if old_keys[old_head] == new_keys[new_head] {
            let item = old[old_head].take();
            if let Some(item) = item {
                target.update(&item, new_head);
                new[new_head] = Some(item);
            }
            old_head += 1;
            new_head += 1;
        } else if old_keys[old_tail - 1] == new_keys[new_tail - 1] {
            let item = old[old_tail - 1].take();
            if let Some(item) = item {
                target.update(&item, new_tail - 1);
                new[new_tail - 1] = Some(item);
            }
            old_tail -= 1;
            new_tail -= 1;
        } else if old_keys[old_head] == new_keys[new_tail - 1] {
            let item = old[old_head].take();
            if let Some(item) = item {
                target.update(&item, new_tail - 1);
                target.relocate(&item, new.get(new_tail).and_then(Option::as_ref));
                trace!(from = old_head, to = new_tail - 1, "list item moved toward tail");
                new[new_tail - 1] = Some(item);
            }
            old_head += 1;
            new_tail -= 1;
        } else if old_keys[old_tail - 1] == new_keys[new_head] {
            let item = old[old_tail - 1].take();
            if let Some(item) = item {
                target.update(&item, new_head);
                target.relocate(&item, old[old_head].as_ref());
                trace!(from = old_tail - 1, to = new_head, "list item moved toward head");
                new[new_head] = Some(item);
            }
            old_tail -= 1;
            new_head += 1;
        } else {
            let new_map = new_index.get_or_insert_with(|| {
                index_range(new_keys, new_head, new_tail)
            });
            let old_map = old_index.get_or_insert_with(|| {
                index_range(old_keys, old_head, old_tail)
            });

            if !new_map.contains_key(&old_keys[old_head]) {
                if let Some(item) = old[old_head].take() {
                    target.remove(item);
                }
                old_head += 1;
            } else if !new_map.contains_key(&old_keys[old_tail - 1]) {
                if let Some(item) = old[old_tail - 1].take() {
                    target.remove(item);
                }
                old_tail -= 1;
            } else {
                let reused = old_map
                    .get(&new_keys[new_head])
                    .and_then(|&index| old[index].take());
                let item = match reused {
                    Some(item) => {
                        target.update(&item, new_head);
                        target.relocate(&item, old[old_head].as_ref());
                        item
                    }
                    None => target.create(new_head, old[old_head].as_ref()),
                };
                new[new_head] = Some(item);
                new_head += 1;
            }
        }
    }

    while new_head < new_tail {
        let item = target.create(new_head, new.get(new_tail).and_then(Option::as_ref));
        new[new_head] = Some(item);
        new_head += 1;
    }

    for slot in &mut old[old_head..old_tail] {
        if let Some(item) = slot.take() {
            target.remove(item);
        }
    }

    let placed: Vec<B> = new.into_iter().flatten().collect();
    debug_assert_eq!(placed.len(), new_keys.len(), "every new key must be placed");
    placed
}

fn index_range<K: Eq + Hash>(keys: &[K], start: usize, end: usize) -> AHashMap<&K, usize> {
    let mut map = AHashMap::with_capacity(end - start);
    for (index, key) in keys.iter().enumerate().take(end).skip(start) {
        map.insert(key, index);
    }
    map
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    struct Item {
        id: usize,
    }

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Op {
        Create(usize),
        Update(usize),
        Move(usize),
        Remove(usize),
    }

    /// Simulates the host order of items so the plan can be checked.
    #[derive(Default)]
    struct Model {
        order: Vec<usize>,
        next_id: usize,
        ops: Vec<Op>,
        bound: Vec<(usize, usize)>,
    }

    impl Model {
        fn seeded(len: usize) -> (Self, Vec<Item>) {
            let items: Vec<Item> = (0..len).map(|id| Item { id }).collect();
            let model = Self {
                order: (0..len).collect(),
                next_id: len,
                ..Self::default()
            };
            (model, items)
        }

        fn place(&mut self, id: usize, before: Option<&Item>) {
            let at = before
                .and_then(|b| self.order.iter().position(|&x| x == b.id))
                .unwrap_or(self.order.len());
            self.order.insert(at, id);
        }

        fn moves(&self) -> usize {
            self.ops.iter().filter(|op| matches!(op, Op::Move(_))).count()
        }
    }

    impl ReconcileTarget<Item> for Model {
        fn create(&mut self, index: usize, before: Option<&Item>) -> Item {
            let id = self.next_id;
            self.next_id += 1;
            self.place(id, before);
            self.ops.push(Op::Create(index));
            self.bound.push((id, index));
            Item { id }
        }

        fn update(&mut self, item: &Item, index: usize) {
            self.ops.push(Op::Update(item.id));
            self.bound.push((item.id, index));
        }

        fn relocate(&mut self, item: &Item, before: Option<&Item>) {
            self.order.retain(|&x| x != item.id);
            self.place(item.id, before);
            self.ops.push(Op::Move(item.id));
        }

        fn remove(&mut self, item: Item) {
            self.order.retain(|&x| x != item.id);
            self.ops.push(Op::Remove(item.id));
        }
    }

    fn run(old: &[&str], new: &[&str]) -> (Model, Vec<Item>) {
        let (mut model, items) = Model::seeded(old.len());
        let out = reconcile(old, items, new, &mut model);
        (model, out)
    }

    fn assert_consistent(model: &Model, out: &[Item], new_len: usize) {
        assert_eq!(out.len(), new_len);
        let ids: Vec<usize> = out.iter().map(|i| i.id).collect();
        assert_eq!(model.order, ids, "host order must follow the new list");
    }

    #[test]
    fn reverse_of_three_uses_two_tail_swaps() {
        let (model, out) = run(&["foo", "bar", "baz"], &["baz", "bar", "foo"]);
        assert_consistent(&model, &out, 3);
        assert_eq!(out.iter().map(|i| i.id).collect::<Vec<_>>(), [2, 1, 0]);
        assert_eq!(model.moves(), 2);
        assert_eq!(
            model.ops,
            [Op::Update(0), Op::Move(0), Op::Update(1), Op::Move(1), Op::Update(2)]
        );
    }

    #[test]
    fn identical_lists_only_update() {
        let (model, out) = run(&["a", "b", "c"], &["a", "b", "c"]);
        assert_consistent(&model, &out, 3);
        assert!(model.ops.iter().all(|op| matches!(op, Op::Update(_))));
    }

    #[test]
    fn empty_to_items_and_back() {
        let (mut model, items) = Model::seeded(0);
        let keys = ["a", "b", "c"];
        let out = reconcile(&[] as &[&str], items, &keys, &mut model);
        assert_consistent(&model, &out, 3);
        let out = reconcile(&keys, out, &[] as &[&str], &mut model);
        assert!(out.is_empty());
        assert!(model.order.is_empty(), "no live items remain");
    }

    #[test]
    fn insert_in_middle_keeps_neighbours() {
        let (model, out) = run(&["a", "c"], &["a", "b", "c"]);
        assert_consistent(&model, &out, 3);
        assert_eq!(out[0].id, 0);
        assert_eq!(out[2].id, 1);
        assert_eq!(model.moves(), 0);
    }

    #[test]
    fn remove_unknown_heads_via_key_map() {
        let (model, out) = run(&["x", "a", "b", "y"], &["b", "a"]);
        assert_consistent(&model, &out, 2);
        assert!(model.ops.contains(&Op::Remove(0)));
        assert!(model.ops.contains(&Op::Remove(3)));
    }

    #[test]
    fn duplicate_keys_terminate() {
        let (model, out) = run(&["foo", "bar", "baz", "baz", "baz"], &["baz", "foo", "baz"]);
        assert_consistent(&model, &out, 3);

        let (model, out) = run(&["baz"], &["foo", "bar", "baz", "baz", "baz"]);
        assert_consistent(&model, &out, 5);
    }

    #[test]
    fn updates_receive_new_indices() {
        let (model, out) = run(&["a", "b", "c"], &["c", "a", "b"]);
        assert_consistent(&model, &out, 3);
        for (position, item) in out.iter().enumerate() {
            let last = model
                .bound
                .iter()
                .rev()
                .find(|(id, _)| *id == item.id)
                .map(|(_, index)| *index);
            assert_eq!(last, Some(position));
        }
    }

    #[test]
    fn every_permutation_of_three() {
        let base = ["foo", "bar", "baz"];
        let perms = [
            [0, 1, 2],
            [0, 2, 1],
            [1, 0, 2],
            [1, 2, 0],
            [2, 0, 1],
            [2, 1, 0],
        ];
        for from in perms {
            for to in perms {
                let old: Vec<&str> = from.iter().map(|&i| base[i]).collect();
                let new: Vec<&str> = to.iter().map(|&i| base[i]).collect();
                let (model, out) = run(&old, &new);
                assert_consistent(&model, &out, 3);
                assert!(
                    !model.ops.iter().any(|op| matches!(op, Op::Create(_) | Op::Remove(_))),
                    "{old:?} -> {new:?} should reuse every item"
                );
            }
        }
    }

    proptest! {
        #[test]
        fn arbitrary_lists_reconcile(
            old in proptest::collection::vec(0u8..8, 0..12),
            new in proptest::collection::vec(0u8..8, 0..12),
        ) {
            let (mut model, items) = Model::seeded(old.len());
            let out = reconcile(&old, items, &new, &mut model);
            prop_assert_eq!(out.len(), new.len());
            let ids: Vec<usize> = out.iter().map(|i| i.id).collect();
            prop_assert_eq!(&model.order, &ids);

            let mut seen = ids.clone();
            seen.sort_unstable();
            seen.dedup();
            prop_assert_eq!(seen.len(), ids.len(), "an item is placed at most once");
        }
    }
}
