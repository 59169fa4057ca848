#![no_main]

//! Arbitrary key sequences through the reconciler. Every old item must be
//! returned or removed exactly once, and the output must follow the new keys.

use libfuzzer_sys::fuzz_target;
use weft_runtime::{ReconcileTarget, reconcile};

#[derive(Default)]
struct Ledger {
    next: u32,
    created: Vec<u32>,
    removed: Vec<u32>,
    assigned: Vec<(u32, usize)>,
}

impl ReconcileTarget<u32> for Ledger {
    fn create(&mut self, index: usize, _before: Option<&u32>) -> u32 {
        self.next += 1;
        let id = 1_000 + self.next;
        self.created.push(id);
        self.assigned.push((id, index));
        id
    }

    fn update(&mut self, item: &u32, index: usize) {
        self.assigned.push((*item, index));
    }

    fn relocate(&mut self, _item: &u32, _before: Option<&u32>) {}

    fn remove(&mut self, item: u32) {
        self.removed.push(item);
    }
}

fuzz_target!(|input: (Vec<u8>, Vec<u8>)| {
    let (old_keys, new_keys) = input;
    if old_keys.len() > 256 || new_keys.len() > 256 {
        return;
    }
    let old: Vec<u32> = (0..old_keys.len() as u32).collect();
    let mut ledger = Ledger::default();
    let out = reconcile(&old_keys, old.clone(), &new_keys, &mut ledger);

    assert_eq!(out.len(), new_keys.len());
    for (index, item) in out.iter().enumerate() {
        if *item < 1_000 {
            assert_eq!(old_keys[*item as usize], new_keys[index]);
        }
        let last = ledger.assigned.iter().rev().find(|(id, _)| id == item);
        assert_eq!(last.map(|(_, at)| *at), Some(index));
    }

    let mut seen: Vec<u32> = out.iter().copied().filter(|id| *id < 1_000).collect();
    seen.extend(&ledger.removed);
    seen.sort_unstable();
    assert_eq!(seen, old, "every old item is kept or removed once");
});
