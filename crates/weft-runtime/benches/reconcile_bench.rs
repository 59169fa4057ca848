//! Benchmarks for keyed list reconciliation and list commits.
//!
//! Run with: cargo bench -p weft-runtime --bench reconcile_bench

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use std::hint::black_box;
use weft_core::{HostTree, Priority};
use weft_harness::{ManualScheduler, MemoryHost};
use weft_runtime::binding::ListBinding;
use weft_runtime::{Binding, ListValue, Part, ReconcileTarget, Updater, Value, reconcile};

/// Target that only counts operations.
#[derive(Default)]
struct Counting {
    next: usize,
    ops: usize,
}

impl ReconcileTarget<usize> for Counting {
    fn create(&mut self, _index: usize, _before: Option<&usize>) -> usize {
        self.next += 1;
        self.ops += 1;
        self.next
    }

    fn update(&mut self, _item: &usize, _index: usize) {}

    fn relocate(&mut self, _item: &usize, _before: Option<&usize>) {
        self.ops += 1;
    }

    fn remove(&mut self, _item: usize) {
        self.ops += 1;
    }
}

fn run(old_keys: &[u32], new_keys: &[u32]) -> usize {
    let mut target = Counting::default();
    let old: Vec<usize> = (0..old_keys.len()).collect();
    let out = reconcile(old_keys, old, new_keys, &mut target);
    out.len() + target.ops
}

/// Deterministic shuffle: a fixed stride walk that visits every index.
fn scrambled(n: u32) -> Vec<u32> {
    let stride = 7919 % n.max(1);
    let stride = if stride == 0 || gcd(stride, n) != 1 { 1 } else { stride };
    (0..n).map(|i| (i * stride) % n.max(1)).collect()
}

fn gcd(a: u32, b: u32) -> u32 {
    if b == 0 { a } else { gcd(b, a % b) }
}

fn bench_reconcile_shapes(c: &mut Criterion) {
    let mut group = c.benchmark_group("reconcile/shapes");

    for n in [100u32, 1_000, 10_000] {
        group.throughput(Throughput::Elements(u64::from(n)));
        let keys: Vec<u32> = (0..n).collect();

        let reversed: Vec<u32> = keys.iter().rev().copied().collect();
        let mut swapped = keys.clone();
        swapped.swap(1, (n - 2) as usize);
        let appended: Vec<u32> = (0..n + n / 10).collect();
        let replaced: Vec<u32> = (n..2 * n).collect();
        let shuffled = scrambled(n);

        for (name, new_keys) in [
            ("identical", &keys),
            ("reversed", &reversed),
            ("swap_two", &swapped),
            ("append_10pct", &appended),
            ("replace_all", &replaced),
            ("shuffled", &shuffled),
        ] {
            group.bench_with_input(BenchmarkId::new(name, n), &(), |b, _| {
                b.iter(|| black_box(run(&keys, new_keys)));
            });
        }
    }

    group.finish();
}

fn bench_list_commit(c: &mut Criterion) {
    let mut group = c.benchmark_group("reconcile/list_commit");

    for n in [100u32, 1_000] {
        group.throughput(Throughput::Elements(u64::from(n)));
        let forward: Vec<u32> = (0..n).collect();
        let backward: Vec<u32> = forward.iter().rev().copied().collect();
        let list = |keys: &[u32]| {
            ListValue::keyed(keys.iter().copied(), |k, _| i64::from(*k), |k, _| Value::from(k))
        };

        group.bench_with_input(BenchmarkId::new("reverse", n), &(), |b, _| {
            let host = MemoryHost::new();
            let updater = Updater::new(host.clone(), ManualScheduler::new());
            let root = host.create_root();
            let anchor = host.create_comment("");
            let _ = host.insert_before(root, anchor, None);
            let cx = updater.context(Priority::UserBlocking);
            let mut binding = ListBinding::new(Part::child(anchor), list(&forward));
            let _ = binding.connect(&cx);
            let _ = updater.flush_sync();
            let mut flip = false;
            b.iter(|| {
                flip = !flip;
                let keys = if flip { &backward } else { &forward };
                let _ = binding.bind(list(keys).into(), &cx);
                black_box(updater.flush_sync())
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_reconcile_shapes, bench_list_commit);

criterion_main!(benches);
