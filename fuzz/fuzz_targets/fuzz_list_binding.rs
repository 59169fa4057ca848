#![no_main]

//! Structured operation sequences against a list binding on the in-memory
//! host. After every flush the committed text must spell the last bound list.

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use weft_core::{HostTree, Priority};
use weft_harness::{ManualScheduler, MemoryHost};
use weft_runtime::binding::ListBinding;
use weft_runtime::{Binding, ListValue, Part, Updater, Value};

#[derive(Debug, Arbitrary)]
enum Op {
    Bind(Vec<u8>),
    Unbind,
    Flush,
}

fn list(keys: &[u8]) -> ListValue {
    ListValue::keyed(
        keys.iter().copied(),
        |k, _| i64::from(*k % 16),
        |k, _| Value::from(char::from(b'a' + k % 16).to_string()),
    )
}

fn spelled(keys: &[u8]) -> String {
    keys.iter().map(|k| char::from(b'a' + *k % 16)).collect()
}

fuzz_target!(|ops: Vec<Op>| {
    if ops.len() > 64 {
        return;
    }
    let host = MemoryHost::new();
    let updater = Updater::new(host.clone(), ManualScheduler::new());
    let root = host.create_root();
    let anchor = host.create_comment("");
    if host.insert_before(root, anchor, None).is_err() {
        return;
    }
    let cx = updater.context(Priority::UserBlocking);
    let mut binding = ListBinding::new(Part::child(anchor), ListValue::new());
    binding.connect(&cx).expect("fresh binding connects");

    let mut expected = String::new();
    let mut attached = true;
    for op in ops {
        match op {
            Op::Bind(keys) => {
                let keys: Vec<u8> = keys.into_iter().take(32).collect();
                binding.bind(list(&keys).into(), &cx).expect("list accepts lists");
                expected = spelled(&keys);
                attached = true;
            }
            Op::Unbind => {
                binding.unbind(&cx);
                attached = false;
            }
            Op::Flush => {
                updater.flush_sync().expect("commit succeeds");
                let want = if attached { expected.as_str() } else { "" };
                assert_eq!(host.text_content(root), want);
            }
        }
    }
});
