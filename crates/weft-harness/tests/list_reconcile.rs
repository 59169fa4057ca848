#![forbid(unsafe_code)]

//! Integration tests: keyed lists committed to the in-memory host.

use std::rc::Rc;

use ahash::AHashMap;
use proptest::prelude::*;
use weft_core::{HostTree, NodeId, NodeKind, Priority, ProtocolError};
use weft_harness::{HostOp, ManualScheduler, MemoryHost};
use weft_runtime::binding::ListBinding;
use weft_runtime::{Binding, ListValue, Part, Updater, Value};

struct Fixture {
    host: Rc<MemoryHost>,
    updater: Updater,
    root: NodeId,
    list: ListBinding,
}

impl Fixture {
    fn new(initial: &[u8]) -> Self {
        let host = MemoryHost::new();
        let updater = Updater::new(host.clone(), ManualScheduler::new());
        let root = host.create_root();
        let anchor = host.create_comment("");
        host.insert_before(root, anchor, None).unwrap();
        let mut list = ListBinding::new(Part::child(anchor), letters(initial));
        list.connect(&updater.context(Priority::UserBlocking)).unwrap();
        updater.flush_sync().unwrap();
        Self {
            host,
            updater,
            root,
            list,
        }
    }

    fn rebind(&mut self, keys: &[u8]) {
        let cx = self.updater.context(Priority::UserBlocking);
        self.list.bind(letters(keys).into(), &cx).unwrap();
        self.updater.flush_sync().unwrap();
    }

    /// Text node per rendered letter, in document order.
    fn text_nodes(&self) -> Vec<(String, NodeId)> {
        self.host
            .children(self.root)
            .into_iter()
            .filter(|node| self.host.kind(*node) == Some(NodeKind::Text))
            .map(|node| (self.host.text_content(node), node))
            .collect()
    }
}

fn letter(key: u8) -> String {
    char::from(b'a' + key % 26).to_string()
}

fn letters(keys: &[u8]) -> ListValue {
    ListValue::keyed(
        keys.iter().copied(),
        |key, _| i64::from(*key),
        |key, _| Value::from(letter(key)),
    )
}

fn rendered(keys: &[u8]) -> String {
    keys.iter().map(|key| letter(*key)).collect()
}

fn distinct_keys(max_len: usize) -> impl Strategy<Value = Vec<u8>> {
    proptest::sample::subsequence((0u8..26).collect::<Vec<_>>(), 0..=max_len)
        .prop_shuffle()
}

// ============================================================================
// Fixed scenarios
// ============================================================================

#[test]
fn swap_ends_keeps_every_node() {
    let mut fx = Fixture::new(&[0, 1, 2, 3]);
    let before: AHashMap<_, _> = fx.text_nodes().into_iter().collect();
    fx.host.take_ops();

    fx.rebind(&[3, 1, 2, 0]);
    assert_eq!(fx.host.markup(fx.root), "<root>dbca</root>");
    for (text, node) in fx.text_nodes() {
        assert_eq!(before[&text], node, "node for {text} was replaced");
    }
    let ops = fx.host.take_ops();
    assert!(!ops.iter().any(|op| matches!(op, HostOp::Create { .. } | HostOp::Remove { .. })));
}

#[test]
fn replacing_every_key_creates_fresh_nodes() {
    let mut fx = Fixture::new(&[0, 1]);
    let before: Vec<NodeId> = fx.text_nodes().into_iter().map(|(_, node)| node).collect();
    fx.rebind(&[2, 3]);
    assert_eq!(fx.host.markup(fx.root), "<root>cd</root>");
    for (_, node) in fx.text_nodes() {
        assert!(!before.contains(&node));
    }
    for node in before {
        assert!(!fx.host.is_attached(node));
    }
}

#[test]
fn value_change_under_same_key_updates_in_place() {
    let mut fx = Fixture::new(&[0]);
    let (_, node) = fx.text_nodes()[0].clone();
    fx.host.take_ops();

    let cx = fx.updater.context(Priority::UserBlocking);
    let list = ListValue::new().with(0, "changed");
    fx.list.bind(list.into(), &cx).unwrap();
    fx.updater.flush_sync().unwrap();

    assert_eq!(fx.host.markup(fx.root), "<root>changed</root>");
    assert_eq!(
        fx.host.take_ops(),
        vec![HostOp::SetText {
            node,
            data: "changed".into()
        }]
    );
}

#[test]
fn unbind_removes_everything() {
    let mut fx = Fixture::new(&[4, 5, 6]);
    fx.list.unbind(&fx.updater.context(Priority::UserBlocking));
    fx.updater.flush_sync().unwrap();
    assert_eq!(fx.host.markup(fx.root), "<root></root>");
    assert_eq!(fx.list.len(), 3, "items survive for a later rebind");
}

#[test]
fn disconnected_list_rejects_values() {
    let mut fx = Fixture::new(&[1]);
    fx.list.disconnect();
    let cx = fx.updater.context(Priority::UserBlocking);
    let err = fx.list.bind(letters(&[2]).into(), &cx).unwrap_err();
    assert_eq!(err.as_protocol(), Some(&ProtocolError::DisconnectedBinding));
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// The committed tree always spells the latest list.
    #[test]
    fn committed_order_matches_latest_list(
        steps in prop::collection::vec(prop::collection::vec(0u8..8, 0..10), 1..6),
    ) {
        let mut fx = Fixture::new(&[]);
        for keys in &steps {
            fx.rebind(keys);
            prop_assert_eq!(fx.host.markup(fx.root), format!("<root>{}</root>", rendered(keys)));
        }
    }

    /// Surviving keys keep their host nodes.
    #[test]
    fn surviving_keys_keep_nodes(old in distinct_keys(12), new in distinct_keys(12)) {
        let mut fx = Fixture::new(&old);
        let before: AHashMap<_, _> = fx.text_nodes().into_iter().collect();
        fx.rebind(&new);
        for (text, node) in fx.text_nodes() {
            if let Some(previous) = before.get(&text) {
                prop_assert_eq!(*previous, node, "key {} lost its node", text);
            }
        }
        let survivors: Vec<NodeId> = fx.text_nodes().into_iter().map(|(_, node)| node).collect();
        for node in before.values() {
            prop_assert_eq!(fx.host.is_attached(*node), survivors.contains(node));
        }
    }

    /// A permutation never creates or destroys host nodes.
    #[test]
    fn permutation_only_moves((old, new) in distinct_keys(10).prop_flat_map(|old| {
        let shuffled = Just(old.clone()).prop_shuffle();
        (Just(old), shuffled)
    })) {
        let mut fx = Fixture::new(&old);
        fx.host.take_ops();
        fx.rebind(&new);
        let ops = fx.host.take_ops();
        prop_assert!(ops.iter().all(|op| matches!(op, HostOp::Insert { .. })), "{:?}", ops);
        // Each item region is its text node plus a comment anchor.
        prop_assert!(ops.len() <= 2 * new.len());
    }
}
