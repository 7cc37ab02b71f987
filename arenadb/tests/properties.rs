//! Property-style tests over the graph layer, complementing the allocator's
//! own proptest suite in `arenadb-alloc`. These build a randomized tree
//! through the public API and check invariants that must hold regardless
//! of the particular sequence of operations chosen.

use arenadb::{Database, NodeRef, OpenOptions, Value};
use proptest::prelude::*;

#[derive(Debug, Clone)]
enum Op {
    Leaf(i32),
    Dir,
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        (any::<i32>()).prop_map(Op::Leaf),
        Just(Op::Dir),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// Building an arbitrarily shaped tree and then clearing the root
    /// always yields an empty root, no matter how deep or wide the tree
    /// grew (spec.md §8.2 property 7).
    #[test]
    fn clear_directory_on_root_always_empties_it(ops in prop::collection::vec(op_strategy(), 1..150)) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("db");
        let mut db = Database::open(&path, OpenOptions::new().initial_size(1 << 20)).unwrap();

        // `frontier` holds every directory created so far (root included);
        // each op attaches to a pseudo-randomly chosen one of them.
        let root = db.root();
        let mut frontier: Vec<NodeRef> = vec![root];

        for (i, op) in ops.into_iter().enumerate() {
            let parent = frontier[i % frontier.len()];
            match op {
                Op::Leaf(v) => {
                    let _ = db.create_leaf(parent, "n", Value::Int(v));
                }
                Op::Dir => {
                    if let Ok(d) = db.create_directory(parent, "d") {
                        frontier.push(d);
                    }
                }
            }
        }

        db.clear_directory(root);
        let it = db.iterate(root);
        prop_assert!(!it.valid());
    }

    /// Children always come back in exactly the reverse of creation order,
    /// no matter how many are created (spec.md §8.2 property 10).
    #[test]
    fn iteration_order_is_reverse_of_creation(values in prop::collection::vec(any::<i32>(), 0..64)) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("db");
        let mut db = Database::open(&path, OpenOptions::new().initial_size(1 << 20)).unwrap();
        let root = db.root();

        for v in &values {
            db.create_leaf(root, "n", Value::Int(*v)).unwrap();
        }

        let mut seen = Vec::with_capacity(values.len());
        let mut it = db.iterate(root);
        while it.valid() {
            if let Some(arenadb::LeafValue::Int(v)) = it.value(&db) {
                seen.push(v);
            }
            it.next(&db);
        }

        let expected: Vec<i32> = values.into_iter().rev().collect();
        prop_assert_eq!(seen, expected);
    }
}
