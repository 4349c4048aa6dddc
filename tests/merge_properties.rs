//! Property tests for the merge engine's identity rules.

use std::collections::HashSet;

use proptest::prelude::*;

use feedsift::merge::{merge, same_item, ItemStore, MemoryItemStore};
use feedsift::model::{Item, ItemSet};

const NODE: i64 = 7;

/// Small value pools so batches collide often.
fn arb_item() -> impl Strategy<Value = Item> {
    (
        prop::option::of(0u8..4),
        prop::option::of(0u8..3),
        prop::option::of(0u8..3),
    )
        .prop_map(|(id, title, description)| Item {
            id: id.map(|n| format!("urn:{n}")),
            title: title.map(|n| format!("title {n}")),
            description: description.map(|n| format!("<p>{n}</p>")),
            ..Item::default()
        })
}

fn arb_batch() -> impl Strategy<Value = Vec<Item>> {
    prop::collection::vec(arb_item(), 0..12)
}

fn fresh() -> (MemoryItemStore, ItemSet) {
    let store = MemoryItemStore::new();
    let set = store.load(NODE);
    (store, set)
}

proptest! {
    #[test]
    fn merging_twice_inserts_nothing_new(batch in arb_batch()) {
        let (mut store, mut set) = fresh();
        let first = merge(&mut store, &mut set, batch.clone(), 0);
        let second = merge(&mut store, &mut set, batch, 0);

        prop_assert_eq!(second, 0);
        prop_assert_eq!(set.len(), first);
    }

    #[test]
    fn one_item_per_stable_id(batch in arb_batch()) {
        let with_ids: Vec<Item> = batch.into_iter().filter(|i| i.id.is_some()).collect();
        let distinct: HashSet<_> = with_ids.iter().filter_map(|i| i.id.clone()).collect();

        let (mut store, mut set) = fresh();
        let inserted = merge(&mut store, &mut set, with_ids, 0);
        prop_assert_eq!(inserted, distinct.len());

        let stored: HashSet<_> = set
            .ids
            .iter()
            .filter_map(|&id| store.load_item(id))
            .filter_map(|i| i.id)
            .collect();
        prop_assert_eq!(stored, distinct);
    }

    #[test]
    fn id_never_matches_missing_id(item in arb_item()) {
        let mut with_id = item.clone();
        with_id.id = Some("urn:fixed".into());
        let mut without_id = item;
        without_id.id = None;

        prop_assert!(!same_item(&with_id, &without_id));
        prop_assert!(!same_item(&without_id, &with_id));
    }

    #[test]
    fn matching_ids_ignore_content(a in arb_item(), b in arb_item()) {
        let mut a = a;
        let mut b = b;
        a.id = Some("urn:same".into());
        b.id = Some("urn:same".into());
        prop_assert!(same_item(&a, &b));
    }

    #[test]
    fn capacity_bounds_insertions(batch in arb_batch(), capacity in 1usize..5) {
        let (mut store, mut set) = fresh();
        let inserted = merge(&mut store, &mut set, batch, capacity);
        prop_assert!(inserted <= capacity);
        prop_assert_eq!(store.take_pending().len(), inserted);
    }

    #[test]
    fn inserted_items_belong_to_node(batch in arb_batch()) {
        let (mut store, mut set) = fresh();
        merge(&mut store, &mut set, batch, 0);

        let unique: HashSet<_> = set.ids.iter().copied().collect();
        prop_assert_eq!(unique.len(), set.len());
        for &id in &set.ids {
            let item = store.load_item(id);
            prop_assert!(item.is_some());
            prop_assert_eq!(item.and_then(|i| i.node_id), Some(NODE));
        }
    }
}
