//! Merge freshly parsed items into a feed's persisted item set.
//!
//! # Identity
//!
//! Two items denote the same entry when:
//!
//! - both carry a stable id and the ids are equal (title and description are
//!   ignored), or
//! - neither carries an id, and neither the titles nor the descriptions
//!   differ where both sides have one.
//!
//! An item with an id never matches one without. A matched item is dropped;
//! the existing item is left untouched even if its content changed.

mod store;

pub use store::{ItemStore, MemoryItemStore};

use crate::model::{Item, ItemSet};

/// Merges `new_items` (newest first) into `item_set`, returning how many were inserted.
///
/// Only the first `capacity` items are considered; `0` means no limit. New
/// items are persisted through `store` and prepended to `item_set`, so after
/// the merge the set is still newest first. Items inserted earlier in the same
/// batch take part in later comparisons.
pub fn merge<S: ItemStore>(
    store: &mut S,
    item_set: &mut ItemSet,
    mut new_items: Vec<Item>,
    capacity: usize,
) -> usize {
    if capacity > 0 && new_items.len() > capacity {
        tracing::debug!(
            node = item_set.node_id,
            dropped = new_items.len() - capacity,
            capacity,
            "Batch exceeds feed capacity, dropping oldest items"
        );
        new_items.truncate(capacity);
    }

    let mut candidates: Vec<Item> = item_set
        .ids
        .iter()
        .filter_map(|&id| store.load_item(id))
        .collect();

    let mut inserted = 0;
    // oldest first, so prepending rebuilds newest-first order
    for mut item in new_items.into_iter().rev() {
        if let Some(existing) = candidates.iter().find(|e| same_item(&item, e)) {
            tracing::trace!(
                node = item_set.node_id,
                existing = ?existing.item_id,
                title = ?item.title,
                "Dropping duplicate item"
            );
            continue;
        }

        item.node_id = Some(item_set.node_id);
        let id = store.assign_id(&mut item);
        item_set.prepend(id);
        candidates.push(item.clone());
        store.save(item);
        inserted += 1;
    }

    if inserted > 0 {
        tracing::debug!(node = item_set.node_id, inserted, "Merged new items");
    }
    inserted
}

/// True if `new` and `existing` denote the same entry.
pub fn same_item(new: &Item, existing: &Item) -> bool {
    match (&new.id, &existing.id) {
        (Some(a), Some(b)) => a == b,
        (Some(_), None) | (None, Some(_)) => false,
        (None, None) => {
            !differs(&new.title, &existing.title)
                && !differs(&new.description, &existing.description)
        }
    }
}

fn differs(a: &Option<String>, b: &Option<String>) -> bool {
    matches!((a, b), (Some(a), Some(b)) if a != b)
}
