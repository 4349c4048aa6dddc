use std::collections::HashMap;

use crate::model::{Item, ItemSet};

/// Persistence seam used by [`merge`](super::merge).
pub trait ItemStore {
    /// The node's item ids, most recent first.
    fn load(&self, node_id: i64) -> ItemSet;

    fn load_item(&self, item_id: i64) -> Option<Item>;

    /// Assigns a unique id to an item about to be persisted and returns it.
    fn assign_id(&mut self, item: &mut Item) -> i64;

    /// Persists an item that already went through [`assign_id`](Self::assign_id).
    fn save(&mut self, item: Item);
}

/// In-memory store.
///
/// Used directly in tests and as the merge snapshot of a SQLite-backed feed:
/// existing rows are loaded with [`insert_existing`](Self::insert_existing),
/// the merge runs synchronously, and [`take_pending`](Self::take_pending)
/// yields what must be written back.
#[derive(Debug)]
pub struct MemoryItemStore {
    items: HashMap<i64, Item>,
    sets: HashMap<i64, Vec<i64>>,
    pending: Vec<i64>,
    next_id: i64,
}

impl MemoryItemStore {
    pub fn new() -> Self {
        Self::with_next_id(1)
    }

    /// Starts id assignment at `next_id`.
    pub fn with_next_id(next_id: i64) -> Self {
        Self {
            items: HashMap::new(),
            sets: HashMap::new(),
            pending: Vec::new(),
            next_id,
        }
    }

    /// Adds an already persisted item. Call in newest-first order.
    pub fn insert_existing(&mut self, item: Item) {
        let (Some(id), Some(node)) = (item.item_id, item.node_id) else {
            tracing::warn!(title = ?item.title, "Ignoring existing item without id or node");
            return;
        };
        self.next_id = self.next_id.max(id + 1);
        self.sets.entry(node).or_default().push(id);
        self.items.insert(id, item);
    }

    /// Items saved since the last call, in save order.
    pub fn take_pending(&mut self) -> Vec<Item> {
        std::mem::take(&mut self.pending)
            .into_iter()
            .filter_map(|id| self.items.get(&id).cloned())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl Default for MemoryItemStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ItemStore for MemoryItemStore {
    fn load(&self, node_id: i64) -> ItemSet {
        ItemSet {
            node_id,
            ids: self.sets.get(&node_id).cloned().unwrap_or_default(),
        }
    }

    fn load_item(&self, item_id: i64) -> Option<Item> {
        self.items.get(&item_id).cloned()
    }

    fn assign_id(&mut self, item: &mut Item) -> i64 {
        let id = self.next_id;
        self.next_id += 1;
        item.item_id = Some(id);
        id
    }

    fn save(&mut self, item: Item) {
        let Some(id) = item.item_id else {
            tracing::warn!(title = ?item.title, "Refusing to save item without an assigned id");
            return;
        };
        if let Some(node) = item.node_id {
            let ids = self.sets.entry(node).or_default();
            if !ids.contains(&id) {
                ids.insert(0, id);
            }
        }
        self.pending.push(id);
        self.items.insert(id, item);
    }
}
