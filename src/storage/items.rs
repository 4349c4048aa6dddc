use anyhow::{Context, Result};
use sqlx::QueryBuilder;
use std::collections::HashMap;

use super::schema::Database;
use super::types::{ItemRow, MetadataRow};
use crate::merge::MemoryItemStore;
use crate::model::Item;

/// Maximum number of items returned from any single listing query (OOM protection)
const MAX_ITEMS: i64 = 2000;

const ITEM_COLUMNS: &str =
    "id, node_id, source_id, title, description, source, time, has_enclosure";

impl Database {
    // ========================================================================
    // Item Operations
    // ========================================================================

    /// Loads a node's items into an in-memory store for merging.
    ///
    /// Ids assigned by the returned store continue after the largest id in
    /// the table, so [`save_new_items`](Self::save_new_items) can insert them
    /// verbatim. Assumes a single writer per database.
    pub async fn load_item_store(&self, node_id: i64) -> Result<MemoryItemStore> {
        let (max_id,): (i64,) = sqlx::query_as("SELECT COALESCE(MAX(id), 0) FROM items")
            .fetch_one(&self.pool)
            .await?;

        let mut store = MemoryItemStore::with_next_id(max_id + 1);
        for item in self.load_items(node_id, None).await? {
            store.insert_existing(item);
        }
        Ok(store)
    }

    /// Persists items produced by a merge, with their metadata, in one transaction.
    pub async fn save_new_items(&self, items: &[Item]) -> Result<usize> {
        if items.is_empty() {
            return Ok(0);
        }

        let now = chrono::Utc::now().timestamp();
        let mut tx = self.pool.begin().await?;

        // 9 columns * 50 rows stays under SQLite's parameter limit
        const BATCH_SIZE: usize = 50;
        for chunk in items.chunks(BATCH_SIZE) {
            let mut builder: QueryBuilder<sqlx::Sqlite> = QueryBuilder::new(
                "INSERT INTO items (id, node_id, source_id, title, description, source, time, has_enclosure, created_at) ",
            );
            builder.push_values(chunk, |mut b, item| {
                b.push_bind(item.item_id)
                    .push_bind(item.node_id)
                    .push_bind(&item.id)
                    .push_bind(&item.title)
                    .push_bind(&item.description)
                    .push_bind(&item.source)
                    .push_bind(item.time)
                    .push_bind(item.has_enclosure)
                    .push_bind(now);
            });
            builder
                .build()
                .execute(&mut *tx)
                .await
                .context("Failed to insert items")?;
        }

        let metadata: Vec<(i64, i64, &str, &str)> = items
            .iter()
            .filter_map(|item| item.item_id.map(|id| (id, item)))
            .flat_map(|(id, item)| {
                item.metadata
                    .iter()
                    .enumerate()
                    .map(move |(pos, (k, v))| (id, pos as i64, k.as_str(), v.as_str()))
            })
            .collect();

        for chunk in metadata.chunks(BATCH_SIZE) {
            let mut builder: QueryBuilder<sqlx::Sqlite> =
                QueryBuilder::new("INSERT INTO item_metadata (item_id, position, key, value) ");
            builder.push_values(chunk, |mut b, (id, pos, key, value)| {
                b.push_bind(*id)
                    .push_bind(*pos)
                    .push_bind(*key)
                    .push_bind(*value);
            });
            builder
                .build()
                .execute(&mut *tx)
                .await
                .context("Failed to insert item metadata")?;
        }

        tx.commit().await?;
        Ok(items.len())
    }

    /// A node's items, newest first, with metadata.
    pub async fn get_items_for_node(&self, node_id: i64, limit: i64) -> Result<Vec<Item>> {
        self.load_items(node_id, Some(limit.clamp(0, MAX_ITEMS))).await
    }

    pub async fn count_items(&self, node_id: i64) -> Result<i64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM items WHERE node_id = ?")
            .bind(node_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// Deletes all but the newest `keep` items of a node. `0` keeps everything.
    pub async fn prune_node(&self, node_id: i64, keep: usize) -> Result<u64> {
        if keep == 0 {
            return Ok(0);
        }
        let keep = i64::try_from(keep).unwrap_or(i64::MAX);

        let result = sqlx::query(
            r#"
            DELETE FROM items
            WHERE node_id = ? AND id NOT IN (
                SELECT id FROM items WHERE node_id = ? ORDER BY id DESC LIMIT ?
            )
        "#,
        )
        .bind(node_id)
        .bind(node_id)
        .bind(keep)
        .execute(&self.pool)
        .await?;

        let removed = result.rows_affected();
        if removed > 0 {
            tracing::debug!(node = node_id, removed, keep, "Pruned items beyond retention");
        }
        Ok(removed)
    }

    async fn load_items(&self, node_id: i64, limit: Option<i64>) -> Result<Vec<Item>> {
        // SQLite treats a negative LIMIT as no limit
        let rows: Vec<ItemRow> = sqlx::query_as(&format!(
            "SELECT {ITEM_COLUMNS} FROM items WHERE node_id = ? ORDER BY id DESC LIMIT ?"
        ))
        .bind(node_id)
        .bind(limit.unwrap_or(-1))
        .fetch_all(&self.pool)
        .await?;

        let metadata: Vec<MetadataRow> = sqlx::query_as(
            r#"
            SELECT m.item_id, m.key, m.value
            FROM item_metadata m
            JOIN items i ON i.id = m.item_id
            WHERE i.node_id = ?
            ORDER BY m.item_id, m.position
        "#,
        )
        .bind(node_id)
        .fetch_all(&self.pool)
        .await?;

        let mut by_item: HashMap<i64, Vec<(String, String)>> = HashMap::new();
        for row in metadata {
            by_item
                .entry(row.item_id)
                .or_default()
                .push((row.key, row.value));
        }

        Ok(rows
            .into_iter()
            .map(|row| {
                let id = row.id;
                let mut item = row.into_item();
                item.metadata = by_item.remove(&id).unwrap_or_default();
                item
            })
            .collect())
    }
}
