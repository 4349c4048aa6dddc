use anyhow::Result;

use super::schema::Database;
use super::types::SubscriptionRow;
use crate::model::{Feed, Subscription};

const SUBSCRIPTION_COLUMNS: &str = "id, source, title, homepage, description, image, format, \
     error, parse_errors, auto_discovery_tries, reset_title, etag, last_modified, last_poll";

impl Database {
    // ========================================================================
    // Subscription Operations
    // ========================================================================

    /// Adds a subscription for `source`, returning its id.
    ///
    /// An existing subscription with the same source is reused.
    pub async fn add_subscription(&self, source: &str) -> Result<i64> {
        let source = source.trim();
        let mut tx = self.pool.begin().await?;

        let existing: Option<(i64,)> =
            sqlx::query_as("SELECT id FROM subscriptions WHERE source = ? LIMIT 1")
                .bind(source)
                .fetch_optional(&mut *tx)
                .await?;
        if let Some((id,)) = existing {
            tracing::debug!(id, source = %source, "Subscription already exists");
            return Ok(id);
        }

        let id = sqlx::query("INSERT INTO subscriptions (source) VALUES (?)")
            .bind(source)
            .execute(&mut *tx)
            .await?
            .last_insert_rowid();
        tx.commit().await?;

        tracing::info!(id, source = %source, "Subscription added");
        Ok(id)
    }

    pub async fn get_subscription(&self, id: i64) -> Result<Option<(Subscription, Feed)>> {
        let row: Option<SubscriptionRow> = sqlx::query_as(&format!(
            "SELECT {SUBSCRIPTION_COLUMNS} FROM subscriptions WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(SubscriptionRow::into_parts))
    }

    pub async fn list_subscriptions(&self) -> Result<Vec<(Subscription, Feed)>> {
        let rows: Vec<SubscriptionRow> = sqlx::query_as(&format!(
            "SELECT {SUBSCRIPTION_COLUMNS} FROM subscriptions ORDER BY id"
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(SubscriptionRow::into_parts).collect())
    }

    /// Persists subscription and feed state after an update attempt.
    pub async fn save_subscription(&self, subscription: &Subscription, feed: &Feed) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE subscriptions SET
                source = ?, title = ?, homepage = ?, description = ?, image = ?,
                format = ?, error = ?, parse_errors = ?, auto_discovery_tries = ?,
                reset_title = ?, etag = ?, last_modified = ?, last_poll = ?
            WHERE id = ?
        "#,
        )
        .bind(&subscription.source)
        .bind(&feed.title)
        .bind(&feed.homepage)
        .bind(&feed.description)
        .bind(&feed.image)
        .bind(&feed.format)
        .bind(subscription.error.as_str())
        .bind(&feed.parse_errors)
        .bind(i64::from(subscription.auto_discovery_tries))
        .bind(feed.reset_title)
        .bind(&subscription.update_state.etag)
        .bind(&subscription.update_state.last_modified)
        .bind(subscription.update_state.last_poll)
        .bind(subscription.id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            anyhow::bail!("Subscription {} does not exist", subscription.id);
        }
        Ok(())
    }

    /// Removes a subscription and, through cascading deletes, its items.
    pub async fn remove_subscription(&self, id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM subscriptions WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
