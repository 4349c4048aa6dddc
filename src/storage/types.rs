use thiserror::Error;

use crate::model::{Feed, FetchErrorKind, Item, Subscription, UpdateState};

// ============================================================================
// Error Types
// ============================================================================

/// Database-specific errors with user-friendly messages
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Another instance of the application has locked the database
    #[error("Another instance of feedsift appears to be running. Please close it and try again.")]
    InstanceLocked,

    /// Migration failed
    #[error("Database migration failed: {0}")]
    Migration(String),

    /// Generic database error
    #[error("Database error: {0}")]
    Other(#[from] sqlx::Error),
}

impl DatabaseError {
    /// Check if a sqlx error indicates database locking
    pub(crate) fn from_sqlx(err: sqlx::Error) -> Self {
        let error_string = err.to_string().to_lowercase();

        // SQLITE_BUSY (5), SQLITE_LOCKED (6), SQLITE_CANTOPEN (14)
        if error_string.contains("database is locked")
            || error_string.contains("database table is locked")
            || error_string.contains("sqlite_busy")
            || error_string.contains("sqlite_locked")
            || error_string.contains("unable to open database file")
        {
            return DatabaseError::InstanceLocked;
        }

        DatabaseError::Other(err)
    }
}

// ============================================================================
// Row Types
// ============================================================================

/// Internal row type for subscription queries (used by sqlx FromRow).
/// Splits into the subscription record and its feed node via `into_parts()`.
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct SubscriptionRow {
    pub id: i64,
    pub source: String,
    pub title: Option<String>,
    pub homepage: Option<String>,
    pub description: Option<String>,
    pub image: Option<String>,
    pub format: Option<String>,
    pub error: String,
    pub parse_errors: String,
    pub auto_discovery_tries: i64,
    pub reset_title: bool,
    pub etag: Option<String>,
    pub last_modified: Option<String>,
    pub last_poll: Option<i64>,
}

impl SubscriptionRow {
    pub(crate) fn into_parts(self) -> (Subscription, Feed) {
        let subscription = Subscription {
            id: self.id,
            source: self.source,
            error: FetchErrorKind::from_db(&self.error),
            auto_discovery_tries: u32::try_from(self.auto_discovery_tries).unwrap_or(0),
            update_state: UpdateState {
                etag: self.etag,
                last_modified: self.last_modified,
                last_poll: self.last_poll,
            },
        };
        let feed = Feed {
            node_id: self.id,
            title: self.title,
            homepage: self.homepage,
            description: self.description,
            image: self.image,
            format: self.format,
            parse_errors: self.parse_errors,
            reset_title: self.reset_title,
        };
        (subscription, feed)
    }
}

/// Internal row type for item queries. Metadata is attached separately.
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct ItemRow {
    pub id: i64,
    pub node_id: i64,
    pub source_id: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub source: Option<String>,
    pub time: Option<i64>,
    pub has_enclosure: bool,
}

impl ItemRow {
    pub(crate) fn into_item(self) -> Item {
        Item {
            item_id: Some(self.id),
            node_id: Some(self.node_id),
            id: self.source_id,
            title: self.title,
            description: self.description,
            source: self.source,
            time: self.time,
            metadata: Vec::new(),
            has_enclosure: self.has_enclosure,
        }
    }
}

/// Internal row type for `item_metadata`.
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct MetadataRow {
    pub item_id: i64,
    pub key: String,
    pub value: String,
}
