//! Update queue and the sequential driver that drains it.
//!
//! The queue keeps at most one pending request per subscription: scheduling
//! cancels whatever was pending first. The driver processes one request at a
//! time (fetch, dispatch, merge, persist), so a parse attempt never overlaps
//! another attempt for the same subscription. Discovery redirects schedule
//! follow-up requests that are processed in the same run.

use anyhow::{Context, Result};
use std::collections::VecDeque;
use std::fmt;

use crate::feed::{Dispatcher, FormatRegistry, ParseContext, ParseOutcome};
use crate::fetch::{fetch_source, FetchOptions};
use crate::merge::{merge, ItemStore};
use crate::model::FetchErrorKind;
use crate::storage::Database;

/// A pending fetch for one subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateRequest {
    pub subscription_id: i64,
    pub source: String,
    /// Replace the feed title with the next discovered one
    pub reset_title: bool,
    /// User-triggered; re-arms auto-discovery
    pub manual: bool,
}

impl UpdateRequest {
    pub fn new(subscription_id: i64, source: impl Into<String>) -> Self {
        Self {
            subscription_id,
            source: source.into(),
            reset_title: false,
            manual: false,
        }
    }

    pub fn with_reset_title(mut self) -> Self {
        self.reset_title = true;
        self
    }

    pub fn manual(mut self) -> Self {
        self.manual = true;
        self
    }
}

/// FIFO of pending requests, at most one per subscription.
#[derive(Debug, Default)]
pub struct UpdateQueue {
    pending: VecDeque<UpdateRequest>,
}

impl UpdateQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues `request`, replacing any request pending for the same subscription.
    pub fn schedule(&mut self, request: UpdateRequest) {
        let replaced = self.cancel(request.subscription_id);
        tracing::trace!(
            subscription = request.subscription_id,
            source = %request.source,
            replaced,
            "Update scheduled"
        );
        self.pending.push_back(request);
    }

    /// Drops pending requests for a subscription. Returns how many were dropped;
    /// cancelling twice is harmless. A request already popped is unaffected.
    pub fn cancel(&mut self, subscription_id: i64) -> usize {
        let before = self.pending.len();
        self.pending.retain(|r| r.subscription_id != subscription_id);
        before - self.pending.len()
    }

    pub fn pop(&mut self) -> Option<UpdateRequest> {
        self.pending.pop_front()
    }

    pub fn is_pending(&self, subscription_id: i64) -> bool {
        self.pending.iter().any(|r| r.subscription_id == subscription_id)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

/// What happened to one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOutcome {
    Parsed { format: String, inserted: usize },
    NotModified,
    Redirected(String),
    Failed { kind: FetchErrorKind, message: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateReport {
    pub subscription_id: i64,
    pub source: String,
    pub outcome: UpdateOutcome,
}

impl fmt::Display for UpdateReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: ", self.subscription_id, self.source)?;
        match &self.outcome {
            UpdateOutcome::Parsed { format, inserted } => {
                write!(f, "{inserted} new item(s) ({format})")
            }
            UpdateOutcome::NotModified => f.write_str("not modified"),
            UpdateOutcome::Redirected(target) => write!(f, "redirected to {target}"),
            UpdateOutcome::Failed { kind, message } => {
                write!(f, "failed ({}): {message}", kind.as_str())
            }
        }
    }
}

/// Drains an [`UpdateQueue`] against the database.
pub struct Updater<'a> {
    db: &'a Database,
    client: &'a reqwest::Client,
    registry: FormatRegistry,
    options: FetchOptions,
    /// Retention per feed; `0` keeps everything
    capacity: usize,
}

impl<'a> Updater<'a> {
    pub fn new(
        db: &'a Database,
        client: &'a reqwest::Client,
        options: FetchOptions,
        capacity: usize,
    ) -> Self {
        Self {
            db,
            client,
            registry: FormatRegistry::standard(),
            options,
            capacity,
        }
    }

    /// Processes requests until the queue is empty, including redirects
    /// scheduled along the way.
    ///
    /// # Errors
    ///
    /// Only database failures abort the run. Fetch and parse failures are
    /// recorded on the subscription and reported.
    pub async fn run(&self, queue: &mut UpdateQueue) -> Result<Vec<UpdateReport>> {
        let mut reports = Vec::new();
        while let Some(request) = queue.pop() {
            if let Some(report) = self.process(request, queue).await? {
                tracing::info!(%report, "Update finished");
                reports.push(report);
            }
        }
        Ok(reports)
    }

    async fn process(
        &self,
        request: UpdateRequest,
        queue: &mut UpdateQueue,
    ) -> Result<Option<UpdateReport>> {
        let id = request.subscription_id;
        let Some((mut sub, mut feed)) = self.db.get_subscription(id).await? else {
            tracing::warn!(subscription = id, "Skipping update for unknown subscription");
            return Ok(None);
        };

        if request.manual {
            sub.reset_discovery();
        }
        if request.reset_title {
            feed.reset_title = true;
        }
        if sub.source != request.source {
            tracing::debug!(
                subscription = id,
                stored = %sub.source,
                requested = %request.source,
                "Fetching requested source"
            );
            sub.source = request.source.clone();
        }

        sub.update_state.last_poll = Some(chrono::Utc::now().timestamp());
        let fetched = match fetch_source(self.client, &sub.source, &sub.update_state, &self.options)
            .await
        {
            Ok(fetched) => fetched,
            Err(e) => {
                tracing::warn!(subscription = id, source = %sub.source, error = %e, "Fetch failed");
                sub.error = e.kind();
                self.db.save_subscription(&sub, &feed).await?;
                return Ok(Some(UpdateReport {
                    subscription_id: id,
                    source: sub.source,
                    outcome: UpdateOutcome::Failed {
                        kind: e.kind(),
                        message: e.to_string(),
                    },
                }));
            }
        };

        if fetched.not_modified {
            self.db.save_subscription(&sub, &feed).await?;
            return Ok(Some(UpdateReport {
                subscription_id: id,
                source: sub.source,
                outcome: UpdateOutcome::NotModified,
            }));
        }
        sub.update_state.etag = fetched.etag.clone();
        sub.update_state.last_modified = fetched.last_modified.clone();

        // Parse trees live only inside this block, never across an await
        let (outcome, items) = {
            let mut ctx = ParseContext::new(&mut sub, &mut feed, &fetched.data);
            let outcome = Dispatcher::new(&self.registry).parse(&mut ctx, queue);
            (outcome, ctx.into_items())
        };

        let outcome = match outcome {
            ParseOutcome::Parsed(handler) => {
                let mut store = self.db.load_item_store(id).await?;
                let mut item_set = store.load(id);
                let inserted = merge(&mut store, &mut item_set, items, self.capacity);
                self.db
                    .save_new_items(&store.take_pending())
                    .await
                    .with_context(|| format!("Failed to store items for subscription {id}"))?;
                self.db.prune_node(id, self.capacity).await?;
                UpdateOutcome::Parsed {
                    format: handler.type_id().to_owned(),
                    inserted,
                }
            }
            ParseOutcome::Redirected(target) => {
                // validators belong to the old URL
                sub.update_state.etag = None;
                sub.update_state.last_modified = None;
                UpdateOutcome::Redirected(target)
            }
            ParseOutcome::Failed(err) => UpdateOutcome::Failed {
                kind: err.kind(),
                message: err.to_string(),
            },
        };

        self.db.save_subscription(&sub, &feed).await?;
        Ok(Some(UpdateReport {
            subscription_id: id,
            source: sub.source,
            outcome,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schedule_replaces_pending_request() {
        let mut queue = UpdateQueue::new();
        queue.schedule(UpdateRequest::new(1, "https://a.example/"));
        queue.schedule(UpdateRequest::new(2, "https://b.example/"));
        queue.schedule(UpdateRequest::new(1, "https://a.example/feed").with_reset_title());

        assert_eq!(queue.len(), 2);
        assert_eq!(queue.pop().map(|r| r.subscription_id), Some(2));
        let replaced = queue.pop().unwrap();
        assert_eq!(replaced.source, "https://a.example/feed");
        assert!(replaced.reset_title);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_cancel_is_idempotent() {
        let mut queue = UpdateQueue::new();
        queue.schedule(UpdateRequest::new(1, "https://a.example/"));
        assert!(queue.is_pending(1));
        assert_eq!(queue.cancel(1), 1);
        assert_eq!(queue.cancel(1), 0);
        assert_eq!(queue.cancel(42), 0);
        assert!(!queue.is_pending(1));
    }

    #[test]
    fn test_cancel_does_not_affect_popped_request() {
        let mut queue = UpdateQueue::new();
        queue.schedule(UpdateRequest::new(1, "https://a.example/").manual());
        let running = queue.pop().unwrap();
        queue.cancel(1);
        assert!(running.manual);
        assert_eq!(running.source, "https://a.example/");
    }

    #[test]
    fn test_report_display() {
        let report = UpdateReport {
            subscription_id: 3,
            source: "https://a.example/feed".into(),
            outcome: UpdateOutcome::Parsed {
                format: "rss".into(),
                inserted: 2,
            },
        };
        assert_eq!(report.to_string(), "[3] https://a.example/feed: 2 new item(s) (rss)");
    }
}
