use std::collections::HashMap;

use crate::model::{Feed, Item, Subscription};

/// State of a single parse attempt.
///
/// Created once per downloaded document and consumed with
/// [`into_items`](Self::into_items) once dispatch finishes. Handlers append
/// to `items`, may stage an entry in `current`, and may keep temporary
/// per-invocation state in `scratch`, which the dispatcher clears before each
/// handler runs.
pub struct ParseContext<'a> {
    pub subscription: &'a mut Subscription,
    pub feed: &'a mut Feed,
    pub items: Vec<Item>,
    pub current: Option<Item>,
    pub scratch: HashMap<String, String>,
    /// Title discovered in the document, applied to the feed on success
    pub title: Option<String>,
    data: &'a [u8],
}

impl<'a> ParseContext<'a> {
    pub fn new(subscription: &'a mut Subscription, feed: &'a mut Feed, data: &'a [u8]) -> Self {
        Self {
            subscription,
            feed,
            items: Vec::new(),
            current: None,
            scratch: HashMap::new(),
            title: None,
            data,
        }
    }

    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    pub fn data_len(&self) -> usize {
        self.data.len()
    }

    /// Starts a new item, discarding any unfinished one.
    pub fn begin_item(&mut self) -> &mut Item {
        self.current.insert(Item::default())
    }

    /// Moves the item under construction into `items`.
    pub fn finish_item(&mut self) {
        if let Some(item) = self.current.take() {
            self.items.push(item);
        }
    }

    /// Sets the discovered title unless a handler already found one.
    pub fn set_title(&mut self, title: Option<String>) {
        if self.title.is_none() {
            self.title = title.filter(|t| !t.trim().is_empty());
        }
    }

    /// Drops everything produced so far. Used when an attempt fails.
    pub(crate) fn discard(&mut self) {
        self.items.clear();
        self.current = None;
        self.title = None;
    }

    pub(crate) fn reset_scratch(&mut self) {
        self.scratch.clear();
    }

    pub fn into_items(self) -> Vec<Item> {
        self.items
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_begin_and_finish_item() {
        let mut sub = Subscription::new(1, "https://example.com/feed");
        let mut feed = Feed::new(1);
        let mut ctx = ParseContext::new(&mut sub, &mut feed, b"<rss/>");

        ctx.begin_item().set_title("one");
        ctx.finish_item();
        // finishing twice does not duplicate
        ctx.finish_item();
        assert_eq!(ctx.data_len(), 6);

        let items = ctx.into_items();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].title.as_deref(), Some("one"));
    }

    #[test]
    fn test_first_title_wins() {
        let mut sub = Subscription::new(1, "https://example.com/feed");
        let mut feed = Feed::new(1);
        let mut ctx = ParseContext::new(&mut sub, &mut feed, b"");
        ctx.set_title(Some("  ".into()));
        ctx.set_title(Some("Channel".into()));
        ctx.set_title(Some("Other".into()));
        assert_eq!(ctx.title.as_deref(), Some("Channel"));
    }
}
