//! Core records shared by the parsing pipeline, the merge engine and storage.
//!
//! - [`Subscription`]: where a feed comes from, plus discovery and error state
//! - [`Feed`]: feed-level metadata populated by a parse attempt
//! - [`Item`]: a single entry produced by a format handler
//! - [`ItemSet`]: the ordered item ids of one feed node

use serde::Serialize;

use crate::util::{collapse_whitespace, escape_html, sanitize_html, strip_control_chars};

/// Coarse error classification surfaced to the UI layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FetchErrorKind {
    #[default]
    None,
    /// Download failed (DNS, TLS, HTTP status, timeout)
    Net,
    /// Server refused credentials (401/403)
    Auth,
    /// Document is not well-formed XML
    Xml,
    /// Page is HTML and no feed link could be discovered
    Discover,
    /// Anything else, including "could not determine feed type"
    Unknown,
}

impl FetchErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            FetchErrorKind::None => "none",
            FetchErrorKind::Net => "net",
            FetchErrorKind::Auth => "auth",
            FetchErrorKind::Xml => "xml",
            FetchErrorKind::Discover => "discover",
            FetchErrorKind::Unknown => "unknown",
        }
    }

    /// Inverse of [`as_str`](Self::as_str). Unrecognized values map to `Unknown`.
    pub fn from_db(value: &str) -> Self {
        match value {
            "none" | "" => FetchErrorKind::None,
            "net" => FetchErrorKind::Net,
            "auth" => FetchErrorKind::Auth,
            "xml" => FetchErrorKind::Xml,
            "discover" => FetchErrorKind::Discover,
            _ => FetchErrorKind::Unknown,
        }
    }
}

/// Conditional-request and polling state. Opaque to the parsing core.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateState {
    pub etag: Option<String>,
    pub last_modified: Option<String>,
    pub last_poll: Option<i64>,
}

/// Persistent description of where and how a feed is fetched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    pub id: i64,
    pub source: String,
    pub error: FetchErrorKind,
    /// Consecutive auto-discovery attempts since the last direct parse success
    pub auto_discovery_tries: u32,
    pub update_state: UpdateState,
}

impl Subscription {
    /// Discovery is suppressed once the counter exceeds this bound.
    pub const MAX_DISCOVERY_TRIES: u32 = 5;

    pub fn new(id: i64, source: impl Into<String>) -> Self {
        Self {
            id,
            source: source.into(),
            error: FetchErrorKind::None,
            auto_discovery_tries: 0,
            update_state: UpdateState::default(),
        }
    }

    /// Re-arms auto-discovery. Called on manual refresh.
    pub fn reset_discovery(&mut self) {
        self.auto_discovery_tries = 0;
    }

    pub fn discovery_exhausted(&self) -> bool {
        self.auto_discovery_tries > Self::MAX_DISCOVERY_TRIES
    }
}

/// Feed metadata being populated by a parse attempt.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Feed {
    pub node_id: i64,
    pub title: Option<String>,
    pub homepage: Option<String>,
    pub description: Option<String>,
    pub image: Option<String>,
    /// Type id of the format handler that claimed the last successful parse
    pub format: Option<String>,
    /// Accumulated, HTML-escaped diagnostics of the last attempt
    pub parse_errors: String,
    /// Replace the title with the next discovered one
    pub reset_title: bool,
}

impl Feed {
    pub fn new(node_id: i64) -> Self {
        Self {
            node_id,
            ..Self::default()
        }
    }

    /// Appends a diagnostic line. Text is escaped so the UI can render it as markup.
    pub fn push_parse_error(&mut self, message: &str) {
        if !self.parse_errors.is_empty() {
            self.parse_errors.push('\n');
        }
        self.parse_errors.push_str(&escape_html(message));
    }
}

/// A single feed entry.
///
/// Metadata keys are not unique: `category` may appear several times. The
/// order of pairs is the order handlers appended them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Item {
    /// Store id, assigned on first persist
    pub item_id: Option<i64>,
    /// Owning feed node, assigned by the merge engine
    pub node_id: Option<i64>,
    /// Stable id published by the feed (RSS guid, Atom id)
    pub id: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub source: Option<String>,
    /// Unix timestamp in seconds
    pub time: Option<i64>,
    pub metadata: Vec<(String, String)>,
    pub has_enclosure: bool,
}

impl Item {
    /// Sets the stable id. Blank ids are treated as absent.
    pub fn set_id(&mut self, raw: &str) {
        self.id = non_blank(raw.trim());
    }

    pub fn set_title(&mut self, raw: &str) {
        self.title = non_blank(&collapse_whitespace(&strip_control_chars(raw)));
    }

    pub fn set_description(&mut self, raw: &str) {
        self.description = non_blank(&sanitize_html(raw));
    }

    pub fn set_source(&mut self, raw: &str) {
        self.source = non_blank(raw.trim());
    }

    pub fn add_metadata(&mut self, key: &str, value: &str) {
        let value = value.trim();
        if !value.is_empty() {
            self.metadata.push((key.to_owned(), value.to_owned()));
        }
    }

    pub fn metadata_values<'a>(&'a self, key: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.metadata
            .iter()
            .filter(move |(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

fn non_blank(s: &str) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s.to_owned())
    }
}

/// Ordered item ids of one feed node, most recent first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ItemSet {
    pub node_id: i64,
    pub ids: Vec<i64>,
}

impl ItemSet {
    pub fn new(node_id: i64) -> Self {
        Self {
            node_id,
            ids: Vec::new(),
        }
    }

    pub fn prepend(&mut self, id: i64) {
        self.ids.insert(0, id);
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_id_is_absent() {
        let mut item = Item::default();
        item.set_id("   ");
        assert_eq!(item.id, None);
        item.set_id(" urn:1 ");
        assert_eq!(item.id.as_deref(), Some("urn:1"));
    }

    #[test]
    fn test_title_is_collapsed_and_stripped() {
        let mut item = Item::default();
        item.set_title("  Hello\x1b[31m\n   world ");
        assert_eq!(item.title.as_deref(), Some("Hello world"));
    }

    #[test]
    fn test_metadata_keeps_duplicate_keys_in_order() {
        let mut item = Item::default();
        item.add_metadata("category", "rust");
        item.add_metadata("author", "someone");
        item.add_metadata("category", "feeds");
        item.add_metadata("category", "   ");
        let cats: Vec<_> = item.metadata_values("category").collect();
        assert_eq!(cats, vec!["rust", "feeds"]);
    }

    #[test]
    fn test_parse_errors_accumulate_escaped() {
        let mut feed = Feed::new(1);
        feed.push_parse_error("first <html> problem");
        feed.push_parse_error("second & last");
        assert_eq!(
            feed.parse_errors,
            "first &lt;html&gt; problem\nsecond &amp; last"
        );
    }

    #[test]
    fn test_discovery_bound() {
        let mut sub = Subscription::new(1, "https://example.com");
        sub.auto_discovery_tries = Subscription::MAX_DISCOVERY_TRIES;
        assert!(!sub.discovery_exhausted());
        sub.auto_discovery_tries += 1;
        assert!(sub.discovery_exhausted());
        sub.reset_discovery();
        assert_eq!(sub.auto_discovery_tries, 0);
    }

    #[test]
    fn test_error_kind_db_roundtrip() {
        for kind in [
            FetchErrorKind::None,
            FetchErrorKind::Net,
            FetchErrorKind::Auth,
            FetchErrorKind::Xml,
            FetchErrorKind::Discover,
            FetchErrorKind::Unknown,
        ] {
            assert_eq!(FetchErrorKind::from_db(kind.as_str()), kind);
        }
        assert_eq!(FetchErrorKind::from_db("bogus"), FetchErrorKind::Unknown);
    }
}
