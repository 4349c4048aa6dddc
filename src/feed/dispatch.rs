//! Two-pass format dispatch.
//!
//! One parse attempt:
//!
//! 1. Build the strict XML tree. Failure aborts before any handler runs.
//! 2. Build the tolerant HTML tree (absent for blank input).
//! 3. Pass A: first XML-native handler whose probe accepts the XML root wins.
//! 4. No match: count a discovery attempt and, within budget, try to redirect
//!    the subscription to a feed linked from the page. A redirect ends the
//!    attempt successfully with no items.
//! 5. Pass B: first HTML heuristic whose probe accepts the HTML tree wins.
//!
//! Pass B only runs after discovery so a real feed link is never shadowed by
//! content extraction from the same page.

use thiserror::Error;

use super::context::ParseContext;
use super::discovery;
use super::document::{looks_like_html, parse_html, parse_xml, DocumentError};
use super::handler::{DocumentRoot, FormatHandler, FormatRegistry};
use crate::model::FetchErrorKind;
use crate::update::UpdateQueue;

/// Why an attempt produced nothing usable.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    #[error(transparent)]
    Document(#[from] DocumentError),
    #[error(
        "The URL points to an HTML page and no feed link could be discovered. \
         Try the feed address instead of the website address."
    )]
    NeedsDiscovery,
    #[error("Unrecognized feed format")]
    Unrecognized,
    #[error("Could not determine feed type")]
    DiscoveryExhausted,
}

impl DispatchError {
    pub fn kind(&self) -> FetchErrorKind {
        match self {
            DispatchError::Document(e) => e.kind(),
            DispatchError::NeedsDiscovery => FetchErrorKind::Discover,
            DispatchError::Unrecognized | DispatchError::DiscoveryExhausted => {
                FetchErrorKind::Unknown
            }
        }
    }
}

/// Result of one attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseOutcome {
    /// A handler claimed the document; items are in the context
    Parsed(FormatHandler),
    /// Auto-discovery rewrote the subscription to this source
    Redirected(String),
    Failed(DispatchError),
}

impl ParseOutcome {
    pub fn is_success(&self) -> bool {
        !matches!(self, ParseOutcome::Failed(_))
    }

    /// The handler that claimed the attempt, if any.
    pub fn handler(&self) -> Option<FormatHandler> {
        match self {
            ParseOutcome::Parsed(h) => Some(*h),
            _ => None,
        }
    }
}

pub struct Dispatcher<'r> {
    registry: &'r FormatRegistry,
}

impl<'r> Dispatcher<'r> {
    pub fn new(registry: &'r FormatRegistry) -> Self {
        Self { registry }
    }

    /// Runs a full parse attempt and records its outcome on the context.
    ///
    /// On success the feed records the claiming handler and the discovered
    /// title. On failure no items survive, a diagnostic is appended to
    /// `feed.parse_errors` and `subscription.error` is classified.
    pub fn parse(&self, ctx: &mut ParseContext<'_>, queue: &mut UpdateQueue) -> ParseOutcome {
        ctx.feed.parse_errors.clear();
        let outcome = self.attempt(ctx, queue);

        match &outcome {
            ParseOutcome::Parsed(handler) => {
                tracing::debug!(
                    subscription = ctx.subscription.id,
                    format = handler.type_id(),
                    items = ctx.items.len(),
                    bytes = ctx.data_len(),
                    "Document parsed"
                );
                ctx.subscription.auto_discovery_tries = 0;
                ctx.subscription.error = FetchErrorKind::None;
                ctx.feed.format = Some(handler.type_id().to_owned());
                if let Some(title) = ctx.title.clone() {
                    if ctx.feed.title.is_none() || ctx.feed.reset_title {
                        ctx.feed.title = Some(title);
                        ctx.feed.reset_title = false;
                    }
                }
            }
            ParseOutcome::Redirected(_) => {
                ctx.subscription.error = FetchErrorKind::None;
            }
            ParseOutcome::Failed(err) => {
                tracing::warn!(
                    subscription = ctx.subscription.id,
                    source = %ctx.subscription.source,
                    bytes = ctx.data_len(),
                    error = %err,
                    "Parse attempt failed"
                );
                ctx.discard();
                ctx.feed.push_parse_error(&err.to_string());
                if matches!(err, DispatchError::Document(_)) && looks_like_html(ctx.data()) {
                    ctx.feed
                        .push_parse_error("The document looks like HTML rather than a feed.");
                }
                ctx.subscription.error = err.kind();
            }
        }

        outcome
    }

    fn attempt(&self, ctx: &mut ParseContext<'_>, queue: &mut UpdateQueue) -> ParseOutcome {
        let xml = match parse_xml(ctx.data()) {
            Ok(root) => root,
            Err(e) => return ParseOutcome::Failed(e.into()),
        };
        let html = parse_html(ctx.data());

        // Pass A
        let xml_root = DocumentRoot::Xml(&xml);
        for handler in self.registry.iter().filter(|h| !h.is_html_heuristic()) {
            if handler.probe(xml_root) {
                ctx.reset_scratch();
                handler.parse(ctx, xml_root);
                return ParseOutcome::Parsed(handler);
            }
        }

        ctx.subscription.auto_discovery_tries += 1;
        let exhausted = ctx.subscription.discovery_exhausted();
        if exhausted {
            tracing::debug!(
                subscription = ctx.subscription.id,
                tries = ctx.subscription.auto_discovery_tries,
                "Auto-discovery budget exhausted"
            );
        } else if let Some(target) = discovery::redirect(ctx, queue) {
            return ParseOutcome::Redirected(target);
        }

        // Pass B
        if let Some(html) = &html {
            let html_root = DocumentRoot::Html(html);
            for handler in self.registry.iter().filter(|h| h.is_html_heuristic()) {
                if handler.probe(html_root) {
                    ctx.reset_scratch();
                    handler.parse(ctx, html_root);
                    return ParseOutcome::Parsed(handler);
                }
            }
        }

        let err = if exhausted {
            DispatchError::DiscoveryExhausted
        } else if looks_like_html(ctx.data()) {
            DispatchError::NeedsDiscovery
        } else {
            DispatchError::Unrecognized
        };
        ParseOutcome::Failed(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Feed, Subscription};
    use pretty_assertions::assert_eq;

    const PAGE_URL: &str = "https://blog.example/posts/index.html";

    fn attempt(
        sub: &mut Subscription,
        feed: &mut Feed,
        data: &[u8],
        queue: &mut UpdateQueue,
    ) -> (ParseOutcome, usize) {
        let registry = FormatRegistry::standard();
        let mut ctx = ParseContext::new(sub, feed, data);
        let outcome = Dispatcher::new(&registry).parse(&mut ctx, queue);
        let count = ctx.into_items().len();
        (outcome, count)
    }

    #[test]
    fn test_atom_claimed_only_by_atom() {
        let doc = br#"<feed xmlns="http://www.w3.org/2005/Atom"><title>T</title><entry><id>1</id><title>a</title></entry></feed>"#;
        let xml = parse_xml(doc).unwrap();
        let html = parse_html(doc).unwrap();
        let claimants: Vec<_> = FormatHandler::ALL
            .into_iter()
            .filter(|h| {
                h.probe(DocumentRoot::Xml(&xml)) || h.probe(DocumentRoot::Html(&html))
            })
            .collect();
        assert_eq!(claimants, vec![FormatHandler::Atom]);

        let mut sub = Subscription::new(1, "https://example.org/atom");
        let mut feed = Feed::new(1);
        let (outcome, items) = attempt(&mut sub, &mut feed, doc, &mut UpdateQueue::new());
        assert_eq!(outcome, ParseOutcome::Parsed(FormatHandler::Atom));
        assert_eq!(items, 1);
        assert_eq!(feed.format.as_deref(), Some("atom"));
        assert_eq!(feed.title.as_deref(), Some("T"));
    }

    #[test]
    fn test_rss_single_item() {
        let doc = br#"<rss version="2.0"><channel><item><title>i1</title><link>http://x/1</link><description>D</description></item></channel></rss>"#;
        let mut sub = Subscription::new(1, "http://x/feed");
        let mut feed = Feed::new(1);
        let registry = FormatRegistry::standard();
        let mut queue = UpdateQueue::new();
        let mut ctx = ParseContext::new(&mut sub, &mut feed, doc);
        let outcome = Dispatcher::new(&registry).parse(&mut ctx, &mut queue);
        assert!(outcome.is_success());

        let items = ctx.into_items();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].title.as_deref(), Some("i1"));
        assert_eq!(items[0].source.as_deref(), Some("http://x/1"));
        assert!(items[0].description.as_deref().unwrap().contains('D'));
    }

    #[test]
    fn test_discovery_redirects_to_absolute_feed_url() {
        let page = br#"<html><head><link rel="alternate" type="application/atom+xml" href="/feed.xml"></head><body></body></html>"#;
        let mut sub = Subscription::new(7, PAGE_URL);
        let mut feed = Feed::new(7);
        feed.title = Some("Old".into());
        let mut queue = UpdateQueue::new();

        let (outcome, items) = attempt(&mut sub, &mut feed, page, &mut queue);

        assert_eq!(
            outcome,
            ParseOutcome::Redirected("https://blog.example/feed.xml".into())
        );
        assert!(outcome.is_success());
        assert_eq!(items, 0);
        assert_eq!(sub.source, "https://blog.example/feed.xml");
        assert_eq!(sub.auto_discovery_tries, 1);
        assert!(feed.reset_title);

        let request = queue.pop().unwrap();
        assert_eq!(request.subscription_id, 7);
        assert_eq!(request.source, "https://blog.example/feed.xml");
        assert!(request.reset_title);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_no_feed_link_counts_one_attempt() {
        let page = b"<html><head><title>Nothing</title></head><body><p>hi</p></body></html>";
        let mut sub = Subscription::new(1, PAGE_URL);
        let mut feed = Feed::new(1);
        let mut queue = UpdateQueue::new();

        let (outcome, _) = attempt(&mut sub, &mut feed, page, &mut queue);

        assert_eq!(outcome, ParseOutcome::Failed(DispatchError::NeedsDiscovery));
        assert_eq!(sub.auto_discovery_tries, 1);
        assert_eq!(sub.source, PAGE_URL);
        assert_eq!(sub.error, FetchErrorKind::Discover);
        assert!(feed.parse_errors.contains("no feed link"));
        assert!(queue.is_empty());
    }

    #[test]
    fn test_sixth_discovery_attempt_is_suppressed() {
        let page = br#"<html><head><link rel="alternate" type="application/rss+xml" href="/rss"></head></html>"#;
        let mut sub = Subscription::new(1, PAGE_URL);
        sub.auto_discovery_tries = Subscription::MAX_DISCOVERY_TRIES;
        let mut feed = Feed::new(1);
        let mut queue = UpdateQueue::new();

        let (outcome, _) = attempt(&mut sub, &mut feed, page, &mut queue);

        assert_eq!(outcome, ParseOutcome::Failed(DispatchError::DiscoveryExhausted));
        assert_eq!(sub.source, PAGE_URL);
        assert_eq!(sub.auto_discovery_tries, Subscription::MAX_DISCOVERY_TRIES + 1);
        assert_eq!(sub.error, FetchErrorKind::Unknown);
        assert!(feed.parse_errors.contains("Could not determine feed type"));
        assert!(queue.is_empty());
    }

    #[test]
    fn test_five_misses_then_budget_exhausted() {
        let page = b"<html><body><p>no links</p></body></html>";
        let mut sub = Subscription::new(1, PAGE_URL);
        let mut feed = Feed::new(1);
        let mut queue = UpdateQueue::new();

        for _ in 0..5 {
            let (outcome, _) = attempt(&mut sub, &mut feed, page, &mut queue);
            assert_eq!(outcome, ParseOutcome::Failed(DispatchError::NeedsDiscovery));
        }
        let (outcome, _) = attempt(&mut sub, &mut feed, page, &mut queue);
        assert_eq!(outcome, ParseOutcome::Failed(DispatchError::DiscoveryExhausted));
    }

    #[test]
    fn test_direct_parse_resets_discovery_counter() {
        let mut sub = Subscription::new(1, "https://example.org/rss");
        sub.auto_discovery_tries = 4;
        sub.error = FetchErrorKind::Discover;
        let mut feed = Feed::new(1);
        let doc = b"<rss version=\"2.0\"><channel><title>T</title></channel></rss>";

        let (outcome, items) = attempt(&mut sub, &mut feed, doc, &mut UpdateQueue::new());

        assert_eq!(outcome, ParseOutcome::Parsed(FormatHandler::Rss));
        assert_eq!(items, 0);
        assert_eq!(sub.auto_discovery_tries, 0);
        assert_eq!(sub.error, FetchErrorKind::None);
    }

    #[test]
    fn test_feed_link_beats_article_extraction() {
        let page = br#"<html><head><title>Blog</title>
<link rel="alternate" type="application/rss+xml" href="https://blog.example/rss.xml">
</head><body><article><h2><a href="/p/1">Post</a></h2></article></body></html>"#;
        let mut sub = Subscription::new(1, PAGE_URL);
        let mut feed = Feed::new(1);

        let (outcome, items) = attempt(&mut sub, &mut feed, page, &mut UpdateQueue::new());

        assert_eq!(
            outcome,
            ParseOutcome::Redirected("https://blog.example/rss.xml".into())
        );
        assert_eq!(items, 0);
        assert_eq!(feed.format, None);
    }

    #[test]
    fn test_article_page_without_feed_link_uses_html5() {
        let page = br#"<html><head><title>Blog</title></head><body><article><h2><a href="/p/1">Post</a></h2></article></body></html>"#;
        let mut sub = Subscription::new(1, PAGE_URL);
        let mut feed = Feed::new(1);

        let (outcome, items) = attempt(&mut sub, &mut feed, page, &mut UpdateQueue::new());

        assert_eq!(outcome, ParseOutcome::Parsed(FormatHandler::Html5));
        assert_eq!(items, 1);
        assert_eq!(sub.auto_discovery_tries, 0);
        assert_eq!(feed.title.as_deref(), Some("Blog"));
    }

    #[test]
    fn test_malformed_document_runs_no_handler() {
        let mut sub = Subscription::new(1, "https://example.org/rss");
        sub.auto_discovery_tries = 2;
        let mut feed = Feed::new(1);

        let (outcome, items) =
            attempt(&mut sub, &mut feed, b"<rss><channel><item", &mut UpdateQueue::new());

        assert!(matches!(
            outcome,
            ParseOutcome::Failed(DispatchError::Document(DocumentError::Malformed { .. }))
        ));
        assert_eq!(items, 0);
        assert_eq!(sub.error, FetchErrorKind::Xml);
        // the counter only moves when handlers were consulted
        assert_eq!(sub.auto_discovery_tries, 2);
        assert!(feed.parse_errors.starts_with("XML error"));
    }

    #[test]
    fn test_empty_document() {
        let mut sub = Subscription::new(1, "https://example.org/rss");
        let mut feed = Feed::new(1);
        let (outcome, _) = attempt(&mut sub, &mut feed, b"  ", &mut UpdateQueue::new());
        assert_eq!(outcome, ParseOutcome::Failed(DispatchError::Document(DocumentError::Empty)));
        assert_eq!(sub.error, FetchErrorKind::Unknown);
    }

    #[test]
    fn test_unrecognized_xml() {
        let mut sub = Subscription::new(1, "https://example.org/data.xml");
        let mut feed = Feed::new(1);
        let (outcome, _) = attempt(
            &mut sub,
            &mut feed,
            b"<catalog><book>x</book></catalog>",
            &mut UpdateQueue::new(),
        );
        assert_eq!(outcome, ParseOutcome::Failed(DispatchError::Unrecognized));
        assert_eq!(sub.error, FetchErrorKind::Unknown);
    }

    #[test]
    fn test_title_kept_unless_reset() {
        let doc = b"<rss version=\"2.0\"><channel><title>New</title></channel></rss>";
        let mut sub = Subscription::new(1, "https://example.org/rss");
        let mut feed = Feed::new(1);
        feed.title = Some("User title".into());

        attempt(&mut sub, &mut feed, doc, &mut UpdateQueue::new());
        assert_eq!(feed.title.as_deref(), Some("User title"));

        feed.reset_title = true;
        attempt(&mut sub, &mut feed, doc, &mut UpdateQueue::new());
        assert_eq!(feed.title.as_deref(), Some("New"));
        assert!(!feed.reset_title);
    }
}
