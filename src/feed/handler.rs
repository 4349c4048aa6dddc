//! Format handlers and the registry that orders them.

use scraper::Html;

use super::context::ParseContext;
use super::document::XmlElement;
use super::formats::{atom, html5, ldjson, rss};

/// Root of one of the two trees built for a parse attempt.
#[derive(Clone, Copy)]
pub enum DocumentRoot<'d> {
    Xml(&'d XmlElement),
    Html(&'d Html),
}

/// A supported document format.
///
/// XML-native handlers probe the strict element tree; HTML heuristics probe
/// the tolerant HTML tree. A handler handed the other kind of root never
/// claims it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FormatHandler {
    Rss,
    Atom,
    LdJson,
    Html5,
}

impl FormatHandler {
    pub const ALL: [FormatHandler; 4] = [
        FormatHandler::Rss,
        FormatHandler::Atom,
        FormatHandler::LdJson,
        FormatHandler::Html5,
    ];

    /// Stable identifier recorded on the feed that a handler claimed.
    pub fn type_id(self) -> &'static str {
        match self {
            FormatHandler::Rss => "rss",
            FormatHandler::Atom => "atom",
            FormatHandler::LdJson => "ldjson",
            FormatHandler::Html5 => "html5",
        }
    }

    pub fn from_type_id(id: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|h| h.type_id() == id)
    }

    pub fn is_html_heuristic(self) -> bool {
        matches!(self, FormatHandler::LdJson | FormatHandler::Html5)
    }

    pub fn probe(self, root: DocumentRoot<'_>) -> bool {
        match (self, root) {
            (FormatHandler::Rss, DocumentRoot::Xml(el)) => rss::probe(el),
            (FormatHandler::Atom, DocumentRoot::Xml(el)) => atom::probe(el),
            (FormatHandler::LdJson, DocumentRoot::Html(doc)) => ldjson::probe(doc),
            (FormatHandler::Html5, DocumentRoot::Html(doc)) => html5::probe(doc),
            _ => false,
        }
    }

    pub fn parse(self, ctx: &mut ParseContext<'_>, root: DocumentRoot<'_>) {
        match (self, root) {
            (FormatHandler::Rss, DocumentRoot::Xml(el)) => rss::parse(ctx, el),
            (FormatHandler::Atom, DocumentRoot::Xml(el)) => atom::parse(ctx, el),
            (FormatHandler::LdJson, DocumentRoot::Html(doc)) => ldjson::parse(ctx, doc),
            (FormatHandler::Html5, DocumentRoot::Html(doc)) => html5::parse(ctx, doc),
            (handler, _) => {
                tracing::warn!(handler = handler.type_id(), "Handler invoked with wrong tree kind");
            }
        }
    }
}

impl std::fmt::Display for FormatHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.type_id())
    }
}

/// Ordered, immutable handler list. Order is precedence.
#[derive(Debug, Clone)]
pub struct FormatRegistry {
    handlers: Vec<FormatHandler>,
}

impl FormatRegistry {
    pub fn new(handlers: impl IntoIterator<Item = FormatHandler>) -> Self {
        Self {
            handlers: handlers.into_iter().collect(),
        }
    }

    /// Syndication formats first, then LD+JSON before the generic HTML5 extractor.
    pub fn standard() -> Self {
        Self::new(FormatHandler::ALL)
    }

    pub fn iter(&self) -> impl Iterator<Item = FormatHandler> + '_ {
        self.handlers.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl Default for FormatRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::document::{parse_html, parse_xml};

    #[test]
    fn test_type_ids_roundtrip() {
        for handler in FormatHandler::ALL {
            assert_eq!(FormatHandler::from_type_id(handler.type_id()), Some(handler));
        }
        assert_eq!(FormatHandler::from_type_id("cdf"), None);
    }

    #[test]
    fn test_standard_order() {
        let order: Vec<_> = FormatRegistry::standard().iter().collect();
        assert_eq!(
            order,
            vec![FormatHandler::Rss, FormatHandler::Atom, FormatHandler::LdJson, FormatHandler::Html5]
        );
        // syndication formats strictly precede heuristics
        let first_heuristic = order.iter().position(|h| h.is_html_heuristic()).unwrap();
        assert!(order[first_heuristic..].iter().all(|h| h.is_html_heuristic()));
    }

    #[test]
    fn test_wrong_tree_kind_never_matches() {
        let bytes = b"<html><body><article><h2><a href=\"/a\">A</a></h2></article></body></html>";
        let xml = parse_xml(bytes).unwrap();
        let html = parse_html(bytes).unwrap();
        assert!(!FormatHandler::Html5.probe(DocumentRoot::Xml(&xml)));
        assert!(FormatHandler::Html5.probe(DocumentRoot::Html(&html)));

        let rss = parse_xml(b"<rss version=\"2.0\"><channel/></rss>").unwrap();
        assert!(FormatHandler::Rss.probe(DocumentRoot::Xml(&rss)));
        assert!(!FormatHandler::Rss.probe(DocumentRoot::Html(&html)));
    }
}
