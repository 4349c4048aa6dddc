//! Raw document preparation: one download, two trees.
//!
//! [`parse_xml`] builds a namespace-aware element tree used by the syndication
//! handlers. [`parse_html`] builds a tolerant HTML tree for the heuristic
//! handlers. Both are built from the same bytes for every parse attempt.
//!
//! The XML tree is strict about lexical errors but repairs nesting the way
//! recovering XML parsers do: a stray end tag is ignored, an end tag closes
//! any still-open descendants, and open elements are closed at end of input.
//! That keeps HTML pages (void elements, unclosed `<p>`) reaching
//! auto-discovery instead of failing as malformed XML.

use quick_xml::escape::{escape, resolve_predefined_entity};
use quick_xml::events::{BytesStart, Event};
use quick_xml::name::ResolveResult;
use quick_xml::reader::NsReader;
use scraper::Html;
use std::borrow::Cow;
use thiserror::Error;

use crate::model::FetchErrorKind;

/// SEC-003: Maximum element nesting accepted in a document.
const MAX_DEPTH: usize = 512;

/// Document-level failures. Any of these aborts the attempt before a handler runs.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DocumentError {
    #[error("XML error while reading feed (position {position}): {message}")]
    Malformed { position: u64, message: String },
    #[error("Empty document: no root element found")]
    Empty,
    #[error("Document root element has no name")]
    BlankRoot,
}

impl DocumentError {
    pub fn kind(&self) -> FetchErrorKind {
        match self {
            DocumentError::Malformed { .. } => FetchErrorKind::Xml,
            DocumentError::Empty | DocumentError::BlankRoot => FetchErrorKind::Unknown,
        }
    }
}

/// A child of an [`XmlElement`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum XmlNode {
    Element(XmlElement),
    Text(String),
}

/// An element of the strict XML tree.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct XmlElement {
    /// Qualified name as written, e.g. `dc:creator`
    pub name: String,
    /// Resolved namespace URI, if the element is bound to one
    pub namespace: Option<String>,
    /// Attributes as written (qualified key, unescaped value)
    pub attributes: Vec<(String, String)>,
    pub children: Vec<XmlNode>,
}

impl XmlElement {
    pub fn local_name(&self) -> &str {
        self.name
            .split_once(':')
            .map(|(_, local)| local)
            .unwrap_or(&self.name)
    }

    pub fn is_prefixed(&self) -> bool {
        self.name.contains(':')
    }

    /// True if the element is `local` in namespace `ns`.
    pub fn is(&self, ns: &str, local: &str) -> bool {
        self.namespace.as_deref() == Some(ns) && self.local_name() == local
    }

    /// Attribute lookup by qualified name, falling back to local name.
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == name)
            .or_else(|| {
                self.attributes
                    .iter()
                    .find(|(k, _)| k.split_once(':').map(|(_, l)| l) == Some(name))
            })
            .map(|(_, v)| v.as_str())
    }

    pub fn elements(&self) -> impl Iterator<Item = &XmlElement> {
        self.children.iter().filter_map(|node| match node {
            XmlNode::Element(el) => Some(el),
            XmlNode::Text(_) => None,
        })
    }

    /// Unprefixed child elements named `local`.
    ///
    /// RSS vocabularies live in the default namespace (or none), so this never
    /// matches an extension element such as `atom:link` in an RSS channel.
    pub fn children_named<'a>(&'a self, local: &'a str) -> impl Iterator<Item = &'a XmlElement> {
        self.elements().filter(move |el| el.is_named(local))
    }

    pub fn child(&self, local: &str) -> Option<&XmlElement> {
        self.elements().find(|el| el.is_named(local))
    }

    fn is_named(&self, local: &str) -> bool {
        !self.is_prefixed() && self.name == local
    }

    /// Child elements named `local` in namespace `ns`, whatever their prefix.
    pub fn children_ns<'a>(
        &'a self,
        ns: &'a str,
        local: &'a str,
    ) -> impl Iterator<Item = &'a XmlElement> {
        self.elements().filter(move |el| el.is(ns, local))
    }

    pub fn child_ns(&self, ns: &str, local: &str) -> Option<&XmlElement> {
        self.elements().find(|el| el.is(ns, local))
    }

    /// Concatenated text of this element and its descendants.
    pub fn text(&self) -> String {
        let mut out = String::new();
        self.collect_text(&mut out);
        out
    }

    fn collect_text(&self, out: &mut String) {
        for node in &self.children {
            match node {
                XmlNode::Text(t) => out.push_str(t),
                XmlNode::Element(el) => el.collect_text(out),
            }
        }
    }

    /// Trimmed text of the first unprefixed child `local`, if non-blank.
    pub fn child_text(&self, local: &str) -> Option<String> {
        self.child(local).and_then(XmlElement::trimmed_text)
    }

    pub fn trimmed_text(&self) -> Option<String> {
        let text = self.text();
        let trimmed = text.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_owned())
    }

    pub fn has_element_children(&self) -> bool {
        self.elements().next().is_some()
    }

    /// Serialized markup of the children, text re-escaped.
    pub fn inner_xml(&self) -> String {
        let mut out = String::new();
        for node in &self.children {
            write_node(node, &mut out);
        }
        out
    }

    /// Text when the element only holds text, serialized children otherwise.
    pub fn markup(&self) -> String {
        if self.has_element_children() {
            self.inner_xml()
        } else {
            self.text()
        }
    }

    fn push_text(&mut self, text: String) {
        // adjacent text and CDATA sections merge into one node
        if let Some(XmlNode::Text(last)) = self.children.last_mut() {
            last.push_str(&text);
        } else {
            self.children.push(XmlNode::Text(text));
        }
    }
}

fn write_node(node: &XmlNode, out: &mut String) {
    match node {
        XmlNode::Text(t) => out.push_str(&escape(t.as_str())),
        XmlNode::Element(el) => {
            out.push('<');
            out.push_str(&el.name);
            for (key, value) in &el.attributes {
                out.push(' ');
                out.push_str(key);
                out.push_str("=\"");
                out.push_str(&escape(value.as_str()));
                out.push('"');
            }
            if el.children.is_empty() {
                out.push_str("/>");
                return;
            }
            out.push('>');
            for child in &el.children {
                write_node(child, out);
            }
            out.push_str("</");
            out.push_str(&el.name);
            out.push('>');
        }
    }
}

/// Parses bytes into the strict XML tree.
///
/// # Errors
///
/// - [`DocumentError::Malformed`] on lexical errors or excessive nesting
/// - [`DocumentError::Empty`] when no root element exists
/// - [`DocumentError::BlankRoot`] when the root element has no name
pub fn parse_xml(bytes: &[u8]) -> Result<XmlElement, DocumentError> {
    let mut reader = NsReader::from_reader(bytes);
    // Nesting is repaired below instead of rejected
    reader.config_mut().check_end_names = false;

    let mut buf = Vec::new();
    let mut stack: Vec<XmlElement> = Vec::new();
    let mut root: Option<XmlElement> = None;

    loop {
        let (namespace, event) = match reader.read_resolved_event_into(&mut buf) {
            Ok((ns, event)) => (namespace_uri(&ns), event),
            Err(e) => {
                let message = e.to_string();
                return Err(DocumentError::Malformed {
                    position: reader.buffer_position() as u64,
                    message,
                });
            }
        };

        match event {
            Event::Start(e) => {
                if stack.len() >= MAX_DEPTH {
                    return Err(DocumentError::Malformed {
                        position: reader.buffer_position() as u64,
                        message: format!("nesting depth exceeds {MAX_DEPTH} levels"),
                    });
                }
                stack.push(start_element(&e, namespace));
            }
            Event::Empty(e) => {
                let element = start_element(&e, namespace);
                attach(&mut stack, &mut root, element);
            }
            Event::End(e) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                match stack.iter().rposition(|el| el.name == name) {
                    Some(pos) => {
                        while stack.len() > pos {
                            if let Some(done) = stack.pop() {
                                attach(&mut stack, &mut root, done);
                            }
                        }
                    }
                    None => tracing::trace!(tag = %name, "Ignoring stray end tag"),
                }
            }
            Event::Text(t) => {
                if let Some(parent) = stack.last_mut() {
                    let text = t
                        .unescape_with(resolve_entity)
                        .map(Cow::into_owned)
                        .unwrap_or_else(|_| String::from_utf8_lossy(&t).into_owned());
                    parent.push_text(text);
                }
            }
            Event::CData(c) => {
                if let Some(parent) = stack.last_mut() {
                    parent.push_text(String::from_utf8_lossy(&c).into_owned());
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    while let Some(open) = stack.pop() {
        attach(&mut stack, &mut root, open);
    }

    let root = root.ok_or(DocumentError::Empty)?;
    if root.name.trim().is_empty() {
        return Err(DocumentError::BlankRoot);
    }
    Ok(root)
}

/// Parses bytes into the tolerant HTML tree. Blank input yields `None`.
pub fn parse_html(bytes: &[u8]) -> Option<Html> {
    let text = String::from_utf8_lossy(bytes);
    if text.trim().is_empty() {
        return None;
    }
    Some(Html::parse_document(&text))
}

/// Cheap, non-authoritative check used only to word error messages.
pub fn looks_like_html(bytes: &[u8]) -> bool {
    String::from_utf8_lossy(bytes)
        .to_ascii_lowercase()
        .contains("<html")
}

fn namespace_uri(ns: &ResolveResult<'_>) -> Option<String> {
    match ns {
        ResolveResult::Bound(ns) => Some(String::from_utf8_lossy(ns.0).into_owned()),
        _ => None,
    }
}

fn start_element(e: &BytesStart<'_>, namespace: Option<String>) -> XmlElement {
    let attributes = e
        .html_attributes()
        .filter_map(Result::ok)
        .map(|attr| {
            let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
            let value = attr
                .unescape_value_with(resolve_entity)
                .map(Cow::into_owned)
                .unwrap_or_else(|_| String::from_utf8_lossy(&attr.value).into_owned());
            (key, value)
        })
        .collect();

    XmlElement {
        name: String::from_utf8_lossy(e.name().as_ref()).into_owned(),
        namespace,
        attributes,
        children: Vec::new(),
    }
}

fn attach(stack: &mut [XmlElement], root: &mut Option<XmlElement>, element: XmlElement) {
    match stack.last_mut() {
        Some(parent) => parent.children.push(XmlNode::Element(element)),
        None if root.is_none() => *root = Some(element),
        None => tracing::debug!(element = %element.name, "Ignoring content after document root"),
    }
}

/// XML's predefined entities plus the HTML ones feeds commonly use.
/// A custom resolver replaces quick-xml's default set, so both are needed.
fn resolve_entity(entity: &str) -> Option<&'static str> {
    resolve_predefined_entity(entity).or_else(|| resolve_html_entity(entity))
}

/// HTML named entities commonly found in feeds that XML does not predefine.
fn resolve_html_entity(entity: &str) -> Option<&'static str> {
    Some(match entity {
        "nbsp" => "\u{a0}",
        "copy" => "\u{a9}",
        "reg" => "\u{ae}",
        "trade" => "\u{2122}",
        "hellip" => "\u{2026}",
        "mdash" => "\u{2014}",
        "ndash" => "\u{2013}",
        "lsquo" => "\u{2018}",
        "rsquo" => "\u{2019}",
        "ldquo" => "\u{201c}",
        "rdquo" => "\u{201d}",
        "laquo" => "\u{ab}",
        "raquo" => "\u{bb}",
        "euro" => "\u{20ac}",
        "middot" => "\u{b7}",
        _ => return None,
    })
}
