//! Atom 1.0 and the pre-standard Atom 0.3.

use crate::feed::context::ParseContext;
use crate::feed::date::parse_date;
use crate::feed::document::XmlElement;
use crate::model::Item;

const ATOM10_NS: &str = "http://www.w3.org/2005/Atom";
const ATOM03_NS: &str = "http://purl.org/atom/ns#";

fn atom_ns(el: &XmlElement) -> Option<&'static str> {
    match el.namespace.as_deref() {
        Some(ATOM10_NS) => Some(ATOM10_NS),
        Some(ATOM03_NS) => Some(ATOM03_NS),
        _ => None,
    }
}

pub fn probe(root: &XmlElement) -> bool {
    root.local_name() == "feed" && atom_ns(root).is_some()
}

pub fn parse(ctx: &mut ParseContext<'_>, root: &XmlElement) {
    let Some(ns) = atom_ns(root) else {
        return;
    };

    ctx.set_title(text_of(root.child_ns(ns, "title")));
    ctx.feed.homepage = alternate_link(root, ns);
    ctx.feed.description =
        text_of(root.child_ns(ns, "subtitle").or_else(|| root.child_ns(ns, "tagline")));
    ctx.feed.image = text_of(root.child_ns(ns, "logo").or_else(|| root.child_ns(ns, "icon")));

    for entry in root.children_ns(ns, "entry") {
        let item = ctx.begin_item();
        parse_entry(entry, ns, item);
        ctx.finish_item();
    }
}

fn parse_entry(entry: &XmlElement, ns: &str, item: &mut Item) {
    if let Some(id) = entry.child_ns(ns, "id") {
        item.set_id(&id.text());
    }
    if let Some(title) = entry.child_ns(ns, "title") {
        item.set_title(&title.text());
    }
    if let Some(link) = alternate_link(entry, ns) {
        item.set_source(&link);
    }

    let body = entry
        .child_ns(ns, "content")
        .or_else(|| entry.child_ns(ns, "summary"))
        .map(content_markup);
    if let Some(body) = body {
        item.set_description(&body);
    }

    item.time = ["published", "updated", "issued", "modified", "created"]
        .iter()
        .filter_map(|name| entry.child_ns(ns, name))
        .filter_map(XmlElement::trimmed_text)
        .find_map(|d| parse_date(&d));

    for author in entry.children_ns(ns, "author") {
        if let Some(name) = text_of(author.child_ns(ns, "name")) {
            item.add_metadata("author", &name);
        }
    }
    for category in entry.children_ns(ns, "category") {
        let label = category.attr("term").or_else(|| category.attr("label"));
        if let Some(label) = label {
            item.add_metadata("category", label);
        }
    }

    for link in entry.children_ns(ns, "link") {
        if link.attr("rel") != Some("enclosure") {
            continue;
        }
        if let Some(href) = link.attr("href").filter(|h| !h.trim().is_empty()) {
            item.add_metadata("enclosure", href);
            item.has_enclosure = true;
        }
    }
}

/// The `rel="alternate"` link, or the first link without a `rel`.
fn alternate_link(el: &XmlElement, ns: &str) -> Option<String> {
    let links: Vec<&XmlElement> = el.children_ns(ns, "link").collect();
    links
        .iter()
        .find(|l| l.attr("rel") == Some("alternate"))
        .or_else(|| links.iter().find(|l| l.attr("rel").is_none()))
        .and_then(|l| l.attr("href"))
        .map(str::trim)
        .filter(|href| !href.is_empty())
        .map(str::to_owned)
}

fn text_of(el: Option<&XmlElement>) -> Option<String> {
    el.and_then(XmlElement::trimmed_text)
}

/// `type="xhtml"` content carries markup as child elements; serialize it.
/// Text and escaped HTML come through as text.
fn content_markup(el: &XmlElement) -> String {
    match el.attr("type") {
        Some("xhtml") => el.inner_xml(),
        _ => el.markup(),
    }
}
