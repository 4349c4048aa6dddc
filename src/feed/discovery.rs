//! Auto-discovery: find a real feed behind an HTML page.
//!
//! Runs when no syndication handler claimed a document. Scans the raw HTML
//! for `<link rel="alternate">` feed hints (and, failing that, anchors that
//! look like feed URLs), resolves them against the page URL, and redirects the
//! subscription to the first candidate that differs from the current source.

use url::Url;

use super::context::ParseContext;
use crate::update::{UpdateQueue, UpdateRequest};

/// MIME types accepted on `<link rel="alternate">` hints.
const FEED_LINK_TYPES: [&str; 4] = [
    "application/atom+xml",
    "application/rss+xml",
    "application/rdf+xml",
    "text/xml",
];

/// Path suffixes that make an `<a href>` a plausible feed.
const FEED_PATH_SUFFIXES: [&str; 8] = [
    ".rss", ".rdf", ".atom", "/feed", "/rss", "/atom", "/feed.xml", "/atom.xml",
];

/// Returns the first discovered feed URL that differs from `current_source`.
///
/// Relative hrefs are resolved against `<base href>` when present, else
/// against `current_source`. `None` means the subscription stays put.
pub fn discover(raw_html: &str, current_source: &str) -> Option<String> {
    let base = find_base_href(raw_html)
        .map(|href| resolve_url(&href, current_source))
        .unwrap_or_else(|| current_source.to_owned());
    let current = normalize(current_source);

    let links = feed_links_in_html(raw_html, &base);
    let candidates = if links.is_empty() {
        feed_anchors_in_html(raw_html, &base)
    } else {
        links
    };

    candidates.into_iter().find(|c| normalize(c) != current)
}

/// Rewrites the subscription to a discovered feed and queues a fresh fetch.
///
/// Cancels anything already pending for the subscription first, so at most
/// one fetch per subscription is ever in flight.
pub(crate) fn redirect(ctx: &mut ParseContext<'_>, queue: &mut UpdateQueue) -> Option<String> {
    let html = String::from_utf8_lossy(ctx.data());
    let target = discover(&html, &ctx.subscription.source)?;

    tracing::info!(
        subscription = ctx.subscription.id,
        from = %ctx.subscription.source,
        to = %target,
        tries = ctx.subscription.auto_discovery_tries,
        "Auto-discovered feed, redirecting subscription"
    );

    queue.cancel(ctx.subscription.id);
    ctx.subscription.source = target.clone();
    ctx.feed.reset_title = true;
    queue.schedule(UpdateRequest::new(ctx.subscription.id, target.clone()).with_reset_title());

    Some(target)
}

/// Scans HTML for `<link>` tags with `rel="alternate"` and a feed MIME type.
///
/// Uses plain string scanning so broken markup still yields hints. Attribute
/// order and quoting style do not matter. Results keep document order.
fn feed_links_in_html(html: &str, base_url: &str) -> Vec<String> {
    scan_tags(html, "<link")
        .filter(|(lower, _)| has_rel_alternate(lower) && is_feed_type(lower))
        .filter_map(|(_, original)| extract_attr_value(original, "href"))
        .filter_map(|href| absolute_http(href, base_url))
        .collect()
}

/// Fallback: `<a href>` anchors whose path looks like a feed.
fn feed_anchors_in_html(html: &str, base_url: &str) -> Vec<String> {
    scan_tags(html, "<a ")
        .filter_map(|(_, original)| extract_attr_value(original, "href"))
        .filter(|href| {
            let path = href
                .split(['?', '#'])
                .next()
                .unwrap_or_default()
                .trim_end_matches('/')
                .to_ascii_lowercase();
            FEED_PATH_SUFFIXES.iter().any(|suffix| path.ends_with(suffix))
        })
        .filter_map(|href| absolute_http(href, base_url))
        .collect()
}

fn find_base_href(html: &str) -> Option<String> {
    scan_tags(html, "<base")
        .filter_map(|(_, original)| extract_attr_value(original, "href"))
        .map(str::to_owned)
        .next()
}

/// Iterates `(lowercased_tag, original_tag)` pairs for tags opening with `prefix`.
fn scan_tags<'a>(html: &'a str, prefix: &'a str) -> impl Iterator<Item = (String, &'a str)> + 'a {
    // ASCII lowercasing keeps byte offsets aligned with the original
    let lower = html.to_ascii_lowercase();
    let mut search_from = 0;

    std::iter::from_fn(move || loop {
        let start = search_from + lower[search_from..].find(prefix)?;
        let Some(len) = lower[start..].find('>') else {
            search_from = html.len();
            return None;
        };
        let end = start + len + 1;
        search_from = end;

        // `<linkfoo` or `<abbr` are different elements
        let next = lower.as_bytes().get(start + prefix.len()).copied();
        if !prefix.ends_with(' ') && matches!(next, Some(b) if b.is_ascii_alphanumeric()) {
            continue;
        }
        return Some((lower[start..end].to_owned(), &html[start..end]));
    })
}

/// `rel` may carry several space-separated tokens, e.g. `rel="alternate feed"`.
fn has_rel_alternate(lower_tag: &str) -> bool {
    extract_attr_value(lower_tag, "rel")
        .map(|rel| rel.split_whitespace().any(|token| token == "alternate"))
        .unwrap_or(false)
}

fn is_feed_type(lower_tag: &str) -> bool {
    extract_attr_value(lower_tag, "type")
        .map(|t| FEED_LINK_TYPES.contains(&t.trim()))
        .unwrap_or(false)
}

/// Extracts an attribute value from a tag string (case-preserving).
///
/// Supports double quotes, single quotes and unquoted values. The attribute
/// name must be preceded by whitespace so `data-href` never matches `href`.
fn extract_attr_value<'a>(tag: &'a str, attr_name: &str) -> Option<&'a str> {
    let lower = tag.to_ascii_lowercase();
    let bytes = lower.as_bytes();
    let mut from = 0;

    while let Some(rel) = lower[from..].find(attr_name) {
        let start = from + rel;
        from = start + attr_name.len();

        let preceded_by_space = start > 0 && bytes[start - 1].is_ascii_whitespace();
        if !preceded_by_space {
            continue;
        }
        let rest = lower[from..].trim_start();
        let Some(after_eq) = rest.strip_prefix('=') else {
            continue;
        };
        let value_start = tag.len() - after_eq.trim_start().len();
        let value = &tag[value_start..];

        return match value.as_bytes().first()? {
            q @ (b'"' | b'\'') => {
                let inner = &value[1..];
                inner.find(*q as char).map(|end| &inner[..end])
            }
            _ => {
                let end = value
                    .find(|c: char| c.is_ascii_whitespace() || c == '>')
                    .unwrap_or(value.len());
                Some(&value[..end])
            }
        };
    }

    None
}

/// Resolves a potentially relative URL against a base URL.
pub(crate) fn resolve_url(href: &str, base_url: &str) -> String {
    let href = href.trim();
    if let Ok(absolute) = Url::parse(href) {
        return absolute.to_string();
    }

    // SEC-014: protocol-relative hrefs go through the parser, never string concatenation
    if href.starts_with("//") {
        let scheme = Url::parse(base_url)
            .map(|b| b.scheme().to_owned())
            .unwrap_or_else(|_| "https".to_owned());
        if let Ok(parsed) = Url::parse(&format!("{scheme}:{href}")) {
            return parsed.to_string();
        }
    }

    Url::parse(base_url)
        .and_then(|base| base.join(href))
        .map(|u| u.to_string())
        .unwrap_or_else(|_| href.to_owned())
}

fn absolute_http(href: &str, base_url: &str) -> Option<String> {
    let resolved = resolve_url(href, base_url);
    match Url::parse(&resolved) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => Some(url.to_string()),
        _ => None,
    }
}

fn normalize(url: &str) -> String {
    Url::parse(url.trim())
        .map(|u| u.to_string())
        .unwrap_or_else(|_| url.trim().to_owned())
}
