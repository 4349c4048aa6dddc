//! Per-format probe and parse functions.
//!
//! XML-native formats ([`rss`], [`atom`]) work on the strict element tree.
//! HTML heuristics ([`ldjson`], [`html5`]) work on the tolerant `scraper` tree.

pub mod atom;
pub mod html5;
pub mod ldjson;
pub mod rss;

use scraper::{ElementRef, Html, Selector};

use crate::util::collapse_whitespace;

/// Parses a CSS selector. All selectors in this crate are static, so a
/// failure only means the page cannot be matched.
pub(crate) fn selector(css: &str) -> Option<Selector> {
    Selector::parse(css).ok()
}

/// Whitespace-collapsed text content of an element, `None` when blank.
pub(crate) fn element_text(el: ElementRef<'_>) -> Option<String> {
    let text = collapse_whitespace(&el.text().collect::<String>());
    (!text.is_empty()).then_some(text)
}

/// The page `<title>`.
pub(crate) fn page_title(html: &Html) -> Option<String> {
    let sel = selector("title")?;
    html.select(&sel).find_map(element_text)
}
