//! schema.org items embedded as `<script type="application/ld+json">`.
//!
//! Recognizes an `ItemList` (each `itemListElement` becomes an item) and
//! standalone article objects. Blocks that are not valid JSON are skipped.

use scraper::Html;
use serde_json::Value;

use super::{page_title, selector};
use crate::feed::context::ParseContext;
use crate::feed::date::parse_date;
use crate::feed::discovery::resolve_url;
use crate::model::Item;

const ARTICLE_TYPES: [&str; 5] = ["Article", "NewsArticle", "BlogPosting", "Report", "TechArticle"];

pub fn probe(html: &Html) -> bool {
    json_blocks(html).iter().any(|block| {
        let mut found = Vec::new();
        collect_entries(block, &mut found);
        !found.is_empty()
    })
}

pub fn parse(ctx: &mut ParseContext<'_>, html: &Html) {
    ctx.set_title(page_title(html));
    let base = ctx.subscription.source.clone();

    for block in json_blocks(html) {
        let mut entries = Vec::new();
        collect_entries(&block, &mut entries);
        for entry in entries {
            let item = ctx.begin_item();
            fill_item(entry, &base, item);
            if item.title.is_none() && item.source.is_none() {
                tracing::debug!("Skipping LD+JSON entry without headline or url");
                ctx.current = None;
                continue;
            }
            ctx.finish_item();
        }
    }
}

fn json_blocks(html: &Html) -> Vec<Value> {
    let Some(sel) = selector(r#"script[type="application/ld+json"]"#) else {
        return Vec::new();
    };
    html.select(&sel)
        .filter_map(|script| {
            let raw: String = script.text().collect();
            match serde_json::from_str::<Value>(raw.trim()) {
                Ok(value) => Some(value),
                Err(e) => {
                    tracing::debug!(error = %e, "Ignoring invalid LD+JSON block");
                    None
                }
            }
        })
        .collect()
}

/// Flattens arrays, `@graph` containers and `ItemList`s into entry objects.
fn collect_entries<'v>(value: &'v Value, out: &mut Vec<&'v Value>) {
    match value {
        Value::Array(values) => {
            for v in values {
                collect_entries(v, out);
            }
        }
        Value::Object(obj) => {
            if let Some(graph) = obj.get("@graph") {
                collect_entries(graph, out);
            }
            if has_type(value, &["ItemList"]) {
                let elements = obj.get("itemListElement").map(as_slice).unwrap_or_default();
                for element in elements {
                    // ListItem wraps the real entry in `item` when it is an object
                    match element.get("item") {
                        Some(inner @ Value::Object(_)) => out.push(inner),
                        _ => out.push(element),
                    }
                }
            } else if has_type(value, &ARTICLE_TYPES) {
                out.push(value);
            }
        }
        _ => {}
    }
}

fn has_type(value: &Value, wanted: &[&str]) -> bool {
    let Some(ty) = value.get("@type") else {
        return false;
    };
    as_slice(ty)
        .iter()
        .filter_map(Value::as_str)
        // `https://schema.org/Article` and `schema:Article` both end in the bare name
        .map(|t| t.rsplit(['/', ':']).next().unwrap_or(t))
        .any(|t| wanted.contains(&t))
}

fn as_slice(value: &Value) -> &[Value] {
    match value {
        Value::Array(values) => values,
        other => std::slice::from_ref(other),
    }
}

fn string_field(value: &Value, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|k| value.get(*k))
        .find_map(|v| match v {
            Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_owned()),
            // `url` is sometimes an object or an array of strings
            Value::Array(values) => values.iter().find_map(|v| v.as_str()).map(str::to_owned),
            Value::Object(obj) => obj
                .get("@id")
                .or_else(|| obj.get("url"))
                .and_then(Value::as_str)
                .map(str::to_owned),
            _ => None,
        })
}

fn fill_item(entry: &Value, base: &str, item: &mut Item) {
    if let Some(id) = entry.get("@id").and_then(Value::as_str) {
        item.set_id(id);
    }
    if let Some(title) = string_field(entry, &["headline", "name"]) {
        item.set_title(&title);
    }
    if let Some(url) = string_field(entry, &["url", "mainEntityOfPage"]) {
        item.set_source(&resolve_url(&url, base));
    }
    if let Some(description) = entry.get("description").and_then(Value::as_str) {
        item.set_description(description);
    }
    item.time = ["datePublished", "dateCreated", "dateModified"]
        .iter()
        .filter_map(|k| entry.get(*k).and_then(Value::as_str))
        .find_map(parse_date);

    if let Some(author) = entry.get("author") {
        for a in as_slice(author) {
            let name = match a {
                Value::String(s) => Some(s.as_str()),
                other => other.get("name").and_then(Value::as_str),
            };
            if let Some(name) = name {
                item.add_metadata("author", name);
            }
        }
    }
    if let Some(section) = entry.get("articleSection") {
        for s in as_slice(section).iter().filter_map(Value::as_str) {
            item.add_metadata("category", s);
        }
    }
    if let Some(image) = string_field(entry, &["image", "thumbnailUrl"]) {
        item.add_metadata("image", &resolve_url(&image, base));
    }
}
