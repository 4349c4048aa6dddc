//! Semantic HTML5 extraction: one item per `<article>` with a heading and a link.

use scraper::{ElementRef, Html};

use super::{element_text, page_title, selector};
use crate::feed::context::ParseContext;
use crate::feed::date::parse_date;
use crate::feed::discovery::resolve_url;
use crate::model::Item;
use crate::util::escape_html;

const HEADINGS: &str = "h1, h2, h3, h4";
const BASE_KEY: &str = "base";

pub fn probe(html: &Html) -> bool {
    let Some(articles) = selector("article") else {
        return false;
    };
    html.select(&articles).any(|a| heading_of(a).is_some() && link_of(a).is_some())
}

pub fn parse(ctx: &mut ParseContext<'_>, html: &Html) {
    ctx.set_title(page_title(html));

    let base = selector("base[href]")
        .and_then(|sel| html.select(&sel).next())
        .and_then(|b| b.value().attr("href"))
        .map(|href| resolve_url(href, &ctx.subscription.source))
        .unwrap_or_else(|| ctx.subscription.source.clone());
    ctx.scratch.insert(BASE_KEY.to_owned(), base);

    let Some(articles) = selector("article") else {
        return;
    };
    for article in html.select(&articles) {
        let (Some(heading), Some(href)) = (heading_of(article), link_of(article)) else {
            continue;
        };
        let base = ctx.scratch.get(BASE_KEY).cloned().unwrap_or_default();
        let item = ctx.begin_item();
        fill_item(article, heading, href, &base, item);
        ctx.finish_item();
    }
}

fn heading_of(article: ElementRef<'_>) -> Option<ElementRef<'_>> {
    let sel = selector(HEADINGS)?;
    article.select(&sel).find(|h| element_text(*h).is_some())
}

/// A link inside the heading wins over the first link of the article.
fn link_of(article: ElementRef<'_>) -> Option<&str> {
    let sel = selector("a[href]")?;
    let in_heading = heading_of(article).and_then(|h| h.select(&sel).next());
    in_heading
        .or_else(|| article.select(&sel).next())
        .and_then(|a| a.value().attr("href"))
        .filter(|href| !href.trim().is_empty() && !href.trim_start().starts_with('#'))
}

fn fill_item(article: ElementRef<'_>, heading: ElementRef<'_>, href: &str, base: &str, item: &mut Item) {
    if let Some(title) = element_text(heading) {
        item.set_title(&title);
    }
    item.set_source(&resolve_url(href, base));

    item.time = selector("time[datetime]")
        .and_then(|sel| article.select(&sel).next())
        .and_then(|t| t.value().attr("datetime"))
        .and_then(parse_date);

    let description: String = selector("p")
        .map(|sel| {
            article
                .select(&sel)
                .filter_map(element_text)
                .map(|p| format!("<p>{}</p>", escape_html(&p)))
                .collect()
        })
        .unwrap_or_default();
    if !description.is_empty() {
        item.set_description(&description);
    }

    if let Some(author) = selector(r#"[rel="author"], .author"#)
        .and_then(|sel| article.select(&sel).find_map(element_text))
    {
        item.add_metadata("author", &author);
    }
}
