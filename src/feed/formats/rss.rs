//! RSS 0.9x, 1.0 (RDF) and 2.0.

use crate::feed::context::ParseContext;
use crate::feed::date::parse_date;
use crate::feed::document::XmlElement;
use crate::model::Item;

pub(crate) const RDF_NS: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#";
const DC_NS: &str = "http://purl.org/dc/elements/1.1/";
const CONTENT_NS: &str = "http://purl.org/rss/1.0/modules/content/";

pub fn probe(root: &XmlElement) -> bool {
    match root.name.as_str() {
        // Netscape 0.9 documents use a bare channel root
        "rss" | "channel" | "Channel" => true,
        _ => root.is(RDF_NS, "RDF"),
    }
}

pub fn parse(ctx: &mut ParseContext<'_>, root: &XmlElement) {
    let channel = if root.local_name().eq_ignore_ascii_case("channel") {
        Some(root)
    } else {
        root.child("channel")
    };

    if let Some(channel) = channel {
        ctx.set_title(channel.child_text("title"));
        ctx.feed.homepage = channel.child_text("link");
        ctx.feed.description = channel.child_text("description");
        // RSS 2.0 nests <image> in the channel, RDF makes it a sibling
        ctx.feed.image = channel
            .child("image")
            .or_else(|| root.child("image"))
            .and_then(|img| img.child_text("url"));
    }

    // RSS 0.9x/2.0 keep items inside <channel>; RDF lists them next to it.
    // A bare <channel> root is both, and must only be walked once.
    let nested = channel
        .filter(|c| !std::ptr::eq(*c, root))
        .into_iter()
        .flat_map(|c| c.children_named("item"));
    let items = nested.chain(root.children_named("item"));

    for el in items {
        let item = ctx.begin_item();
        parse_item(el, item);
        if item.title.is_none() && item.description.is_none() && item.source.is_none() {
            tracing::debug!("Skipping empty RSS item");
            ctx.current = None;
            continue;
        }
        ctx.finish_item();
    }
}

fn parse_item(el: &XmlElement, item: &mut Item) {
    if let Some(title) = el.child_text("title") {
        item.set_title(&title);
    }

    let guid = el.child("guid");
    if let Some(guid) = guid {
        item.set_id(&guid.text());
    }
    if item.id.is_none() {
        if let Some(about) = el.attr("rdf:about") {
            item.set_id(about);
        }
    }

    // A permalink guid doubles as the link when <link> is missing
    let permalink = guid
        .filter(|g| g.attr("isPermaLink") != Some("false"))
        .and_then(XmlElement::trimmed_text)
        .filter(|g| g.starts_with("http://") || g.starts_with("https://"));
    if let Some(link) = el.child_text("link").or(permalink) {
        item.set_source(&link);
    }

    let encoded = el
        .child_ns(CONTENT_NS, "encoded")
        .and_then(XmlElement::trimmed_text);
    let description = encoded.or_else(|| el.child("description").map(XmlElement::markup));
    if let Some(description) = description {
        item.set_description(&description);
    }

    item.time = el
        .child_text("pubDate")
        .and_then(|d| parse_date(&d))
        .or_else(|| {
            el.child_ns(DC_NS, "date")
                .and_then(XmlElement::trimmed_text)
                .and_then(|d| parse_date(&d))
        });

    for author in el
        .children_named("author")
        .chain(el.children_ns(DC_NS, "creator"))
    {
        item.add_metadata("author", &author.text());
    }
    for category in el
        .children_named("category")
        .chain(el.children_ns(DC_NS, "subject"))
    {
        item.add_metadata("category", &category.text());
    }
    if let Some(comments) = el.child_text("comments") {
        item.add_metadata("commentsUri", &comments);
    }

    for enclosure in el.children_named("enclosure") {
        // enclosures without a URL are dropped, the item is kept
        let Some(url) = enclosure.attr("url").filter(|u| !u.trim().is_empty()) else {
            continue;
        };
        item.add_metadata("enclosure", url);
        item.has_enclosure = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::document::parse_xml;
    use crate::model::{Feed, Subscription};
    use pretty_assertions::assert_eq;

    fn run(xml: &str) -> (Vec<Item>, Feed, Option<String>) {
        let root = parse_xml(xml.as_bytes()).unwrap();
        assert!(probe(&root));
        let mut sub = Subscription::new(1, "https://example.com/feed");
        let mut feed = Feed::new(1);
        let mut ctx = ParseContext::new(&mut sub, &mut feed, xml.as_bytes());
        parse(&mut ctx, &root);
        let title = ctx.title.clone();
        let items = ctx.into_items();
        (items, feed, title)
    }

    #[test]
    fn test_minimal_rss2_item() {
        let (items, _, _) = run(
            r#"<rss version="2.0"><channel><item><title>i1</title><link>http://x/1</link><description>D</description></item></channel></rss>"#,
        );
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].title.as_deref(), Some("i1"));
        assert_eq!(items[0].source.as_deref(), Some("http://x/1"));
        assert!(items[0].description.as_deref().unwrap().contains('D'));
        assert_eq!(items[0].id, None);
    }

    #[test]
    fn test_escaped_html_description_and_title() {
        let (items, _, _) = run(
            r#"<rss version="2.0"><channel><item>
  <title>Tom &amp; Jerry</title>
  <description>&lt;p&gt;Hi&lt;/p&gt;&lt;script&gt;alert(1)&lt;/script&gt;</description>
</item></channel></rss>"#,
        );
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].title.as_deref(), Some("Tom & Jerry"));
        assert_eq!(items[0].description.as_deref(), Some("<p>Hi</p>"));
    }

    #[test]
    fn test_netscape_channel_root_items_once() {
        let (items, _, title) = run(
            r#"<channel><title>Old</title><item><title>a</title></item><item><title>b</title></item></channel>"#,
        );
        let titles: Vec<_> = items.iter().filter_map(|i| i.title.as_deref()).collect();
        assert_eq!(titles, vec!["a", "b"]);
        assert_eq!(title.as_deref(), Some("Old"));
    }

    #[test]
    fn test_channel_metadata() {
        let (items, feed, title) = run(
            r#"<?xml version="1.0"?>
<rss version="2.0" xmlns:atom="http://www.w3.org/2005/Atom">
  <channel>
    <title>Example Blog</title>
    <atom:link href="https://example.com/feed.xml" rel="self"/>
    <link>https://example.com</link>
    <description>About things</description>
    <image><url>https://example.com/logo.png</url></image>
  </channel>
</rss>"#,
        );
        assert!(items.is_empty());
        assert_eq!(title.as_deref(), Some("Example Blog"));
        // atom:link must not shadow the plain <link>
        assert_eq!(feed.homepage.as_deref(), Some("https://example.com"));
        assert_eq!(feed.description.as_deref(), Some("About things"));
        assert_eq!(feed.image.as_deref(), Some("https://example.com/logo.png"));
    }

    #[test]
    fn test_full_item() {
        let (items, _, _) = run(
            r#"<rss version="2.0" xmlns:dc="http://purl.org/dc/elements/1.1/" xmlns:content="http://purl.org/rss/1.0/modules/content/">
<channel>
  <item>
    <guid isPermaLink="true">https://example.com/p/1</guid>
    <title>First</title>
    <description>short</description>
    <content:encoded><![CDATA[<p>long <script>x()</script>body</p>]]></content:encoded>
    <pubDate>Mon, 01 Jan 2024 00:00:00 GMT</pubDate>
    <dc:creator>Ann</dc:creator>
    <category>rust</category>
    <category>feeds</category>
    <comments>https://example.com/p/1#comments</comments>
    <enclosure url="https://example.com/a.mp3" length="1" type="audio/mpeg"/>
    <enclosure length="1"/>
  </item>
</channel>
</rss>"#,
        );
        let item = &items[0];
        assert_eq!(item.id.as_deref(), Some("https://example.com/p/1"));
        // permalink guid becomes the link
        assert_eq!(item.source.as_deref(), Some("https://example.com/p/1"));
        assert_eq!(item.description.as_deref(), Some("<p>long body</p>"));
        assert_eq!(item.time, Some(1_704_067_200));
        assert_eq!(item.metadata_values("author").collect::<Vec<_>>(), vec!["Ann"]);
        assert_eq!(
            item.metadata_values("category").collect::<Vec<_>>(),
            vec!["rust", "feeds"]
        );
        assert!(item.has_enclosure);
        assert_eq!(item.metadata_values("enclosure").count(), 1);
        assert_eq!(
            item.metadata_values("commentsUri").next(),
            Some("https://example.com/p/1#comments")
        );
    }

    #[test]
    fn test_non_permalink_guid_is_not_a_link() {
        let (items, _, _) = run(
            r#"<rss version="2.0"><channel><item><guid isPermaLink="false">https://example.com/x</guid><title>t</title></item></channel></rss>"#,
        );
        assert_eq!(items[0].id.as_deref(), Some("https://example.com/x"));
        assert_eq!(items[0].source, None);
    }

    #[test]
    fn test_rdf_items_are_channel_siblings() {
        let (items, feed, title) = run(
            r#"<?xml version="1.0"?>
<rdf:RDF xmlns:rdf="http://www.w3.org/1999/02/22-rdf-syntax-ns#" xmlns="http://purl.org/rss/1.0/" xmlns:dc="http://purl.org/dc/elements/1.1/">
  <channel rdf:about="https://example.org/">
    <title>RDF Site</title>
    <link>https://example.org/</link>
  </channel>
  <item rdf:about="https://example.org/a">
    <title>A</title>
    <link>https://example.org/a</link>
    <dc:date>2024-01-01T00:00:00Z</dc:date>
  </item>
  <item rdf:about="https://example.org/b">
    <title>B</title>
    <link>https://example.org/b</link>
  </item>
</rdf:RDF>"#,
        );
        assert_eq!(title.as_deref(), Some("RDF Site"));
        assert_eq!(feed.homepage.as_deref(), Some("https://example.org/"));
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].id.as_deref(), Some("https://example.org/a"));
        assert_eq!(items[0].time, Some(1_704_067_200));
        assert_eq!(items[1].title.as_deref(), Some("B"));
    }

    #[test]
    fn test_empty_items_are_skipped() {
        let (items, _, _) = run(
            r#"<rss version="2.0"><channel><item></item><item><title>kept</title></item></channel></rss>"#,
        );
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].title.as_deref(), Some("kept"));
    }

    #[test]
    fn test_probe_rejects_other_roots() {
        assert!(!probe(&parse_xml(b"<feed xmlns=\"http://www.w3.org/2005/Atom\"/>").unwrap()));
        assert!(!probe(&parse_xml(b"<html><body/></html>").unwrap()));
        assert!(!probe(&parse_xml(b"<RDF/>").unwrap()));
    }
}
